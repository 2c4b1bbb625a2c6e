pub mod callback;
pub mod message;

use std::sync::Arc;
use teloxide::{
    dispatching::{dialogue, UpdateHandler},
    prelude::*,
};
use crate::config::Config;
use crate::database::connection::DatabaseManager;
use crate::services::content::EventContentProvider;
use crate::services::enhanced_broadcast::BroadcastCoordinator;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;
pub type HandlerResult = Result<(), HandlerError>;

/// Shared by every update handler
#[derive(Clone)]
pub struct BotState {
    pub db: DatabaseManager,
    pub config: Arc<Config>,
    pub content: Arc<dyn EventContentProvider>,
    pub coordinator: BroadcastCoordinator,
}

pub struct BotHandler {
    pub state: BotState,
}

impl BotHandler {
    pub fn new(state: BotState) -> Self {
        Self { state }
    }

    pub fn schema(&self) -> UpdateHandler<HandlerError> {
        use teloxide::dispatching::UpdateFilterExt;

        let state = self.state.clone();
        let state_callback = self.state.clone();

        dialogue::enter::<Update, teloxide::dispatching::dialogue::InMemStorage<()>, (), _>()
            .branch(
                Update::filter_message()
                    .filter_command::<crate::bot::commands::Command>()
                    .endpoint(move |bot, msg, cmd| {
                        let state = state.clone();
                        async move { message::command_handler(bot, msg, cmd, state).await }
                    }),
            )
            .branch(Update::filter_callback_query().endpoint(move |bot, q| {
                let state = state_callback.clone();
                async move { callback::callback_handler(bot, q, state).await }
            }))
    }
}
