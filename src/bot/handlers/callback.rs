use teloxide::prelude::*;
use teloxide::types::ParseMode;
use crate::bot::commands::guest::{rsvp_buttons, rsvp_confirmation, RSVP_CALLBACK_PREFIX};
use crate::bot::handlers::{BotState, HandlerResult};
use crate::database::models::{AttendanceStatus, User};
use crate::services::content::{
    render_event_details, render_useful_info, MENU_DETAILS, MENU_RSVP, MENU_USEFUL_INFO,
};
use crate::services::transport::inline_keyboard;
use crate::utils::logging::log_database_error;
use crate::utils::validation::validate_attendance_status;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    Rsvp,
    Details,
    UsefulInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Rsvp(AttendanceStatus),
    Menu(MenuItem),
}

pub fn parse_callback_data(data: &str) -> Result<CallbackAction, String> {
    if let Some(status) = data.strip_prefix(RSVP_CALLBACK_PREFIX) {
        return validate_attendance_status(status)
            .map(CallbackAction::Rsvp)
            .map_err(|e| e.to_string());
    }

    match data {
        MENU_RSVP => Ok(CallbackAction::Menu(MenuItem::Rsvp)),
        MENU_DETAILS => Ok(CallbackAction::Menu(MenuItem::Details)),
        MENU_USEFUL_INFO => Ok(CallbackAction::Menu(MenuItem::UsefulInfo)),
        other => Err(format!("Unknown action '{other}'")),
    }
}

pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    state: BotState,
) -> HandlerResult {
    let Some(data) = q.data.clone() else {
        bot.answer_callback_query(q.id).text("Invalid callback data format").await?;
        return Ok(());
    };
    let Some(chat_id) = q.message.as_ref().map(|m| m.chat.id) else {
        bot.answer_callback_query(q.id).await?;
        return Ok(());
    };

    tracing::info!(
        "Callback received: '{}' from user {} in chat {}",
        data, q.from.id.0, chat_id.0
    );

    let action = match parse_callback_data(&data) {
        Ok(action) => action,
        Err(e) => {
            tracing::warn!("Rejected callback '{}': {}", data, e);
            bot.answer_callback_query(q.id).text("❌ This button is no longer valid").await?;
            return Ok(());
        }
    };

    if let Err(e) = User::record_interaction(&state.db.pool, chat_id.0).await {
        log_database_error("update", "users", &e.to_string());
    }

    match action {
        CallbackAction::Rsvp(status) => {
            match User::set_attendance(&state.db.pool, chat_id.0, status).await {
                Ok(true) => {
                    bot.answer_callback_query(q.id.clone())
                        .text(format!("Saved: {}", status.label()))
                        .await?;
                    if let Some(message) = &q.message {
                        let text = format!("{}\n\n{}", status.label(), rsvp_confirmation(status));
                        if let Err(e) = bot.edit_message_text(chat_id, message.id, text).await {
                            tracing::warn!("Failed to update RSVP message: {}", e);
                        }
                    }
                }
                Ok(false) => {
                    bot.answer_callback_query(q.id)
                        .text("Please send /start first")
                        .await?;
                }
                Err(e) => {
                    log_database_error("update", "users", &e.to_string());
                    bot.answer_callback_query(q.id)
                        .text("Failed to save your answer")
                        .await?;
                }
            }
        }
        CallbackAction::Menu(MenuItem::Rsvp) => {
            bot.answer_callback_query(q.id).await?;
            bot.send_message(chat_id, "Will you join us?")
                .reply_markup(inline_keyboard(rsvp_buttons()))
                .await?;
        }
        CallbackAction::Menu(MenuItem::Details) => {
            bot.answer_callback_query(q.id).await?;
            match state.content.event_details().await {
                Ok(details) => {
                    bot.send_message(chat_id, render_event_details(&details))
                        .parse_mode(ParseMode::MarkdownV2)
                        .await?;
                }
                Err(e) => {
                    tracing::warn!("Event details unavailable: {}", e);
                    bot.send_message(chat_id, "Event details will be shared soon.").await?;
                }
            }
        }
        CallbackAction::Menu(MenuItem::UsefulInfo) => {
            bot.answer_callback_query(q.id).await?;
            match state.content.useful_info().await {
                Ok(items) => {
                    bot.send_message(chat_id, render_useful_info(&items))
                        .parse_mode(ParseMode::MarkdownV2)
                        .await?;
                }
                Err(e) => {
                    tracing::warn!("Useful info unavailable: {}", e);
                    bot.send_message(chat_id, "More information will be shared soon.").await?;
                }
            }
        }
    }

    Ok(())
}
