use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use crate::bot::commands::{admin, guest, Command};
use crate::bot::handlers::{BotState, HandlerResult};
use crate::database::models::User;
use crate::utils::feedback::CommandFeedback;
use crate::utils::logging::{log_command_start, log_database_error};
use crate::utils::validation::validate_telegram_chat_id;

pub async fn command_handler(
    bot: Bot,
    msg: Message,
    cmd: Command,
    state: BotState,
) -> HandlerResult {
    let (user_id, username) = match msg.from() {
        Some(user) => (user.id.0 as i64, user.username.clone()),
        None => (msg.chat.id.0, None),
    };
    log_command_start(cmd.name(), username.as_deref().unwrap_or("unknown"), user_id, msg.chat.id.0);

    if cmd.is_admin_only() {
        if !state.config.is_admin(user_id) {
            CommandFeedback::new(bot, msg.chat.id)
                .error("This command is only available to the organisers.")
                .await?;
            return Ok(());
        }

        return match cmd {
            Command::Broadcast(text) => admin::handle_broadcast(bot, msg, text, &state).await,
            Command::Enhanced(text) => admin::handle_enhanced(bot, msg, text, &state).await,
            Command::Retry(id) => admin::handle_retry(bot, msg, id, &state).await,
            Command::Audience => admin::handle_audience(bot, msg, &state).await,
            _ => Ok(()),
        };
    }

    if !msg.chat.is_private() {
        bot.send_message(msg.chat.id, "Please message me directly so I can keep your RSVP private.")
            .await?;
        return Ok(());
    }

    if let Err(e) = validate_telegram_chat_id(msg.chat.id.0) {
        tracing::warn!("Ignoring {} from chat {}: {}", cmd.name(), msg.chat.id.0, e);
        return Ok(());
    }

    // Guests are registered, or their activity counted, on every command
    let user = match User::register(&state.db.pool, msg.chat.id.0, username, None).await {
        Ok(user) => user,
        Err(e) => {
            log_database_error("upsert", "users", &e.to_string());
            CommandFeedback::new(bot, msg.chat.id)
                .error("Something went wrong, please try again later.")
                .await?;
            return Ok(());
        }
    };

    match cmd {
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string()).await?;
        }
        Command::Start => guest::handle_start(bot, msg, user, &state).await?,
        Command::Name(name) => guest::handle_name(bot, msg, name, &state).await?,
        Command::Rsvp => guest::handle_rsvp(bot, msg, user).await?,
        Command::Info => guest::handle_info(bot, msg, &state).await?,
        Command::Menu => guest::handle_menu(bot, msg).await?,
        Command::Broadcast(_) | Command::Enhanced(_) | Command::Retry(_) | Command::Audience => {}
    }

    Ok(())
}
