use teloxide::prelude::*;
use teloxide::types::ParseMode;

use crate::bot::handlers::{BotState, HandlerResult};
use crate::database::models::{AttendanceStatus, User};
use crate::services::content::{
    menu_buttons, render_event_details, render_useful_info, EventContentProvider,
};
use crate::services::transport::{inline_keyboard, MenuButton};
use crate::utils::feedback::CommandFeedback;
use crate::utils::logging::{log_command_error, log_database_error};
use crate::utils::markdown::{bold, escape_markdown};
use crate::utils::validation::validate_display_name;

pub const RSVP_CALLBACK_PREFIX: &str = "rsvp:";

pub fn rsvp_callback(status: AttendanceStatus) -> String {
    format!("{RSVP_CALLBACK_PREFIX}{}", status.as_str())
}

pub fn rsvp_buttons() -> Vec<Vec<MenuButton>> {
    vec![
        vec![MenuButton::new(AttendanceStatus::Attending.label(), rsvp_callback(AttendanceStatus::Attending))],
        vec![MenuButton::new(AttendanceStatus::Maybe.label(), rsvp_callback(AttendanceStatus::Maybe))],
        vec![MenuButton::new(
            AttendanceStatus::NotAttending.label(),
            rsvp_callback(AttendanceStatus::NotAttending),
        )],
    ]
}

pub fn welcome_text(user: &User, event_title: &str) -> String {
    let mut text = format!("💍 Welcome to {}\\!\n\n", bold(&escape_markdown(event_title)));

    match &user.display_name {
        Some(name) => text.push_str(&format!("Good to see you, {}\\.\n", escape_markdown(name))),
        None => text.push_str("First, tell us who you are: send /name followed by your full name\\.\n"),
    }

    match user.attendance() {
        Some(status) => text.push_str(&format!("Your RSVP: {}\n", escape_markdown(status.label()))),
        None => text.push_str("Then use /rsvp to let us know whether you can make it\\.\n"),
    }

    text.push_str("\nUse /menu at any time to see what else I can do\\.");
    text
}

pub fn rsvp_confirmation(status: AttendanceStatus) -> &'static str {
    match status {
        AttendanceStatus::Attending => "Wonderful, we can't wait to celebrate with you!",
        AttendanceStatus::Maybe => "No problem, let us know once you are sure.",
        AttendanceStatus::NotAttending => "We'll miss you! Thanks for letting us know.",
    }
}

pub async fn handle_start(bot: Bot, msg: Message, user: User, state: &BotState) -> HandlerResult {
    bot.send_message(msg.chat.id, welcome_text(&user, &state.config.event.title))
        .parse_mode(ParseMode::MarkdownV2)
        .await?;
    Ok(())
}

pub async fn handle_name(bot: Bot, msg: Message, name: String, state: &BotState) -> HandlerResult {
    let feedback = CommandFeedback::new(bot, msg.chat.id);
    let name = name.trim();

    if let Err(e) = validate_display_name(name) {
        feedback
            .validation_error(&e.to_string(), "Send /name followed by your full name, e.g. /name Jane Doe")
            .await?;
        return Ok(());
    }

    match User::set_display_name(&state.db.pool, msg.chat.id.0, name).await {
        Ok(true) => {
            feedback.success(&format!("Thanks, {name}! Use /rsvp to let us know if you're coming.")).await?;
        }
        Ok(false) => {
            feedback.error("I don't know you yet, please send /start first.").await?;
        }
        Err(e) => {
            log_database_error("update", "users", &e.to_string());
            feedback.error("Could not save your name, please try again later.").await?;
        }
    }

    Ok(())
}

pub async fn handle_rsvp(bot: Bot, msg: Message, user: User) -> HandlerResult {
    let current = match user.attendance() {
        Some(status) => format!("Your current answer: {}\n\n", status.label()),
        None => String::new(),
    };

    bot.send_message(msg.chat.id, format!("{current}Will you join us?"))
        .reply_markup(inline_keyboard(rsvp_buttons()))
        .await?;
    Ok(())
}

/// Event details followed by useful information, as far as it is available.
pub async fn event_info_text(content: &dyn EventContentProvider) -> Option<String> {
    let details = match content.event_details().await {
        Ok(details) => Some(render_event_details(&details)),
        Err(e) => {
            tracing::warn!("Event details unavailable: {}", e);
            None
        }
    };
    let info = content.useful_info().await.ok().map(|items| render_useful_info(&items));

    match (details, info) {
        (Some(details), Some(info)) => Some(format!("{details}\n{info}")),
        (Some(text), None) | (None, Some(text)) => Some(text),
        (None, None) => None,
    }
}

pub async fn handle_info(bot: Bot, msg: Message, state: &BotState) -> HandlerResult {
    match event_info_text(state.content.as_ref()).await {
        Some(text) => {
            bot.send_message(msg.chat.id, text)
                .parse_mode(ParseMode::MarkdownV2)
                .await?;
        }
        None => {
            log_command_error("/info", "guest", msg.chat.id.0, "no event content available");
            CommandFeedback::new(bot, msg.chat.id)
                .info("Event details will be shared soon.")
                .await?;
        }
    }
    Ok(())
}

pub async fn handle_menu(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, "What would you like to do?")
        .reply_markup(inline_keyboard(menu_buttons()))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(display_name: Option<&str>, status: Option<&str>) -> User {
        User {
            id: 1,
            chat_id: 100,
            username: Some("jane".to_string()),
            display_name: display_name.map(str::to_string),
            attendance_status: status.map(str::to_string),
            interaction_count: 1,
            created_at: "2025-01-01T00:00:00Z".to_string(),
            updated_at: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_rsvp_buttons_cover_every_status() {
        let data: Vec<String> = rsvp_buttons()
            .into_iter()
            .flatten()
            .map(|b| b.callback_data)
            .collect();
        assert_eq!(data, vec!["rsvp:attending", "rsvp:maybe", "rsvp:not_attending"]);
    }

    #[test]
    fn test_welcome_prompts_for_missing_profile() {
        let text = welcome_text(&user(None, None), "Anna & Ben");
        assert!(text.contains("/name"));
        assert!(text.contains("/rsvp"));
    }

    #[test]
    fn test_welcome_for_complete_profile() {
        let text = welcome_text(&user(Some("Jane"), Some("attending")), "Anna & Ben");
        assert!(text.contains("Good to see you, Jane"));
        assert!(!text.contains("/name"));
        assert!(text.contains("Attending"));
    }
}
