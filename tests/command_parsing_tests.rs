#![allow(clippy::unwrap_used)]

use teloxide::utils::command::BotCommands;
use wedding_rsvp_bot::bot::commands::guest::{rsvp_buttons, RSVP_CALLBACK_PREFIX};
use wedding_rsvp_bot::bot::commands::Command;
use wedding_rsvp_bot::bot::handlers::callback::{parse_callback_data, CallbackAction, MenuItem};
use wedding_rsvp_bot::database::models::AttendanceStatus;
use wedding_rsvp_bot::services::content::menu_buttons;

#[cfg(test)]
mod command_parsing_tests {
    use super::*;

    #[test]
    fn test_simple_commands() {
        assert_eq!(Command::parse("/help", "testbot").ok(), Some(Command::Help));
        assert_eq!(Command::parse("/start", "testbot").ok(), Some(Command::Start));
        assert_eq!(Command::parse("/rsvp", "testbot").ok(), Some(Command::Rsvp));
        assert_eq!(Command::parse("/info", "testbot").ok(), Some(Command::Info));
        assert_eq!(Command::parse("/menu", "testbot").ok(), Some(Command::Menu));
        assert_eq!(Command::parse("/audience", "testbot").ok(), Some(Command::Audience));
    }

    #[test]
    fn test_name_command_keeps_full_argument() {
        let result = Command::parse("/name Jane Doe", "testbot");
        assert_eq!(result.ok(), Some(Command::Name("Jane Doe".to_string())));
    }

    #[test]
    fn test_broadcast_commands_with_arguments() {
        assert_eq!(
            Command::parse("/broadcast See you soon!", "testbot").ok(),
            Some(Command::Broadcast("See you soon!".to_string()))
        );
        assert_eq!(
            Command::parse("/enhanced batch_size=5 Hello guests", "testbot").ok(),
            Some(Command::Enhanced("batch_size=5 Hello guests".to_string()))
        );
        assert_eq!(
            Command::parse("/retry abcdef12-3456", "testbot").ok(),
            Some(Command::Retry("abcdef12-3456".to_string()))
        );
    }

    #[test]
    fn test_command_with_bot_mention() {
        assert_eq!(Command::parse("/start@testbot", "testbot").ok(), Some(Command::Start));
        assert!(Command::parse("/start@otherbot", "testbot").is_err());
    }

    #[test]
    fn test_invalid_commands() {
        assert!(Command::parse("/unknown", "testbot").is_err());
        assert!(Command::parse("hello", "testbot").is_err());
    }

    #[test]
    fn test_admin_only_commands() {
        assert!(Command::Broadcast(String::new()).is_admin_only());
        assert!(Command::Enhanced(String::new()).is_admin_only());
        assert!(Command::Retry(String::new()).is_admin_only());
        assert!(Command::Audience.is_admin_only());
        assert!(!Command::Rsvp.is_admin_only());
        assert!(!Command::Name(String::new()).is_admin_only());
        assert_eq!(Command::Enhanced(String::new()).name(), "/enhanced");
    }
}

#[cfg(test)]
mod callback_parsing_tests {
    use super::*;

    #[test]
    fn test_rsvp_callbacks() {
        assert_eq!(
            parse_callback_data("rsvp:attending"),
            Ok(CallbackAction::Rsvp(AttendanceStatus::Attending))
        );
        assert_eq!(
            parse_callback_data("rsvp:not_attending"),
            Ok(CallbackAction::Rsvp(AttendanceStatus::NotAttending))
        );
        assert!(parse_callback_data("rsvp:perhaps").is_err());
    }

    #[test]
    fn test_every_rsvp_button_parses() {
        for button in rsvp_buttons().into_iter().flatten() {
            assert!(button.callback_data.starts_with(RSVP_CALLBACK_PREFIX));
            assert!(matches!(
                parse_callback_data(&button.callback_data),
                Ok(CallbackAction::Rsvp(_))
            ));
        }
    }

    #[test]
    fn test_menu_callbacks() {
        let items: Vec<_> = menu_buttons()
            .into_iter()
            .flatten()
            .map(|b| parse_callback_data(&b.callback_data))
            .collect();

        assert_eq!(
            items,
            vec![
                Ok(CallbackAction::Menu(MenuItem::Rsvp)),
                Ok(CallbackAction::Menu(MenuItem::Details)),
                Ok(CallbackAction::Menu(MenuItem::UsefulInfo)),
            ]
        );
    }

    #[test]
    fn test_unknown_callback() {
        let err = parse_callback_data("menu:cake").unwrap_err();
        assert!(err.contains("menu:cake"));
    }
}
