use anyhow::{anyhow, Result};
use crate::database::models::AttendanceStatus;

/// Telegram rejects text messages longer than this.
pub const MAX_MESSAGE_LENGTH: usize = 4096;

pub fn validate_broadcast_message(message: &str) -> Result<()> {
    let message = message.trim();

    if message.is_empty() {
        return Err(anyhow!("Broadcast message cannot be empty"));
    }

    if message.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(anyhow!(
            "Broadcast message cannot be longer than {} characters",
            MAX_MESSAGE_LENGTH
        ));
    }

    Ok(())
}

pub fn validate_display_name(name: &str) -> Result<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(anyhow!("Name cannot be empty"));
    }

    if name.chars().count() < 2 {
        return Err(anyhow!("Name must be at least 2 characters long"));
    }

    if name.chars().count() > 64 {
        return Err(anyhow!("Name cannot be longer than 64 characters"));
    }

    if name.contains('\n') || name.contains('\r') {
        return Err(anyhow!("Name cannot contain line breaks"));
    }

    Ok(())
}

pub fn validate_telegram_chat_id(chat_id: i64) -> Result<()> {
    if chat_id == 0 {
        return Err(anyhow!("Chat ID cannot be zero"));
    }

    // Private chats are positive 32-bit ids
    if chat_id > 2147483647 {
        return Err(anyhow!("Invalid user chat ID range"));
    }

    // Supergroups go down to around -10^12
    if chat_id < -2000000000000 {
        return Err(anyhow!("Chat ID out of valid range"));
    }

    Ok(())
}

pub fn validate_attendance_status(status: &str) -> Result<AttendanceStatus> {
    status
        .parse::<AttendanceStatus>()
        .map_err(|_| anyhow!("Attendance must be 'attending', 'not_attending', or 'maybe'"))
}

pub fn validate_broadcast_id(broadcast_id: &str) -> Result<()> {
    let broadcast_id = broadcast_id.trim();

    if broadcast_id.is_empty() {
        return Err(anyhow!("Broadcast ID cannot be empty"));
    }

    if broadcast_id.len() < 8 || broadcast_id.len() > 64 {
        return Err(anyhow!("Broadcast ID must be between 8 and 64 characters long"));
    }

    if !broadcast_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(anyhow!("Broadcast ID can only contain letters, numbers, hyphens and underscores"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_broadcast_message() {
        assert!(validate_broadcast_message("See you at the ceremony!").is_ok());
        assert!(validate_broadcast_message("   ").is_err());
        assert!(validate_broadcast_message(&"a".repeat(MAX_MESSAGE_LENGTH)).is_ok());
        assert!(validate_broadcast_message(&"a".repeat(MAX_MESSAGE_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_display_name() {
        assert!(validate_display_name("Anna").is_ok());
        assert!(validate_display_name("  Jo  ").is_ok());
        assert!(validate_display_name("A").is_err());
        assert!(validate_display_name("Anna\nMaria").is_err());
        assert!(validate_display_name(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_telegram_chat_id() {
        assert!(validate_telegram_chat_id(12345).is_ok());
        assert!(validate_telegram_chat_id(-1001234567890).is_ok());
        assert!(validate_telegram_chat_id(0).is_err());
        assert!(validate_telegram_chat_id(3000000000).is_err());
        assert!(validate_telegram_chat_id(-3000000000000).is_err());
    }

    #[test]
    fn test_validate_attendance_status() {
        assert_eq!(validate_attendance_status("attending").ok(), Some(AttendanceStatus::Attending));
        assert_eq!(validate_attendance_status("MAYBE").ok(), Some(AttendanceStatus::Maybe));
        assert!(validate_attendance_status("yes").is_err());
    }

    #[test]
    fn test_validate_broadcast_id() {
        assert!(validate_broadcast_id("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_broadcast_id("short").is_err());
        assert!(validate_broadcast_id("abc 12345").is_err());
    }
}
