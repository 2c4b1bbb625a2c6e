use tracing::{debug, error, info, warn};

/// Logs command start with consistent format
pub fn log_command_start(command: &str, user: &str, user_id: i64, chat_id: i64) {
    info!("CMD_START: {} by {}({}) in chat {}", command, user, user_id, chat_id);
}

/// Logs command completion with consistent format
pub fn log_command_success(command: &str, user: &str, user_id: i64, details: Option<&str>) {
    match details {
        Some(d) => info!("CMD_SUCCESS: {} by {}({}) - {}", command, user, user_id, d),
        None => info!("CMD_SUCCESS: {} by {}({})", command, user, user_id),
    }
}

/// Logs command errors with consistent format
pub fn log_command_error(command: &str, user: &str, user_id: i64, error: &str) {
    error!("CMD_ERROR: {} by {}({}) - {}", command, user, user_id, error);
}

pub fn log_broadcast_start(broadcast_id: &str, mode: &str, recipients: usize) {
    info!(
        "BROADCAST_START: {} ({}) to {} recipients",
        broadcast_id, mode, recipients
    );
}

pub fn log_broadcast_done(broadcast_id: &str, delivered: usize, failed: usize, blocked: usize) {
    info!(
        "BROADCAST_DONE: {} - delivered {}, failed {} (blocked {})",
        broadcast_id, delivered, failed, blocked
    );
}

pub fn log_delivery_failure(broadcast_id: &str, chat_id: i64, kind: &str, error: &str) {
    warn!(
        "DELIVERY_FAILED: {} to chat {} [{}] - {}",
        broadcast_id, chat_id, kind, error
    );
}

pub fn log_sequence_step(sequence_id: &str, step: &str, success: bool) {
    debug!(
        "SEQUENCE_STEP: {} {} {}",
        sequence_id,
        step,
        if success { "delivered" } else { "failed" }
    );
}

/// Logs database errors with consistent format
pub fn log_database_error(operation: &str, table: &str, error: &str) {
    error!("DB_ERROR: {} on {} failed: {}", operation, table, error);
}

/// Logs system events with consistent format
pub fn log_system_event(event: &str, details: Option<&str>) {
    match details {
        Some(d) => info!("SYSTEM: {} - {}", event, d),
        None => info!("SYSTEM: {}", event),
    }
}
