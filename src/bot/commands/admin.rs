use chrono::Utc;
use teloxide::prelude::*;

use crate::bot::handlers::{BotState, HandlerResult};
use crate::config::BroadcastConfigOverrides;
use crate::database::models::User;
use crate::services::eligibility::{audience_report, AudienceReport};
use crate::services::enhanced_broadcast::{
    BroadcastRequest, EnhancedBroadcastResult, RetryResult, StandardBroadcastResult,
};
use crate::utils::feedback::{CommandFeedback, FeedbackType};
use crate::utils::logging::{log_command_error, log_command_success, log_database_error};
use crate::utils::validation::{validate_broadcast_id, validate_broadcast_message};

/// Splits leading `key=value` tokens off a broadcast command.
///
/// `/enhanced batch_size=10 send_menu_trigger=false Hello all` overrides two settings
/// for this run and sends "Hello all". Keys are the `BROADCAST_*` settings without
/// the prefix, in any case.
pub fn parse_broadcast_args(args: &str) -> (BroadcastConfigOverrides, String) {
    let mut pairs = Vec::new();
    let mut rest = args.trim_start();

    while let Some(token) = rest.split_whitespace().next() {
        let Some((key, value)) = token.split_once('=') else {
            break;
        };
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            break;
        }
        pairs.push((format!("BROADCAST_{}", key.to_uppercase()), value.to_string()));
        rest = rest[token.len()..].trim_start();
    }

    (BroadcastConfigOverrides::from_pairs(pairs), rest.trim().to_string())
}

pub fn format_standard_result(result: &StandardBroadcastResult) -> String {
    if !result.success {
        return format!(
            "Broadcast failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
    }

    format!(
        "Broadcast {} finished in {:.1}s\n\nRecipients: {}\nDelivered: {}\nFailed: {} (blocked: {})",
        result.message_id,
        result.duration_ms as f64 / 1000.0,
        result.stats.total,
        result.stats.delivered,
        result.stats.failed,
        result.stats.blocked,
    )
}

pub fn format_enhanced_result(result: &EnhancedBroadcastResult) -> String {
    let stats = &result.enhanced_stats;

    if !result.success {
        return format!(
            "Enhanced broadcast failed: {}\n\nUsers: {}, eligible: {}",
            result.error.as_deref().unwrap_or("unknown error"),
            stats.total,
            stats.eligible_for_enhanced,
        );
    }

    format!(
        "Enhanced broadcast {} finished in {:.1}s\n\n\
         Users: {}\nEligible: {}\n\n\
         Primary message: {} delivered, {} failed ({} blocked)\n\n\
         Useful info: {}\nEvent details: {}\nMenu: {}\n\n\
         Sequences completed: {} ({:.1}%)\nSequence failures: {}",
        result.message_id,
        result.duration_ms as f64 / 1000.0,
        stats.total,
        stats.eligible_for_enhanced,
        stats.standard_delivered,
        stats.standard_failed,
        stats.standard_blocked,
        stats.useful_info_delivered,
        stats.event_details_delivered,
        stats.menu_trigger_delivered,
        stats.enhanced_sequence_completed,
        stats.completion_rate,
        stats.sequence_failures,
    )
}

pub fn format_retry_result(result: &RetryResult) -> String {
    if !result.success {
        return format!(
            "Retry failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
    }

    if result.attempted == 0 {
        return format!(
            "Nothing to retry for {} ({} blocked recipients skipped)",
            result.broadcast_id, result.skipped_blocked
        );
    }

    format!(
        "Retry of {}\n\nAttempted: {}\nDelivered: {}\nStill failing: {} (blocked: {})\nSkipped blocked: {}",
        result.broadcast_id,
        result.attempted,
        result.delivered,
        result.failed,
        result.blocked,
        result.skipped_blocked,
    )
}

pub fn format_audience(report: &AudienceReport) -> String {
    let mut text = format!(
        "Audience\n\nRegistered: {}\nEligible for enhanced broadcast: {} ({:.1}%)\nIneligible: {}\n",
        report.stats.total,
        report.stats.eligible,
        report.stats.eligibility_rate,
        report.stats.ineligible,
    );

    for (reason, count) in &report.ineligible_reasons {
        text.push_str(&format!("  • {reason}: {count}\n"));
    }

    text.push_str(&format!(
        "\nAverage profile completeness: {:.0}%\nAverage engagement score: {:.0}",
        report.average_completeness, report.average_score
    ));
    text
}

fn admin_name(msg: &Message) -> String {
    msg.from()
        .and_then(|u| u.username.clone())
        .unwrap_or_else(|| "admin".to_string())
}

fn admin_id(msg: &Message) -> i64 {
    msg.from().map(|u| u.id.0 as i64).unwrap_or(msg.chat.id.0)
}

/// Outcome of checking a broadcast command before any delivery starts.
enum Prepared {
    /// The message was invalid and the admin has been told why.
    Rejected,
    /// Delivery can go ahead. Holds the placeholder message, if it could be posted.
    Started(Option<teloxide::types::MessageId>),
}

fn usage(command: &str) -> String {
    format!("Usage: {command} [setting=value ...] <message>")
}

/// Validates the message and posts the placeholder that will carry the result.
async fn prepare(feedback: &CommandFeedback, command: &str, message: &str) -> ResponseResult<Prepared> {
    if let Err(e) = validate_broadcast_message(message) {
        feedback.validation_error(&e.to_string(), &usage(command)).await?;
        return Ok(Prepared::Rejected);
    }

    let placeholder = feedback
        .send_processing("Broadcast started, I'll report back when it is done.")
        .await
        .ok()
        .map(|m| m.id);
    Ok(Prepared::Started(placeholder))
}

pub async fn handle_broadcast(bot: Bot, msg: Message, args: String, state: &BotState) -> HandlerResult {
    let feedback = CommandFeedback::new(bot, msg.chat.id);
    let (overrides, message) = parse_broadcast_args(&args);

    let Prepared::Started(placeholder) = prepare(&feedback, "/broadcast", &message).await? else {
        return Ok(());
    };

    let request = BroadcastRequest::new(message, admin_id(&msg)).with_overrides(overrides);
    let result = state.coordinator.standard_broadcast(request).await;
    let tone = if result.success {
        log_command_success("/broadcast", &admin_name(&msg), admin_id(&msg), Some(result.message_id.as_str()));
        FeedbackType::Success
    } else {
        log_command_error("/broadcast", &admin_name(&msg), admin_id(&msg), result.error.as_deref().unwrap_or(""));
        FeedbackType::Error
    };

    feedback.finish(placeholder, tone, &format_standard_result(&result)).await?;
    Ok(())
}

pub async fn handle_enhanced(bot: Bot, msg: Message, args: String, state: &BotState) -> HandlerResult {
    let feedback = CommandFeedback::new(bot, msg.chat.id);
    let (overrides, message) = parse_broadcast_args(&args);

    let Prepared::Started(placeholder) = prepare(&feedback, "/enhanced", &message).await? else {
        return Ok(());
    };

    let request = BroadcastRequest::new(message, admin_id(&msg)).with_overrides(overrides);
    let result = state.coordinator.enhanced_broadcast(request).await;
    let tone = if result.success {
        log_command_success("/enhanced", &admin_name(&msg), admin_id(&msg), Some(result.message_id.as_str()));
        if result.enhanced_stats.sequence_failures > 0 {
            FeedbackType::Warning
        } else {
            FeedbackType::Success
        }
    } else {
        log_command_error("/enhanced", &admin_name(&msg), admin_id(&msg), result.error.as_deref().unwrap_or(""));
        FeedbackType::Error
    };

    feedback.finish(placeholder, tone, &format_enhanced_result(&result)).await?;
    Ok(())
}

pub async fn handle_retry(bot: Bot, msg: Message, broadcast_id: String, state: &BotState) -> HandlerResult {
    let feedback = CommandFeedback::new(bot, msg.chat.id);
    let broadcast_id = broadcast_id.trim();

    if let Err(e) = validate_broadcast_id(broadcast_id) {
        feedback
            .validation_error(&e.to_string(), "Usage: /retry <broadcast id> (shown in the broadcast report)")
            .await?;
        return Ok(());
    }

    let result = state.coordinator.retry_failed_deliveries(broadcast_id).await;
    let tone = if !result.success {
        FeedbackType::Error
    } else if result.failed > 0 {
        FeedbackType::Warning
    } else {
        FeedbackType::Success
    };

    feedback.send(tone, &format_retry_result(&result)).await?;
    Ok(())
}

pub async fn handle_audience(bot: Bot, msg: Message, state: &BotState) -> HandlerResult {
    let feedback = CommandFeedback::new(bot, msg.chat.id);

    match User::find_all(&state.db.pool).await {
        Ok(users) => {
            let report = audience_report(&users, Utc::now());
            feedback.info(&format_audience(&report)).await?;
        }
        Err(e) => {
            log_database_error("select", "users", &e.to_string());
            feedback.error("Could not load guests, please try again later.").await?;
        }
    }

    Ok(())
}
