use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

const LOG_COLUMNS: &str = "id, broadcast_id, message_text, sent_by, total_users, delivered_count, \
    failed_count, blocked_count, enhanced_mode, sequence_completion_rate, eligible_users_count, \
    useful_info_delivered, event_details_delivered, menu_trigger_delivered, sequence_failures, created_at";

/// Summary row written once per broadcast. Diagnostic only: the in-memory result
/// returned by the coordinator is authoritative for the caller.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BroadcastLog {
    pub id: i64,
    pub broadcast_id: String,
    pub message_text: String,
    pub sent_by: i64,
    pub total_users: i64,
    pub delivered_count: i64,
    pub failed_count: i64,
    pub blocked_count: i64,
    pub enhanced_mode: bool,
    pub sequence_completion_rate: f64,
    pub eligible_users_count: i64,
    pub useful_info_delivered: i64,
    pub event_details_delivered: i64,
    pub menu_trigger_delivered: i64,
    pub sequence_failures: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewBroadcastLog {
    pub broadcast_id: String,
    pub message_text: String,
    pub sent_by: i64,
    pub total_users: i64,
    pub delivered_count: i64,
    pub failed_count: i64,
    pub blocked_count: i64,
    pub enhanced_mode: bool,
    pub sequence_completion_rate: f64,
    pub eligible_users_count: i64,
    pub useful_info_delivered: i64,
    pub event_details_delivered: i64,
    pub menu_trigger_delivered: i64,
    pub sequence_failures: i64,
}

impl BroadcastLog {
    pub async fn create(
        pool: &sqlx::SqlitePool,
        record: &NewBroadcastLog,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO broadcast_logs (
                broadcast_id, message_text, sent_by, total_users, delivered_count, failed_count,
                blocked_count, enhanced_mode, sequence_completion_rate, eligible_users_count,
                useful_info_delivered, event_details_delivered, menu_trigger_delivered,
                sequence_failures, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.broadcast_id)
        .bind(&record.message_text)
        .bind(record.sent_by)
        .bind(record.total_users)
        .bind(record.delivered_count)
        .bind(record.failed_count)
        .bind(record.blocked_count)
        .bind(record.enhanced_mode)
        .bind(record.sequence_completion_rate)
        .bind(record.eligible_users_count)
        .bind(record.useful_info_delivered)
        .bind(record.event_details_delivered)
        .bind(record.menu_trigger_delivered)
        .bind(record.sequence_failures)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find_by_broadcast_id(
        pool: &sqlx::SqlitePool,
        broadcast_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, BroadcastLog>(&format!(
            "SELECT {LOG_COLUMNS} FROM broadcast_logs WHERE broadcast_id = ?"
        ))
        .bind(broadcast_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_recent(
        pool: &sqlx::SqlitePool,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, BroadcastLog>(&format!(
            "SELECT {LOG_COLUMNS} FROM broadcast_logs ORDER BY id DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Folds the outcome of a retry into the summary counts. Retried recipients were
    /// already counted as failed, so `recovered` moves from failed to delivered and
    /// `newly_blocked` stays failed but is now also counted as blocked.
    pub async fn apply_retry(
        pool: &sqlx::SqlitePool,
        broadcast_id: &str,
        recovered: i64,
        newly_blocked: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE broadcast_logs SET delivered_count = delivered_count + ?, \
             failed_count = MAX(failed_count - ?, 0), blocked_count = blocked_count + ? \
             WHERE broadcast_id = ?",
        )
        .bind(recovered)
        .bind(recovered)
        .bind(newly_blocked)
        .bind(broadcast_id)
        .execute(pool)
        .await?;
        Ok(())
    }
}
