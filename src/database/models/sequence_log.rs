use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SequenceStepLog {
    pub id: i64,
    pub user_id: i64,
    pub broadcast_id: String,
    pub step: String,
    pub status: String, // 'delivered', 'failed'
    pub sequence_id: String,
    pub completion_rate: f64,
    pub error_text: Option<String>,
    pub created_at: String,
}

impl SequenceStepLog {
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        pool: &sqlx::SqlitePool,
        user_id: i64,
        broadcast_id: &str,
        step: &str,
        status: &str,
        sequence_id: &str,
        completion_rate: f64,
        error_text: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO sequence_step_logs (user_id, broadcast_id, step, status, sequence_id, completion_rate, error_text, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(broadcast_id)
        .bind(step)
        .bind(status)
        .bind(sequence_id)
        .bind(completion_rate)
        .bind(error_text)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn find_by_broadcast(
        pool: &sqlx::SqlitePool,
        broadcast_id: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, SequenceStepLog>(
            "SELECT id, user_id, broadcast_id, step, status, sequence_id, completion_rate, error_text, created_at FROM sequence_step_logs WHERE broadcast_id = ? ORDER BY id"
        )
        .bind(broadcast_id)
        .fetch_all(pool)
        .await
    }
}
