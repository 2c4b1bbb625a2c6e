use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Outcome of one recipient in one broadcast.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BroadcastDelivery {
    pub id: i64,
    pub broadcast_id: String,
    pub user_id: i64,
    pub chat_id: i64,
    pub status: String, // 'delivered', 'failed', 'blocked'
    pub error_text: Option<String>,
    pub attempted_at: String,
}

#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub user_id: i64,
    pub chat_id: i64,
    pub status: &'static str,
    pub error_text: Option<String>,
}

impl BroadcastDelivery {
    /// Writes (or overwrites) the outcome rows of a broadcast. Each row is an independent
    /// statement; a crash part way through leaves the earlier rows in place.
    pub async fn record_all(
        pool: &sqlx::SqlitePool,
        broadcast_id: &str,
        deliveries: &[NewDelivery],
    ) -> Result<usize, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let mut written = 0;

        for delivery in deliveries {
            sqlx::query(
                r#"
                INSERT INTO broadcast_deliveries (broadcast_id, user_id, chat_id, status, error_text, attempted_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(broadcast_id, user_id) DO UPDATE SET
                    status = excluded.status,
                    error_text = excluded.error_text,
                    attempted_at = excluded.attempted_at
                "#,
            )
            .bind(broadcast_id)
            .bind(delivery.user_id)
            .bind(delivery.chat_id)
            .bind(delivery.status)
            .bind(&delivery.error_text)
            .bind(&now)
            .execute(pool)
            .await?;
            written += 1;
        }

        Ok(written)
    }

    pub async fn find_by_broadcast(
        pool: &sqlx::SqlitePool,
        broadcast_id: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, BroadcastDelivery>(
            "SELECT id, broadcast_id, user_id, chat_id, status, error_text, attempted_at FROM broadcast_deliveries WHERE broadcast_id = ? ORDER BY id"
        )
        .bind(broadcast_id)
        .fetch_all(pool)
        .await
    }
}
