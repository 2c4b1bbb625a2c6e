use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A scheduled pre-event reminder that has gone out.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub days_before: i64,
    pub recipients: i64,
    pub sent_at: String,
}

impl Reminder {
    pub async fn create(
        pool: &sqlx::SqlitePool,
        days_before: i64,
        recipients: i64,
    ) -> Result<Self, sqlx::Error> {
        let id = Uuid::new_v4().to_string();
        let sent_at = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO reminders (id, days_before, recipients, sent_at) VALUES (?, ?, ?, ?)"
        )
        .bind(&id)
        .bind(days_before)
        .bind(recipients)
        .bind(&sent_at)
        .execute(pool)
        .await?;

        Ok(Reminder {
            id,
            days_before,
            recipients,
            sent_at,
        })
    }

    pub async fn exists(
        pool: &sqlx::SqlitePool,
        days_before: i64,
    ) -> Result<bool, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM reminders WHERE days_before = ?"
        )
        .bind(days_before)
        .fetch_one(pool)
        .await?;

        Ok(count > 0)
    }

    pub async fn find_all(pool: &sqlx::SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Reminder>(
            "SELECT id, days_before, recipients, sent_at FROM reminders ORDER BY days_before DESC"
        )
        .fetch_all(pool)
        .await
    }
}
