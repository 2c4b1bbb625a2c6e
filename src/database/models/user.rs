use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

const USER_COLUMNS: &str =
    "id, chat_id, username, display_name, attendance_status, interaction_count, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Attending,
    NotAttending,
    Maybe,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Attending => "attending",
            AttendanceStatus::NotAttending => "not_attending",
            AttendanceStatus::Maybe => "maybe",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AttendanceStatus::Attending => "✅ Attending",
            AttendanceStatus::NotAttending => "❌ Not attending",
            AttendanceStatus::Maybe => "🤔 Maybe",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "attending" => Ok(AttendanceStatus::Attending),
            "not_attending" => Ok(AttendanceStatus::NotAttending),
            "maybe" => Ok(AttendanceStatus::Maybe),
            other => Err(format!("Unknown attendance status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub chat_id: i64,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub attendance_status: Option<String>, // 'attending', 'not_attending', 'maybe'
    pub interaction_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn attendance(&self) -> Option<AttendanceStatus> {
        self.attendance_status.as_deref().and_then(|s| s.parse().ok())
    }

    pub fn updated_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.updated_at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Best name to address the user by in logs and messages.
    pub fn label(&self) -> String {
        self.display_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(self.username.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| format!("chat {}", self.chat_id))
    }

    /// Inserts the user or refreshes the handle of an existing one. The display name is
    /// only filled in when the user has none yet.
    pub async fn register(
        pool: &sqlx::SqlitePool,
        chat_id: i64,
        username: Option<String>,
        display_name: Option<String>,
    ) -> Result<Self, sqlx::Error> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO users (chat_id, username, display_name, interaction_count, created_at, updated_at)
            VALUES (?, ?, ?, 1, ?, ?)
            ON CONFLICT(chat_id) DO UPDATE SET
                username = excluded.username,
                display_name = COALESCE(users.display_name, excluded.display_name),
                interaction_count = users.interaction_count + 1,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(chat_id)
        .bind(&username)
        .bind(&display_name)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await?;

        Self::find_by_chat_id(pool, chat_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn find_by_chat_id(
        pool: &sqlx::SqlitePool,
        chat_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE chat_id = ?"))
            .bind(chat_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_all(pool: &sqlx::SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_attendance(
        pool: &sqlx::SqlitePool,
        statuses: &[AttendanceStatus],
    ) -> Result<Vec<Self>, sqlx::Error> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = statuses.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE attendance_status IN ({placeholders}) ORDER BY id"
        );

        let mut query_builder = sqlx::query_as::<_, User>(&query);
        for status in statuses {
            query_builder = query_builder.bind(status.as_str());
        }

        query_builder.fetch_all(pool).await
    }

    pub async fn set_display_name(
        pool: &sqlx::SqlitePool,
        chat_id: i64,
        display_name: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET display_name = ?, interaction_count = interaction_count + 1, updated_at = ? WHERE chat_id = ?",
        )
        .bind(display_name.trim())
        .bind(Utc::now().to_rfc3339())
        .bind(chat_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_attendance(
        pool: &sqlx::SqlitePool,
        chat_id: i64,
        status: AttendanceStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET attendance_status = ?, interaction_count = interaction_count + 1, updated_at = ? WHERE chat_id = ?",
        )
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(chat_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn record_interaction(
        pool: &sqlx::SqlitePool,
        chat_id: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET interaction_count = interaction_count + 1 WHERE chat_id = ?")
            .bind(chat_id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
