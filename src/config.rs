use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_DATABASE_URL: &str = "sqlite:./data/wedding.db";

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_bot_token: String,
    pub database_url: String,
    pub http_port: u16,
    /// Telegram user ids allowed to run admin commands (`/broadcast`, `/enhanced`, ...)
    pub admin_user_ids: Vec<i64>,
    pub event: EventConfig,
    pub broadcast: BroadcastConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let token = env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| anyhow!("TELEGRAM_BOT_TOKEN must be set"))?;

        if token.trim().is_empty() {
            return Err(anyhow!("TELEGRAM_BOT_TOKEN must be set"));
        }

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
        let database_url = if database_url.trim().is_empty() {
            DEFAULT_DATABASE_URL.to_string()
        } else {
            database_url
        };

        let port_str = env::var("HTTP_PORT")
            .unwrap_or_else(|_| "3000".to_string());
        let http_port = port_str.trim()
            .parse()
            .map_err(|_| anyhow!("Invalid HTTP_PORT"))?;

        let admin_user_ids = match env::var("ADMIN_USER_IDS") {
            Ok(raw) => parse_admin_ids(&raw)?,
            Err(_) => Vec::new(),
        };

        let broadcast = BroadcastConfig::merge(
            &BroadcastConfig::default(),
            &BroadcastConfigOverrides::from_env(),
        );

        Ok(Config {
            telegram_bot_token: token,
            database_url,
            http_port,
            admin_user_ids,
            event: EventConfig::from_env()?,
            broadcast,
        })
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_user_ids.contains(&user_id)
    }
}

fn parse_admin_ids(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>().map_err(|_| anyhow!("Invalid ADMIN_USER_IDS entry: {}", s)))
        .collect()
}

/// Static facts about the wedding, served by the content provider and used for reminders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    pub title: String,
    pub date: Option<DateTime<Utc>>,
    pub venue: String,
    pub address: String,
    pub dress_code: Option<String>,
    pub useful_info: Vec<String>,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            title: "Our Wedding".to_string(),
            date: None,
            venue: "To be announced".to_string(),
            address: "To be announced".to_string(),
            dress_code: None,
            useful_info: Vec::new(),
        }
    }
}

impl EventConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let date = match env::var("EVENT_DATE") {
            Ok(raw) if !raw.trim().is_empty() => Some(
                DateTime::parse_from_rfc3339(raw.trim())
                    .map_err(|_| anyhow!("Invalid EVENT_DATE, expected RFC3339"))?
                    .with_timezone(&Utc),
            ),
            _ => None,
        };

        let useful_info = env::var("EVENT_USEFUL_INFO")
            .map(|raw| {
                raw.split('|')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            title: non_empty_var("EVENT_TITLE").unwrap_or(defaults.title),
            date,
            venue: non_empty_var("EVENT_VENUE").unwrap_or(defaults.venue),
            address: non_empty_var("EVENT_ADDRESS").unwrap_or(defaults.address),
            dress_code: non_empty_var("EVENT_DRESS_CODE"),
            useful_info,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Knobs for the broadcast engine, the follow-up sequence and the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Recipients per concurrent send batch.
    pub batch_size: usize,
    /// Delay before every non-first send inside a batch.
    pub message_delay_ms: u64,
    /// Delay between sends when retrying failed deliveries.
    pub retry_delay_ms: u64,
    /// Pause between consecutive steps of one user's follow-up sequence.
    pub sequence_delay_ms: u64,
    /// Users whose follow-up sequences run concurrently.
    pub max_users_per_batch: usize,
    /// Pause between follow-up sequence batches.
    pub batch_processing_delay_ms: u64,
    /// Upper bound on a single sequence step.
    pub sequence_timeout_ms: u64,
    /// Users scoring below this are left out of the enhanced audience.
    pub min_eligibility_score: u8,
    pub send_useful_info: bool,
    pub send_event_details: bool,
    pub send_menu_trigger: bool,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            batch_size: 30,
            message_delay_ms: 100,
            retry_delay_ms: 1000,
            sequence_delay_ms: 2000,
            max_users_per_batch: 10,
            batch_processing_delay_ms: 5000,
            sequence_timeout_ms: 30_000,
            min_eligibility_score: 0,
            send_useful_info: true,
            send_event_details: true,
            send_menu_trigger: true,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid broadcast configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

impl BroadcastConfig {
    /// Returns `base` with every field present in `overrides` replaced.
    pub fn merge(base: &BroadcastConfig, overrides: &BroadcastConfigOverrides) -> BroadcastConfig {
        BroadcastConfig {
            batch_size: overrides.batch_size.unwrap_or(base.batch_size),
            message_delay_ms: overrides.message_delay_ms.unwrap_or(base.message_delay_ms),
            retry_delay_ms: overrides.retry_delay_ms.unwrap_or(base.retry_delay_ms),
            sequence_delay_ms: overrides.sequence_delay_ms.unwrap_or(base.sequence_delay_ms),
            max_users_per_batch: overrides.max_users_per_batch.unwrap_or(base.max_users_per_batch),
            batch_processing_delay_ms: overrides
                .batch_processing_delay_ms
                .unwrap_or(base.batch_processing_delay_ms),
            sequence_timeout_ms: overrides.sequence_timeout_ms.unwrap_or(base.sequence_timeout_ms),
            min_eligibility_score: overrides
                .min_eligibility_score
                .unwrap_or(base.min_eligibility_score),
            send_useful_info: overrides.send_useful_info.unwrap_or(base.send_useful_info),
            send_event_details: overrides.send_event_details.unwrap_or(base.send_event_details),
            send_menu_trigger: overrides.send_menu_trigger.unwrap_or(base.send_menu_trigger),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.batch_size == 0 {
            problems.push("batch_size must be greater than zero".to_string());
        }
        if self.max_users_per_batch == 0 {
            problems.push("max_users_per_batch must be greater than zero".to_string());
        }
        if self.min_eligibility_score > 100 {
            problems.push("min_eligibility_score must be between 0 and 100".to_string());
        }
        if self.sequence_timeout_ms == 0 {
            problems.push("sequence_timeout_ms must be greater than zero".to_string());
        }
        // Telegram allows roughly 30 messages per second across chats
        if self.batch_size > 30 && self.message_delay_ms == 0 {
            problems.push("batch_size above 30 requires a non-zero message_delay_ms".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    pub fn message_delay(&self) -> Duration {
        Duration::from_millis(self.message_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn sequence_delay(&self) -> Duration {
        Duration::from_millis(self.sequence_delay_ms)
    }

    pub fn batch_processing_delay(&self) -> Duration {
        Duration::from_millis(self.batch_processing_delay_ms)
    }

    pub fn sequence_timeout(&self) -> Duration {
        Duration::from_millis(self.sequence_timeout_ms)
    }
}

/// Partial [`BroadcastConfig`]; `None` keeps the base value on merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BroadcastConfigOverrides {
    pub batch_size: Option<usize>,
    pub message_delay_ms: Option<u64>,
    pub retry_delay_ms: Option<u64>,
    pub sequence_delay_ms: Option<u64>,
    pub max_users_per_batch: Option<usize>,
    pub batch_processing_delay_ms: Option<u64>,
    pub sequence_timeout_ms: Option<u64>,
    pub min_eligibility_score: Option<u8>,
    pub send_useful_info: Option<bool>,
    pub send_event_details: Option<bool>,
    pub send_menu_trigger: Option<bool>,
}

impl BroadcastConfigOverrides {
    pub fn from_env() -> Self {
        Self::from_pairs(env::vars())
    }

    /// Builds overrides from `BROADCAST_*` key/value pairs. Unknown keys are ignored,
    /// unparsable values are skipped with a warning.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut overrides = Self::default();

        for (key, value) in pairs {
            let key = key.as_ref();
            let value = value.as_ref().trim();
            match key {
                "BROADCAST_BATCH_SIZE" => overrides.batch_size = parse_override(key, value),
                "BROADCAST_MESSAGE_DELAY_MS" => overrides.message_delay_ms = parse_override(key, value),
                "BROADCAST_RETRY_DELAY_MS" => overrides.retry_delay_ms = parse_override(key, value),
                "BROADCAST_SEQUENCE_DELAY_MS" => overrides.sequence_delay_ms = parse_override(key, value),
                "BROADCAST_MAX_USERS_PER_BATCH" => {
                    overrides.max_users_per_batch = parse_override(key, value)
                }
                "BROADCAST_BATCH_PROCESSING_DELAY_MS" => {
                    overrides.batch_processing_delay_ms = parse_override(key, value)
                }
                "BROADCAST_SEQUENCE_TIMEOUT_MS" => {
                    overrides.sequence_timeout_ms = parse_override(key, value)
                }
                "BROADCAST_MIN_ELIGIBILITY_SCORE" => {
                    overrides.min_eligibility_score = parse_override(key, value)
                }
                "BROADCAST_SEND_USEFUL_INFO" => overrides.send_useful_info = parse_flag(key, value),
                "BROADCAST_SEND_EVENT_DETAILS" => overrides.send_event_details = parse_flag(key, value),
                "BROADCAST_SEND_MENU_TRIGGER" => overrides.send_menu_trigger = parse_flag(key, value),
                _ => {}
            }
        }

        overrides
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring invalid value '{}' for {}", value, key);
            None
        }
    }
}

fn parse_flag(key: &str, value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!("Ignoring invalid flag '{}' for {}", value, key);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_base_when_no_overrides() {
        let base = BroadcastConfig::default();
        let merged = BroadcastConfig::merge(&base, &BroadcastConfigOverrides::default());
        assert_eq!(merged, base);
    }

    #[test]
    fn test_from_pairs_parses_known_keys() {
        let overrides = BroadcastConfigOverrides::from_pairs(vec![
            ("BROADCAST_BATCH_SIZE", "5"),
            ("BROADCAST_SEND_MENU_TRIGGER", "off"),
            ("BROADCAST_SEQUENCE_DELAY_MS", "not-a-number"),
            ("UNRELATED", "1"),
        ]);

        assert_eq!(overrides.batch_size, Some(5));
        assert_eq!(overrides.send_menu_trigger, Some(false));
        assert_eq!(overrides.sequence_delay_ms, None);
    }

    #[test]
    fn test_parse_admin_ids() {
        assert_eq!(parse_admin_ids("1, 2,,3").ok(), Some(vec![1, 2, 3]));
        assert!(parse_admin_ids("1,abc").is_err());
    }
}
