#![allow(dead_code, clippy::unwrap_used)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use wedding_rsvp_bot::config::BroadcastConfig;
use wedding_rsvp_bot::database::connection::DatabaseManager;
use wedding_rsvp_bot::database::models::{AttendanceStatus, User};
use wedding_rsvp_bot::services::content::{ContentError, EventContentProvider, EventDetails, StaticEventContent};
use wedding_rsvp_bot::services::transport::{
    BotIdentity, MessageTransport, OutboundMessage, SentMessage, TransportError,
};

pub const BLOCKED_ERROR: &str = "Forbidden: bot was blocked by the user";

pub async fn setup_test_db() -> (DatabaseManager, TempDir) {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let db_url = format!("sqlite:{}", db_path.to_string_lossy());

    let db = DatabaseManager::new(&db_url).await.unwrap();
    db.run_migrations().await.unwrap();
    (db, dir)
}

pub async fn insert_user(
    db: &DatabaseManager,
    chat_id: i64,
    display_name: Option<&str>,
    status: Option<AttendanceStatus>,
) -> User {
    User::register(&db.pool, chat_id, Some(format!("guest{chat_id}")), display_name.map(str::to_string))
        .await
        .unwrap();
    if let Some(status) = status {
        User::set_attendance(&db.pool, chat_id, status).await.unwrap();
    }
    User::find_by_chat_id(&db.pool, chat_id).await.unwrap().unwrap()
}

/// Broadcast settings without any waiting, for tests.
pub fn fast_config() -> BroadcastConfig {
    BroadcastConfig {
        message_delay_ms: 0,
        retry_delay_ms: 0,
        sequence_delay_ms: 0,
        batch_processing_delay_ms: 0,
        sequence_timeout_ms: 2_000,
        ..BroadcastConfig::default()
    }
}

pub fn event_details() -> EventDetails {
    EventDetails {
        title: "Anna & Ben".to_string(),
        date: None,
        venue: "Villa Rosa".to_string(),
        address: "12 Garden St.".to_string(),
        dress_code: None,
    }
}

pub fn test_content() -> Arc<dyn EventContentProvider> {
    Arc::new(StaticEventContent::new(
        event_details(),
        vec!["Parking is free".to_string(), "Shuttle leaves at 3pm".to_string()],
    ))
}

/// Content whose useful info takes `delay` to load.
pub struct SlowContent {
    pub delay: Duration,
}

#[async_trait]
impl EventContentProvider for SlowContent {
    async fn useful_info(&self) -> Result<Vec<String>, ContentError> {
        tokio::time::sleep(self.delay).await;
        Ok(vec!["Late but here".to_string()])
    }

    async fn event_details(&self) -> Result<EventDetails, ContentError> {
        Ok(event_details())
    }
}

/// Records every message and fails the ones it was told to.
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<OutboundMessage>>,
    attempts: AtomicUsize,
    identity_error: Option<String>,
    chat_errors: HashMap<i64, String>,
    text_errors: Vec<(String, String)>,
    fail_every: Option<usize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity_error(mut self, error: &str) -> Self {
        self.identity_error = Some(error.to_string());
        self
    }

    /// Every send to `chat_id` fails with `error`.
    pub fn failing_chat(mut self, chat_id: i64, error: &str) -> Self {
        self.chat_errors.insert(chat_id, error.to_string());
        self
    }

    /// Every send whose text contains `fragment` fails with `error`.
    pub fn failing_text(mut self, fragment: &str, error: &str) -> Self {
        self.text_errors.push((fragment.to_string(), error.to_string()));
        self
    }

    /// Every `n`th send attempt fails.
    pub fn failing_every(mut self, n: usize) -> Self {
        self.fail_every = Some(n);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: i64) -> Vec<OutboundMessage> {
        self.sent_messages()
            .into_iter()
            .filter(|m| m.chat_id == chat_id)
            .collect()
    }
}

#[async_trait]
impl MessageTransport for MockTransport {
    async fn get_me(&self) -> Result<BotIdentity, TransportError> {
        match &self.identity_error {
            Some(error) => Err(TransportError::new(error.clone())),
            None => Ok(BotIdentity {
                id: 42,
                username: Some("wedding_test_bot".to_string()),
                display_name: "Wedding Bot".to_string(),
            }),
        }
    }

    async fn send_message(&self, message: OutboundMessage) -> Result<SentMessage, TransportError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(n) = self.fail_every {
            if attempt % n == 0 {
                return Err(TransportError::new("Bad Request: simulated failure"));
            }
        }
        if let Some(error) = self.chat_errors.get(&message.chat_id) {
            return Err(TransportError::new(error.clone()));
        }
        if let Some((_, error)) = self.text_errors.iter().find(|(f, _)| message.text.contains(f.as_str())) {
            return Err(TransportError::new(error.clone()));
        }

        let mut sent = self.sent.lock().unwrap();
        sent.push(message);
        Ok(SentMessage {
            message_id: sent.len() as i32,
        })
    }
}
