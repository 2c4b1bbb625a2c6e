//! Event content served to guests: useful information, event details and the menu.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EventConfig;
use crate::services::transport::{MenuButton, OutboundMessage};
use crate::utils::datetime::format_datetime;
use crate::utils::markdown::{bold, escape_markdown};

pub const MENU_RSVP: &str = "menu:rsvp";
pub const MENU_DETAILS: &str = "menu:details";
pub const MENU_USEFUL_INFO: &str = "menu:info";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContentError {
    #[error("no useful information is configured")]
    Empty,
    #[error("content unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDetails {
    pub title: String,
    pub date: Option<DateTime<Utc>>,
    pub venue: String,
    pub address: String,
    pub dress_code: Option<String>,
}

#[async_trait]
pub trait EventContentProvider: Send + Sync {
    async fn useful_info(&self) -> Result<Vec<String>, ContentError>;

    async fn event_details(&self) -> Result<EventDetails, ContentError>;
}

/// Content taken from configuration at startup.
#[derive(Debug, Clone)]
pub struct StaticEventContent {
    details: EventDetails,
    useful_info: Vec<String>,
}

impl StaticEventContent {
    pub fn new(details: EventDetails, useful_info: Vec<String>) -> Self {
        Self { details, useful_info }
    }

    pub fn from_config(event: &EventConfig) -> Self {
        Self::new(
            EventDetails {
                title: event.title.clone(),
                date: event.date,
                venue: event.venue.clone(),
                address: event.address.clone(),
                dress_code: event.dress_code.clone(),
            },
            event.useful_info.clone(),
        )
    }
}

#[async_trait]
impl EventContentProvider for StaticEventContent {
    async fn useful_info(&self) -> Result<Vec<String>, ContentError> {
        if self.useful_info.is_empty() {
            return Err(ContentError::Empty);
        }
        Ok(self.useful_info.clone())
    }

    async fn event_details(&self) -> Result<EventDetails, ContentError> {
        Ok(self.details.clone())
    }
}

pub fn render_useful_info(items: &[String]) -> String {
    let mut text = format!("ℹ️ {}\n\n", bold("Useful information"));
    for item in items {
        text.push_str(&format!("• {}\n", escape_markdown(item)));
    }
    text
}

pub fn render_event_details(details: &EventDetails) -> String {
    let when = details
        .date
        .map(|d| format_datetime(&d))
        .unwrap_or_else(|| "Date to be announced".to_string());

    let mut text = format!(
        "💍 {}\n\n📅 {} {}\n📍 {} {}\n🗺️ {} {}\n",
        bold(&escape_markdown(&details.title)),
        bold("When:"),
        escape_markdown(&when),
        bold("Where:"),
        escape_markdown(&details.venue),
        bold("Address:"),
        escape_markdown(&details.address),
    );

    if let Some(dress_code) = &details.dress_code {
        text.push_str(&format!("👗 {} {}\n", bold("Dress code:"), escape_markdown(dress_code)));
    }

    text
}

pub fn menu_buttons() -> Vec<Vec<MenuButton>> {
    vec![
        vec![MenuButton::new("📝 My RSVP", MENU_RSVP)],
        vec![
            MenuButton::new("💍 Event details", MENU_DETAILS),
            MenuButton::new("ℹ️ Useful info", MENU_USEFUL_INFO),
        ],
    ]
}

/// Reduced main menu, built here so the broadcast pipeline does not depend on the
/// command layer.
pub fn render_menu(chat_id: i64) -> OutboundMessage {
    OutboundMessage::plain(chat_id, "What would you like to do next?").with_buttons(menu_buttons())
}
