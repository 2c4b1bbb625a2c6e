//! Outbound messaging seam between the broadcast pipeline and the chat client.
//!
//! The pipeline only needs two capabilities from the transport: a cheap "who am I"
//! call to validate the bot credential, and sending one message to one chat.
//! [`TelegramTransport`] provides both over teloxide; tests swap in their own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode};
use thiserror::Error;

/// Identity reported by the transport for the configured credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    pub username: Option<String>,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuButton {
    pub label: String,
    pub callback_data: String,
}

impl MenuButton {
    pub fn new(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            callback_data: callback_data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub chat_id: i64,
    pub text: String,
    /// Send with Telegram MarkdownV2 formatting; the text must already be escaped.
    pub markdown: bool,
    pub buttons: Vec<Vec<MenuButton>>,
}

impl OutboundMessage {
    pub fn plain(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            markdown: false,
            buttons: Vec::new(),
        }
    }

    pub fn markdown(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            markdown: true,
            ..Self::plain(chat_id, text)
        }
    }

    pub fn with_buttons(mut self, buttons: Vec<Vec<MenuButton>>) -> Self {
        self.buttons = buttons;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
    pub message_id: i32,
}

/// A failed transport call. Only the message text is carried because that is all the
/// classification has to go on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<teloxide::RequestError> for TransportError {
    fn from(err: teloxide::RequestError) -> Self {
        Self::new(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The user blocked the bot or the chat is otherwise forbidden.
    Blocked,
    RateLimited,
    Failed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Blocked => "blocked",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Failed => "failed",
        }
    }
}

/// Maps a transport error onto the delivery taxonomy by inspecting its text.
pub fn classify_error(error: &TransportError) -> ErrorKind {
    let text = error.message.to_lowercase();

    if text.contains("blocked") || text.contains("forbidden") {
        ErrorKind::Blocked
    } else if text.contains("too many requests")
        || text.contains("retry after")
        || text.contains("429")
    {
        ErrorKind::RateLimited
    } else {
        ErrorKind::Failed
    }
}

#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Validates the credential and returns the bot's own identity.
    async fn get_me(&self) -> Result<BotIdentity, TransportError>;

    async fn send_message(&self, message: OutboundMessage) -> Result<SentMessage, TransportError>;
}

pub fn inline_keyboard(buttons: Vec<Vec<MenuButton>>) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = buttons
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|b| InlineKeyboardButton::callback(b.label, b.callback_data))
                .collect()
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}

#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl MessageTransport for TelegramTransport {
    async fn get_me(&self) -> Result<BotIdentity, TransportError> {
        let me = self.bot.get_me().await?;

        Ok(BotIdentity {
            id: me.user.id.0 as i64,
            username: me.user.username.clone(),
            display_name: me.user.first_name.clone(),
        })
    }

    async fn send_message(&self, message: OutboundMessage) -> Result<SentMessage, TransportError> {
        let mut request = self.bot.send_message(ChatId(message.chat_id), message.text);

        if message.markdown {
            request = request.parse_mode(ParseMode::MarkdownV2);
        }

        if !message.buttons.is_empty() {
            request = request.reply_markup(inline_keyboard(message.buttons));
        }

        let sent = request.await?;
        Ok(SentMessage { message_id: sent.id.0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_blocked() {
        let err = TransportError::new("Forbidden: bot was blocked by the user");
        assert_eq!(classify_error(&err), ErrorKind::Blocked);
    }

    #[test]
    fn test_classify_rate_limited() {
        assert_eq!(
            classify_error(&TransportError::new("Too Many Requests: retry after 5")),
            ErrorKind::RateLimited
        );
        assert_eq!(
            classify_error(&TransportError::new("api error 429")),
            ErrorKind::RateLimited
        );
    }

    #[test]
    fn test_classify_everything_else_failed() {
        assert_eq!(
            classify_error(&TransportError::new("Bad Request: chat not found")),
            ErrorKind::Failed
        );
        assert_eq!(classify_error(&TransportError::new("")), ErrorKind::Failed);
    }

    #[test]
    fn test_outbound_builders() {
        let msg = OutboundMessage::markdown(42, "*hi*")
            .with_buttons(vec![vec![MenuButton::new("RSVP", "menu:rsvp")]]);
        assert!(msg.markdown);
        assert_eq!(msg.chat_id, 42);
        assert_eq!(msg.buttons[0][0].callback_data, "menu:rsvp");
    }
}
