//! Channel trait and the message types that flow through it.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChannelError;

/// Stable identifier of one conversation, assigned by the chat transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// One inbound chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Name of the channel that produced this message.
    pub channel: String,
    pub chat_id: ChatId,
    pub user_name: Option<String>,
    /// `None` for non-text messages (stickers, photos, ...).
    pub text: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    /// Create a text message.
    pub fn new(channel: &str, chat_id: impl Into<ChatId>, text: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            chat_id: chat_id.into(),
            user_name: None,
            text: Some(text.to_string()),
            received_at: Utc::now(),
        }
    }

    /// Create a message that carries no text payload.
    pub fn without_text(channel: &str, chat_id: impl Into<ChatId>) -> Self {
        Self {
            text: None,
            ..Self::new(channel, chat_id, "")
        }
    }
}

/// Reply text sent back to the chat a message came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingResponse {
    pub content: String,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Ordered stream of inbound messages.
///
/// An `Err` item means the transport stopped for good; nothing follows it.
pub type MessageStream =
    Pin<Box<dyn Stream<Item = Result<IncomingMessage, ChannelError>> + Send>>;

/// A bidirectional chat transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name, used in logs and on every produced message.
    fn name(&self) -> &str;

    /// Start receiving. The stream yields `Err` and ends when the transport
    /// gives up.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Send a reply to the chat `msg` came from.
    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_message_carries_text() {
        let msg = IncomingMessage::new("telegram", ChatId(42), "hello");
        assert_eq!(msg.chat_id, ChatId(42));
        assert_eq!(msg.text.as_deref(), Some("hello"));
        assert_eq!(msg.channel, "telegram");
        assert!(msg.user_name.is_none());
    }

    #[test]
    fn without_text_has_no_payload() {
        let msg = IncomingMessage::without_text("telegram", ChatId(42));
        assert!(msg.text.is_none());
    }

    #[test]
    fn chat_id_displays_as_number() {
        assert_eq!(ChatId(-100123).to_string(), "-100123");
    }
}
