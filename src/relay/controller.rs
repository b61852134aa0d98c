//! Relay controller — the per-chat state machine and the main loop.
//!
//! Every chat is in one of two states:
//!
//! - [`ChatState::AwaitingEmail`]: no pending address. Text is treated as an
//!   email candidate.
//! - [`ChatState::AwaitingMessage`]: an address is pending. The next text is
//!   mailed to it, and the address is dropped whether or not the send works.
//!
//! `/start` is checked before the state, so it never touches a pending address.

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;

use crate::channels::{Channel, ChatId, IncomingMessage, OutgoingResponse};
use crate::error::Error;
use crate::relay::mailer::Mailer;
use crate::relay::prompts;
use crate::relay::session::SessionStore;
use crate::relay::validator::is_valid_email;

/// Where a chat is in the two-step form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    AwaitingEmail,
    AwaitingMessage,
}

/// What handling one message did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Message had no text.
    Ignored,
    Welcome,
    EmailAccepted,
    EmailRejected,
    Sent,
    SendFailed,
}

impl Outcome {
    /// Text to send back to the chat, if any.
    pub fn reply(&self) -> Option<&'static str> {
        match self {
            Self::Ignored => None,
            Self::Welcome => Some(prompts::WELCOME),
            Self::EmailAccepted => Some(prompts::EMAIL_ACCEPTED),
            Self::EmailRejected => Some(prompts::EMAIL_INVALID),
            Self::Sent => Some(prompts::SEND_SUCCESS),
            Self::SendFailed => Some(prompts::SEND_FAILURE),
        }
    }
}

/// Consumes chat messages one at a time and relays them as email.
pub struct Relay {
    mailer: Arc<dyn Mailer>,
    sessions: SessionStore,
}

impl Relay {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self {
            mailer,
            sessions: SessionStore::new(),
        }
    }

    pub fn state(&self, chat: ChatId) -> ChatState {
        if self.sessions.pending(chat).is_some() {
            ChatState::AwaitingMessage
        } else {
            ChatState::AwaitingEmail
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Apply one message to its chat's state.
    ///
    /// Mail errors are logged here and come back as [`Outcome::SendFailed`].
    pub async fn handle_message(&mut self, msg: &IncomingMessage) -> Outcome {
        let Some(text) = msg.text.as_deref() else {
            tracing::debug!(chat_id = %msg.chat_id, "Ignoring message without text");
            return Outcome::Ignored;
        };

        if text == prompts::START_COMMAND {
            return Outcome::Welcome;
        }

        if let Some(email) = self.sessions.take(msg.chat_id) {
            return match self.mailer.send(&email, text).await {
                Ok(()) => {
                    tracing::info!(chat_id = %msg.chat_id, "Relayed message by email");
                    Outcome::Sent
                }
                Err(e) => {
                    tracing::error!(chat_id = %msg.chat_id, "Failed to send email: {e}");
                    Outcome::SendFailed
                }
            };
        }

        if is_valid_email(text) {
            tracing::debug!(chat_id = %msg.chat_id, "Email accepted, awaiting message");
            self.sessions.insert(msg.chat_id, text);
            Outcome::EmailAccepted
        } else {
            Outcome::EmailRejected
        }
    }

    /// Run until `shutdown` resolves or the channel's stream ends.
    ///
    /// Each message is handled and answered before the next one is pulled,
    /// so shutdown never interrupts a message halfway. A channel that stops
    /// with an error makes `run` return that error.
    pub async fn run<F>(mut self, channel: &dyn Channel, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        let mut message_stream = channel.start().await?;
        tokio::pin!(shutdown);

        tracing::info!(channel = channel.name(), "Relay ready and listening");

        let mut stopped_by = None;
        loop {
            let message = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping...");
                    break;
                }
                msg = message_stream.next() => {
                    match msg {
                        Some(Ok(m)) => m,
                        Some(Err(e)) => {
                            stopped_by = Some(e);
                            break;
                        }
                        None => {
                            tracing::info!("Channel stream ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            let outcome = self.handle_message(&message).await;
            tracing::debug!(chat_id = %message.chat_id, ?outcome, "Handled message");

            if let Some(reply) = outcome.reply()
                && let Err(e) = channel
                    .respond(&message, OutgoingResponse::text(reply))
                    .await
            {
                tracing::warn!(chat_id = %message.chat_id, "Failed to send reply: {e}");
            }
        }

        if let Err(e) = channel.shutdown().await {
            tracing::warn!("Channel shutdown failed: {e}");
        }

        match stopped_by {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}
