//! Telegram channel — long-polls the Bot API for updates.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use crate::channels::{Channel, ChatId, IncomingMessage, MessageStream, OutgoingResponse};
use crate::config::TelegramConfig;
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Pause after a failed poll before trying again.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Extra slack on top of the long-poll timeout before the HTTP request gives up.
const POLL_HTTP_SLACK: Duration = Duration::from_secs(10);

/// Telegram channel — connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    poll_timeout: Duration,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            bot_token: config.bot_token.clone(),
            poll_timeout: config.poll_timeout,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.api_base, &self.bot_token, method)
    }

    /// Call `getMe` and return the bot's username.
    pub async fn get_me(&self) -> Result<String, ChannelError> {
        let startup_failed = |reason: String| ChannelError::StartupFailed {
            name: "telegram".into(),
            reason,
        };

        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| startup_failed(e.without_url().to_string()))?;

        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| startup_failed(format!("getMe returned {status}: {}", e.without_url())))?;

        if !status.is_success() || data.get("ok").and_then(serde_json::Value::as_bool) != Some(true)
        {
            return Err(startup_failed(format!(
                "getMe returned {status}: {}",
                describe_api_error(&data)
            )));
        }

        data.get("result")
            .and_then(|r| r.get("username"))
            .and_then(serde_json::Value::as_str)
            .map(String::from)
            .ok_or_else(|| startup_failed("getMe response has no username".into()))
    }

    /// Send a plain text message, split to fit Telegram's 4096 char limit.
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<(), ChannelError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            self.send_message_chunk(chat_id, &chunk).await?;
        }
        Ok(())
    }

    async fn send_message_chunk(&self, chat_id: ChatId, text: &str) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "chat_id": chat_id.0,
            "text": text,
        });

        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.without_url().to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("sendMessage returned {status}: {err}"),
            });
        }

        Ok(())
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let poll_timeout = self.poll_timeout;
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!(
                timeout_secs = poll_timeout.as_secs(),
                "Telegram channel listening for messages..."
            );

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": poll_timeout.as_secs(),
                    "allowed_updates": ["message"]
                });

                let resp = match client
                    .post(&url)
                    .timeout(poll_timeout + POLL_HTTP_SLACK)
                    .json(&body)
                    .send()
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {}", e.without_url());
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                let data: serde_json::Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {}", e.without_url());
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                let results = match classify_poll_response(&data) {
                    PollResponse::Updates(results) => results,
                    PollResponse::Retry(reason) => {
                        tracing::warn!("Telegram getUpdates failed: {reason}");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                    PollResponse::Fatal(reason) => {
                        let _ = tx.send(Err(ChannelError::Disconnected {
                            name: "telegram".into(),
                            reason,
                        }));
                        return;
                    }
                };

                for update in results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(serde_json::Value::as_i64)
                    {
                        offset = uid + 1;
                    }

                    let Some(incoming) = parse_update(update) else {
                        continue;
                    };

                    if tx.send(Ok(incoming)).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        self.send_message(msg.chat_id, &response.content).await
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(api_base: &str, bot_token: &SecretString, method: &str) -> String {
    format!("{api_base}/bot{}/{method}", bot_token.expose_secret())
}

/// What one `getUpdates` reply tells the poller to do.
#[derive(Debug)]
enum PollResponse<'a> {
    Updates(&'a [serde_json::Value]),
    /// Transient failure; wait and poll again.
    Retry(String),
    /// The token is unusable; stop polling.
    Fatal(String),
}

fn classify_poll_response(data: &serde_json::Value) -> PollResponse<'_> {
    if data.get("ok").and_then(serde_json::Value::as_bool) != Some(true) {
        let code = data.get("error_code").and_then(serde_json::Value::as_i64);
        let reason = match code {
            Some(code) => format!("error {code}: {}", describe_api_error(data)),
            None => describe_api_error(data),
        };
        return if is_fatal_error_code(code) {
            PollResponse::Fatal(reason)
        } else {
            PollResponse::Retry(reason)
        };
    }

    match data.get("result").and_then(serde_json::Value::as_array) {
        Some(results) => PollResponse::Updates(results),
        None => PollResponse::Retry("response has no result array".into()),
    }
}

/// 401 and 404 mean the token is wrong or revoked; polling again won't help.
fn is_fatal_error_code(code: Option<i64>) -> bool {
    matches!(code, Some(401) | Some(404))
}

fn describe_api_error(data: &serde_json::Value) -> String {
    data.get("description")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("no description")
        .to_string()
}

/// Turn one `getUpdates` entry into an [`IncomingMessage`].
///
/// Returns `None` for updates that are not chat messages or have no chat id.
/// Messages without text come through with `text: None`.
pub fn parse_update(update: &serde_json::Value) -> Option<IncomingMessage> {
    let message = update.get("message")?;

    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(serde_json::Value::as_i64)?;

    let text = message
        .get("text")
        .and_then(serde_json::Value::as_str)
        .map(String::from);

    let user_name = message
        .get("from")
        .and_then(|f| f.get("username").or_else(|| f.get("first_name")))
        .and_then(serde_json::Value::as_str)
        .map(String::from);

    let received_at = message
        .get("date")
        .and_then(serde_json::Value::as_i64)
        .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
        .unwrap_or_else(Utc::now);

    Some(IncomingMessage {
        id: Uuid::new_v4(),
        channel: "telegram".into(),
        chat_id: ChatId(chat_id),
        user_name,
        text,
        received_at,
    })
}

/// Split a message into chunks that fit Telegram's length limit.
/// Tries to split on newlines, then spaces, then hard-cuts on a char boundary.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }

        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
