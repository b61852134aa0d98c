//! Integration tests for the relay loop.
//!
//! Each test feeds a scripted message stream through `Relay::run` using a stub
//! channel and a stub mailer, then checks the replies and the mails sent.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use mail_relay::channels::{Channel, ChatId, IncomingMessage, MessageStream, OutgoingResponse};
use mail_relay::config::SmtpConfig;
use mail_relay::error::{ChannelError, Error, MailError};
use mail_relay::relay::{Mailer, Relay, SmtpMailer, prompts};
use secrecy::SecretString;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Channel that replays a fixed list of messages, then ends its stream.
///
/// With `disconnect_with` set, the stream ends with that error instead.
struct ScriptedChannel {
    script: Mutex<Vec<IncomingMessage>>,
    replies: Mutex<Vec<(i64, String)>>,
    fail_replies: bool,
    disconnect_with: Option<String>,
}

impl ScriptedChannel {
    fn new(script: Vec<IncomingMessage>) -> Self {
        Self {
            script: Mutex::new(script),
            replies: Mutex::new(Vec::new()),
            fail_replies: false,
            disconnect_with: None,
        }
    }

    fn replies(&self) -> Vec<(i64, String)> {
        self.replies.lock().unwrap().clone()
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let messages = std::mem::take(&mut *self.script.lock().unwrap());
        let mut items: Vec<Result<IncomingMessage, ChannelError>> =
            messages.into_iter().map(Ok).collect();
        if let Some(reason) = &self.disconnect_with {
            items.push(Err(ChannelError::Disconnected {
                name: "scripted".into(),
                reason: reason.clone(),
            }));
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        self.replies
            .lock()
            .unwrap()
            .push((msg.chat_id.0, response.content));
        if self.fail_replies {
            return Err(ChannelError::SendFailed {
                name: "scripted".into(),
                reason: "chat unreachable".into(),
            });
        }
        Ok(())
    }
}

/// Channel whose stream never yields.
struct SilentChannel;

#[async_trait]
impl Channel for SilentChannel {
    fn name(&self) -> &str {
        "silent"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        Ok(Box::pin(futures::stream::pending()))
    }

    async fn respond(
        &self,
        _msg: &IncomingMessage,
        _response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Channel that cannot start.
struct BrokenChannel;

#[async_trait]
impl Channel for BrokenChannel {
    fn name(&self) -> &str {
        "broken"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        Err(ChannelError::StartupFailed {
            name: "broken".into(),
            reason: "no network".into(),
        })
    }

    async fn respond(
        &self,
        _msg: &IncomingMessage,
        _response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Mailer that records sends and fails for one chosen recipient.
#[derive(Default)]
struct RecordingMailer {
    fail_for: Option<String>,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingMailer {
    fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, body: &str) -> Result<(), MailError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        if self.fail_for.as_deref() == Some(to) {
            return Err(MailError::Transport("relay unreachable".into()));
        }
        Ok(())
    }
}

fn text(chat: i64, text: &str) -> IncomingMessage {
    IncomingMessage::new("scripted", chat, text)
}

async fn run_script(
    channel: &ScriptedChannel,
    mailer: Arc<dyn Mailer>,
) -> Result<(), Error> {
    timeout(
        TEST_TIMEOUT,
        Relay::new(mailer).run(channel, std::future::pending::<()>()),
    )
    .await
    .expect("relay did not stop at end of stream")
}

#[tokio::test]
async fn full_conversation_replies_in_order() {
    let channel = ScriptedChannel::new(vec![
        text(7, "/start"),
        text(7, "not-an-email"),
        text(7, "user@example.com"),
        text(7, "Hello there"),
        text(7, "Hello again"),
    ]);
    let mailer = Arc::new(RecordingMailer::default());

    run_script(&channel, mailer.clone()).await.unwrap();

    let replies: Vec<String> = channel.replies().into_iter().map(|(_, r)| r).collect();
    assert_eq!(
        replies,
        vec![
            prompts::WELCOME,
            prompts::EMAIL_INVALID,
            prompts::EMAIL_ACCEPTED,
            prompts::SEND_SUCCESS,
            prompts::EMAIL_INVALID,
        ]
    );
    assert_eq!(
        mailer.sent(),
        vec![("user@example.com".to_string(), "Hello there".to_string())]
    );
}

#[tokio::test]
async fn failed_send_reports_generic_notice_and_resets() {
    let channel = ScriptedChannel::new(vec![
        text(7, "down@example.com"),
        text(7, "Hello there"),
        text(7, "ok@example.com"),
        text(7, "Second try"),
    ]);
    let mailer = Arc::new(RecordingMailer {
        fail_for: Some("down@example.com".into()),
        ..Default::default()
    });

    run_script(&channel, mailer.clone()).await.unwrap();

    let replies: Vec<String> = channel.replies().into_iter().map(|(_, r)| r).collect();
    assert_eq!(
        replies,
        vec![
            prompts::EMAIL_ACCEPTED,
            prompts::SEND_FAILURE,
            prompts::EMAIL_ACCEPTED,
            prompts::SEND_SUCCESS,
        ]
    );
    assert_eq!(mailer.sent().len(), 2);
}

#[tokio::test]
async fn interleaved_chats_keep_their_own_addresses() {
    let channel = ScriptedChannel::new(vec![
        text(1, "a@b.com"),
        text(2, "a@b.com"),
        text(1, "from one"),
        text(2, "from two"),
    ]);
    let mailer = Arc::new(RecordingMailer::default());

    run_script(&channel, mailer.clone()).await.unwrap();

    assert_eq!(
        mailer.sent(),
        vec![
            ("a@b.com".to_string(), "from one".to_string()),
            ("a@b.com".to_string(), "from two".to_string()),
        ]
    );
    assert_eq!(
        channel.replies(),
        vec![
            (1, prompts::EMAIL_ACCEPTED.to_string()),
            (2, prompts::EMAIL_ACCEPTED.to_string()),
            (1, prompts::SEND_SUCCESS.to_string()),
            (2, prompts::SEND_SUCCESS.to_string()),
        ]
    );
}

#[tokio::test]
async fn messages_without_text_get_no_reply() {
    let channel = ScriptedChannel::new(vec![
        IncomingMessage::without_text("scripted", ChatId(3)),
        text(3, "/start"),
    ]);
    let mailer = Arc::new(RecordingMailer::default());

    run_script(&channel, mailer).await.unwrap();

    assert_eq!(channel.replies(), vec![(3, prompts::WELCOME.to_string())]);
}

#[tokio::test]
async fn reply_failures_do_not_stop_the_loop() {
    let mut channel = ScriptedChannel::new(vec![
        text(4, "user@example.com"),
        text(4, "body"),
    ]);
    channel.fail_replies = true;
    let mailer = Arc::new(RecordingMailer::default());

    run_script(&channel, mailer.clone()).await.unwrap();

    assert_eq!(channel.replies().len(), 2);
    assert_eq!(mailer.sent().len(), 1);
}

#[tokio::test]
async fn shutdown_signal_stops_an_idle_relay() {
    let mailer = Arc::new(RecordingMailer::default());
    let result = timeout(
        TEST_TIMEOUT,
        Relay::new(mailer).run(&SilentChannel, std::future::ready(())),
    )
    .await
    .expect("relay ignored shutdown");
    assert!(result.is_ok());
}

#[tokio::test]
async fn channel_start_failure_is_returned() {
    let mailer = Arc::new(RecordingMailer::default());
    let err = Relay::new(mailer)
        .run(&BrokenChannel, std::future::pending::<()>())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no network"), "{err}");
}

#[tokio::test]
async fn channel_disconnect_is_returned_after_earlier_messages() {
    let mut channel = ScriptedChannel::new(vec![text(5, "/start")]);
    channel.disconnect_with = Some("error 401: Unauthorized".into());
    let mailer = Arc::new(RecordingMailer::default());

    let err = run_script(&channel, mailer).await.unwrap_err();

    assert!(
        matches!(err, Error::Channel(ChannelError::Disconnected { .. })),
        "{err:?}"
    );
    assert!(err.to_string().contains("Unauthorized"), "{err}");
    assert_eq!(channel.replies(), vec![(5, prompts::WELCOME.to_string())]);
}

#[tokio::test]
async fn missing_smtp_settings_fail_the_send_not_the_relay() {
    let channel = ScriptedChannel::new(vec![
        text(6, "user@example.com"),
        text(6, "Hello there"),
        text(6, "/start"),
    ]);
    let mailer = Arc::new(SmtpMailer::new(&SmtpConfig {
        server: None,
        sender: None,
        password: SecretString::from(""),
        timeout: Duration::from_secs(1),
    }));

    run_script(&channel, mailer).await.unwrap();

    let replies: Vec<String> = channel.replies().into_iter().map(|(_, r)| r).collect();
    assert_eq!(
        replies,
        vec![
            prompts::EMAIL_ACCEPTED,
            prompts::SEND_FAILURE,
            prompts::WELCOME,
        ]
    );
}
