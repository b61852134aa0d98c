//! Outbound mail — one plain-text email per relayed message.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;

use crate::config::SmtpConfig;
use crate::error::MailError;
use crate::relay::prompts::MAIL_SUBJECT;

/// Port that speaks TLS from the first byte. Other ports upgrade with
/// STARTTLS when the server offers it and stay plain otherwise.
const IMPLICIT_TLS_PORT: u16 = 465;

/// Sends one email to one recipient.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Make a single delivery attempt. No retries.
    async fn send(&self, to: &str, body: &str) -> Result<(), MailError>;
}

/// SMTP submission with PLAIN auth via lettre.
///
/// Settings are checked on every send, so a missing or malformed value turns
/// into a failed delivery rather than a failed startup.
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Check that a send could at least be attempted with these settings.
    pub fn check(&self) -> Result<(), MailError> {
        self.sender()?;
        self.transport()?;
        Ok(())
    }

    fn sender(&self) -> Result<Mailbox, MailError> {
        let sender = self
            .config
            .sender
            .as_deref()
            .ok_or_else(|| MailError::NotConfigured("SMTP_EMAIL is not set".into()))?;

        sender
            .parse()
            .map_err(|e: lettre::address::AddressError| MailError::InvalidAddress {
                field: "from",
                address: sender.to_string(),
                reason: e.to_string(),
            })
    }

    fn transport(&self) -> Result<SmtpTransport, MailError> {
        let server = self
            .config
            .server
            .as_deref()
            .ok_or_else(|| MailError::NotConfigured("SMTP_SERVER is not set".into()))?;
        let (host, port) = split_host_port(server)?;

        let builder = if port == IMPLICIT_TLS_PORT {
            SmtpTransport::relay(host)
                .map_err(|e| MailError::Transport(format!("SMTP relay error: {e}")))?
        } else {
            let tls = TlsParameters::new(host.to_string())
                .map_err(|e| MailError::Transport(format!("SMTP TLS setup error: {e}")))?;
            SmtpTransport::builder_dangerous(host).tls(Tls::Opportunistic(tls))
        };

        let creds = Credentials::new(
            self.config.sender.clone().unwrap_or_default(),
            self.config.password.expose_secret().to_string(),
        );

        Ok(builder
            .port(port)
            .credentials(creds)
            .authentication(vec![Mechanism::Plain])
            .timeout(Some(self.config.timeout))
            .build())
    }

    /// Build the email. The body goes in verbatim.
    fn build_message(&self, to: &str, body: &str) -> Result<Message, MailError> {
        let from = self.sender()?;
        let to: Mailbox = to
            .parse()
            .map_err(|e: lettre::address::AddressError| MailError::InvalidAddress {
                field: "to",
                address: to.to_string(),
                reason: e.to_string(),
            })?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(MAIL_SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, body: &str) -> Result<(), MailError> {
        let email = self.build_message(to, body)?;
        let transport = self.transport()?;

        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| MailError::Task(e.to_string()))?
            .map_err(|e| MailError::Transport(e.to_string()))?;

        tracing::debug!("Email handed to SMTP server");
        Ok(())
    }
}

/// Split `host:port`. The port is mandatory.
fn split_host_port(server: &str) -> Result<(&str, u16), MailError> {
    let invalid = |message: String| MailError::NotConfigured(format!("SMTP_SERVER {message}"));

    let (host, port) = server
        .rsplit_once(':')
        .ok_or_else(|| invalid(format!("must be host:port, got {server:?}")))?;
    if host.is_empty() {
        return Err(invalid(format!("has an empty host: {server:?}")));
    }
    let port = port
        .parse::<u16>()
        .map_err(|e| invalid(format!("has a bad port in {server:?}: {e}")))?;

    Ok((host, port))
}
