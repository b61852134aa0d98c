use std::sync::Arc;

use mail_relay::channels::TelegramChannel;
use mail_relay::config::RelayConfig;
use mail_relay::relay::{Relay, SmtpMailer};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }

    let (relay, telegram) = match start().await {
        Ok(parts) => parts,
        Err(e) => {
            tracing::error!("Startup failed: {e}");
            std::process::exit(1);
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    if let Err(e) = relay.run(&telegram, shutdown).await {
        tracing::error!("Relay stopped: {e}");
        std::process::exit(1);
    }
}

async fn start() -> mail_relay::error::Result<(Relay, TelegramChannel)> {
    let config = RelayConfig::from_env()?;

    eprintln!("✉️  Mail Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   SMTP: {} (from {})",
        config.smtp.server.as_deref().unwrap_or("not set"),
        config.smtp.sender.as_deref().unwrap_or("not set")
    );

    let mailer = SmtpMailer::new(&config.smtp);
    if let Err(e) = mailer.check() {
        tracing::warn!("Emails will not be delivered until SMTP is fixed: {e}");
    }

    let telegram = TelegramChannel::new(&config.telegram);
    let username = telegram.get_me().await?;
    tracing::info!("Authorized on account {username}");

    Ok((Relay::new(Arc::new(mailer)), telegram))
}
