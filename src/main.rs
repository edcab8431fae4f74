use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use mail_agent::config::{AppConfig, LogConfig};
use mail_agent::mail::{GraphMailClient, MailClient};
use mail_agent::poller::Poller;
use mail_agent::reconcile::Reconciler;
use mail_agent::ticketing::{AtiumClient, TicketingClient};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // A missing .env file is fine; the real environment still applies.
    dotenv::dotenv().ok();

    // Keep the guard alive so buffered file logs are flushed on exit.
    let _log_guard = init_tracing(&LogConfig::from_env());

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    eprintln!("📬 Mail Agent v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Mailbox: {}", config.mail.mailbox);
    eprintln!("   Helpdesk: {}", config.ticketing.endpoint);
    eprintln!(
        "   Poll: every {}s, up to {} message(s)",
        config.poll.interval.as_secs(),
        config.poll.batch_size
    );
    eprintln!(
        "   Tickets: {} area, opened by {}\n",
        config.ticket.service_area, config.ticket.opened_by
    );

    let mail: Arc<dyn MailClient> = Arc::new(GraphMailClient::new(config.mail.clone()));
    let ticketing: Arc<dyn TicketingClient> =
        Arc::new(AtiumClient::new(config.ticketing.clone()));
    let reconciler = Reconciler::new(Arc::clone(&mail), ticketing, config.ticket.clone());
    let poller = Poller::new(config.poll.clone(), mail, reconciler);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested; finishing current cycle");
            let _ = shutdown_tx.send(true);
        }
    });

    let exit = poller.run(shutdown_rx).await;
    Ok(ExitCode::from(exit.exit_code()))
}

/// Console logging, plus a daily rolling file when a log directory is set.
fn init_tracing(config: &LogConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let (file_layer, guard) = match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "mail-agent.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}
