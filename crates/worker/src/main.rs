use std::sync::Arc;

use anyhow::{bail, Context};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use onboard_db::{EventStore, PgEventStore};
use onboard_events::{EmailConfig, Notifier, SendGridConfig, SendGridNotifier, SmtpNotifier, WelcomeEmail};
use onboard_worker::{Dispatcher, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "onboard_worker=info,onboard_events=info,onboard_db=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;
    tracing::info!(
        concurrency = config.concurrency,
        max_retries = config.max_retries,
        "Loaded worker configuration",
    );

    // --- Database ---
    let pool = onboard_db::create_pool(&config.database_url, config.db_max_connections)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    onboard_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    tracing::info!("Database health check passed");

    onboard_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    let pg_store = Arc::new(PgEventStore::new(pool));
    let store: Arc<dyn EventStore> = pg_store.clone();

    match store.status_counts().await {
        Ok(counts) => tracing::info!(
            pending = counts.pending,
            processing = counts.processing,
            processed = counts.processed,
            dead_lettered = counts.dead_lettered,
            dead_letter_sink = counts.dead_letter_sink,
            "Event queue status",
        ),
        Err(e) => tracing::warn!(error = %e, "Failed to read event queue status"),
    }

    // --- Notifier ---
    let notifier = build_notifier()?;

    // --- Dispatchers ---
    let cancel = CancellationToken::new();
    let mut handles = Vec::with_capacity(config.concurrency);
    for _ in 0..config.concurrency {
        let dispatcher = Dispatcher::new(
            Arc::clone(&store),
            Arc::clone(&notifier),
            config.retry_policy(),
            config.dispatcher(),
        );
        let token = cancel.clone();
        handles.push(tokio::spawn(async move { dispatcher.run(token).await }));
    }
    tracing::info!(dispatchers = handles.len(), "Dispatchers spawned");

    shutdown_signal().await;
    cancel.cancel();

    let drain = async move {
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Dispatcher task panicked");
            }
        }
    };
    if tokio::time::timeout(config.shutdown_timeout, drain).await.is_err() {
        tracing::warn!(
            timeout_secs = config.shutdown_timeout.as_secs(),
            "Dispatchers did not stop in time, abandoning in-flight events to the stale sweep",
        );
    }

    pg_store.close().await;
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// SendGrid when `SENDGRID_API_KEY` is set, otherwise the SMTP relay.
fn build_notifier() -> anyhow::Result<Arc<dyn Notifier>> {
    let template = WelcomeEmail::from_env();

    if let Some(config) = SendGridConfig::from_env() {
        tracing::info!(api_url = %config.api_url, "Using SendGrid notifier");
        let notifier = SendGridNotifier::new(config, template).context("Failed to build SendGrid client")?;
        return Ok(Arc::new(notifier));
    }

    if let Some(config) = EmailConfig::from_env() {
        tracing::info!(host = %config.smtp_host, port = config.smtp_port, "Using SMTP notifier");
        let notifier = SmtpNotifier::new(&config, template).context("Failed to build SMTP transport")?;
        return Ok(Arc::new(notifier));
    }

    bail!("No notifier configured: set SENDGRID_API_KEY or SMTP_HOST")
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
