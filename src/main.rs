//! ClassHub notifier: keeps a notification session open for the configured
//! user and surfaces every notification on the terminal.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{EnvFilter, fmt};

use classhub_core::config::AppConfig;
use classhub_core::error::AppError;
use classhub_core::types::DiagnosticLevel;
use classhub_notify::{
    FilePreferenceStorage, HttpNotificationApi, NotificationStore, StoreEvent, StoreSettings,
    TerminalAlertSink,
};
use classhub_realtime::StreamTransport;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Notifier error: {}", e);
        std::process::exit(1);
    }
}

/// Load `config/default.toml`, the `CLASSHUB_ENV` overlay and `CLASSHUB__*`
/// environment variables.
fn load_configuration() -> Result<AppConfig, AppError> {
    match std::env::var("CLASSHUB_CONFIG") {
        Ok(path) => AppConfig::load_file(&path),
        Err(_) => {
            let env = std::env::var("CLASSHUB_ENV").unwrap_or_else(|_| "development".to_string());
            AppConfig::load(&env)
        }
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting ClassHub notifier v{}", env!("CARGO_PKG_VERSION"));

    let credentials = config.session.credentials()?;
    let timeout = Duration::from_secs(config.api.request_timeout_seconds);

    let transport = StreamTransport::http(timeout)?;
    let api = Arc::new(HttpNotificationApi::from_config(&config.api)?);
    let storage = Arc::new(FilePreferenceStorage::new(
        &config.notifications.preferences_path,
    ));
    let store = NotificationStore::new(
        transport,
        api,
        storage,
        Arc::new(TerminalAlertSink),
        StoreSettings::from_config(&config),
    )
    .await;

    let mut events = store.subscribe();
    store.start_session(credentials)?;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received");
                break Ok(());
            }
            event = events.recv() => match event {
                Ok(StoreEvent::SessionExpired) => {
                    break Err(AppError::authentication(
                        "Session expired, update session.token and restart",
                    ));
                }
                Ok(event) => report(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event consumer lagged behind the store");
                }
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    store.end_session();
    outcome
}

fn report(event: &StoreEvent) {
    match event {
        StoreEvent::ToastShown(record) => {
            let at = record
                .created_at()
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_default();
            println!("{at} [{}] {}: {}", record.kind, record.title, record.message);
            if let Some(link) = &record.link {
                println!("         → {link}");
            }
        }
        StoreEvent::PollingStarted => {
            tracing::warn!("Live stream unavailable, polling for notifications");
        }
        StoreEvent::PollingStopped => tracing::info!("Live stream restored"),
        StoreEvent::Diagnostic(d) => match d.level {
            DiagnosticLevel::Error => tracing::error!(source = %d.source, "{}", d.message),
            DiagnosticLevel::Warn => tracing::warn!(source = %d.source, "{}", d.message),
            DiagnosticLevel::Debug => tracing::debug!(source = %d.source, "{}", d.message),
        },
        other => tracing::debug!(event = other.name(), "Store event"),
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
