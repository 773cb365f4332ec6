//! FraudWatch server
//!
//! Runs the dispute auto-resolution scheduler and the signal store janitor,
//! and serves a health endpoint until shutdown.

use anyhow::Context;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;

use fraudwatch_server::config::Config;
use fraudwatch_server::db;
use fraudwatch_server::health;
use fraudwatch_server::dispute::sweeper;
use fraudwatch_server::signal_store::MemorySignalStore;
use fraudwatch_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(environment = config.environment.as_str(), "Starting FraudWatch");

    let db_pool = db::connect(&config)
        .await
        .context("Failed to set up database")?;

    let app_state = AppState::new(&config, db_pool);

    let seeded = app_state
        .fraud_service
        .seed_blacklist(&config.risk.ip_blacklist)
        .await
        .context("Failed to seed IP blacklist")?;
    if seeded > 0 {
        tracing::info!(count = seeded, "IP blacklist seeded");
    }

    // Start dispute sweeper in background
    let dispute_service = app_state.dispute_service.clone();
    let sweep_interval = Duration::from_secs(config.dispute.sweep_interval_seconds);
    tokio::spawn(async move {
        sweeper::run(dispute_service, sweep_interval).await;
        tracing::error!("Dispute sweeper task exited unexpectedly");
    });

    // Start signal store janitor in background
    let signal_store = app_state.signal_store.clone();
    let purge_interval = Duration::from_secs(config.signal_store_purge_interval_seconds);
    tokio::spawn(async move {
        purge_signal_store(&signal_store, purge_interval).await;
    });

    let app = health::router(app_state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Health check at http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    app_state.fraud_service.shutdown().await;
    tracing::info!("Server shutdown complete");

    Ok(())
}

async fn purge_signal_store(store: &MemorySignalStore, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;

        let purged = store.purge_expired().await;
        if purged > 0 {
            tracing::debug!(purged, "Expired signal keys purged");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
