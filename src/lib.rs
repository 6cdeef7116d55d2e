//! PresenceWatch -- behavioral pattern mining and risk correlation for
//! workplace detection streams.
//!
//! This crate turns timestamped detection records from upstream recognition
//! components into routine models, anomaly and change detection, risk
//! scoring, cross-signal correlation, and an alert stream.

pub mod alert;
pub mod analysis;
pub mod api;
pub mod config;
pub mod correlate;
pub mod detect;
pub mod storage;
pub mod sweep;

use anyhow::Result;
use std::sync::Arc;

use crate::alert::TracingSink;
use crate::analysis::PatternEngine;
use crate::api::state::AppState;
use crate::config::AppConfig;
use crate::storage::sqlite::SqliteStore;

/// Build an engine over the configured SQLite store.
pub fn build_engine(config: &AppConfig) -> Result<Arc<PatternEngine>> {
    let pool = storage::open_pool(&config.storage.db_path)?;
    let store = Arc::new(
        SqliteStore::new(pool)
            .with_timeout(std::time::Duration::from_secs(config.storage.op_timeout_secs)),
    );
    let engine = PatternEngine::new(store, Arc::new(TracingSink), config)?;
    Ok(Arc::new(engine))
}

/// Start the PresenceWatch daemon: API server plus background sweep.
pub async fn serve(config: AppConfig) -> Result<()> {
    tracing::info!(db_path = %config.storage.db_path, "Initializing database");
    let engine = build_engine(&config)?;

    // Sweep runs until the server begins shutdown.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(sweep::run_sweep_loop(
        engine.clone(),
        config.sweep.clone(),
        shutdown_rx,
    ));

    let app = api::router(AppState { engine });
    let addr: std::net::SocketAddr = config.server.bind.parse()?;

    tracing::info!(%addr, "PresenceWatch listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    let _ = shutdown_tx.send(true);
    Ok(())
}
