//! Collector mode — the central service.
//!
//! In this mode, the daemon:
//! 1. Opens the collector store under the data directory
//! 2. Builds the command dispatcher for reaching agents
//! 3. Serves the REST API and snapshot ingest until CTRL+C

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use poolwatch_collector::{CommandDispatcher, DispatcherConfig};
use poolwatch_state::{CollectorStore, MergePolicy};
use tracing::{error, info};

/// Run the collector.
pub async fn run_collector(
    port: u16,
    data_dir: PathBuf,
    control_port: u16,
    control_timeout_ms: u64,
    merge_policy: MergePolicy,
) -> anyhow::Result<()> {
    info!("poolwatch daemon starting in collector mode");
    std::fs::create_dir_all(&data_dir)?;

    // ── Collector store ──────────────────────────────────────────
    let db_path = data_dir.join("poolwatch-collector.redb");
    let store = CollectorStore::open(&db_path)?.with_policy(merge_policy);
    info!(path = ?db_path, %merge_policy, "collector store opened");

    // ── Command dispatcher ───────────────────────────────────────
    let dispatcher = CommandDispatcher::new(
        store.clone(),
        DispatcherConfig {
            control_port,
            timeout: Duration::from_millis(control_timeout_ms),
        },
    );

    // ── REST API server ──────────────────────────────────────────
    let router = poolwatch_collector::build_router(store, dispatcher);
    let api_addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%api_addr, control_port, "API server starting");
    let listener = tokio::net::TcpListener::bind(api_addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for CTRL+C");
            }
            info!("shutdown signal received");
        })
        .await?;

    info!("collector stopped");
    Ok(())
}
