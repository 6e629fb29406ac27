//! Agent runtime — wires the registry, reporter, and control endpoint
//! together and runs them on the current tokio runtime.
//!
//! ```text
//! Agent::start(config)
//!   ├── bind control listener (port 0 picks a free port)
//!   ├── spawn control server   → POST /api/v1/pool/modify
//!   └── spawn reporter loop    → POST {ingest_url} every interval
//! ```
//!
//! Both tasks stop when [`AgentHandle::shutdown`] is called.

use std::net::SocketAddr;
use std::sync::Arc;

use poolwatch_core::AgentConfig;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::control::control_router;
use crate::error::{AgentError, AgentResult};
use crate::pool::PoolFactory;
use crate::registry::PoolRegistry;
use crate::reporter::{CycleReport, TelemetryReporter};
use crate::snapshot::SnapshotBuilder;

pub struct Agent;

impl Agent {
    /// Validate `config`, bind the control endpoint, and start the
    /// reporter. Must be called from within a tokio runtime.
    pub async fn start(config: AgentConfig) -> AgentResult<AgentHandle> {
        config.validate()?;
        let ingest = config.ingest_uri()?;
        let source = config.source();

        let registry = Arc::new(PoolRegistry::new());
        let reporter = Arc::new(TelemetryReporter::new(
            registry.clone(),
            SnapshotBuilder::new(source.clone()),
            ingest,
            config.report_interval,
            config.push_timeout(),
        ));

        // ── Control endpoint ─────────────────────────────────────
        let bind_addr = SocketAddr::new(config.control_bind, config.control_port);
        let listener = tokio::net::TcpListener::bind(bind_addr)
            .await
            .map_err(|source| AgentError::Bind {
                addr: bind_addr,
                source,
            })?;
        let control_addr = listener
            .local_addr()
            .map_err(|source| AgentError::Bind {
                addr: bind_addr,
                source,
            })?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut server_shutdown = shutdown_rx.clone();
        let router = control_router(registry.clone(), source.clone(), config.control_concurrency);
        let server_task = tokio::spawn(async move {
            let server = axum::serve(listener, router).with_graceful_shutdown(async move {
                let _ = server_shutdown.changed().await;
            });
            if let Err(e) = server.await {
                error!(error = %e, "control endpoint error");
            }
        });

        // ── Reporter ─────────────────────────────────────────────
        let reporter_task = tokio::spawn({
            let reporter = reporter.clone();
            async move { reporter.run(shutdown_rx).await }
        });

        info!(
            host = %source.host,
            application = %source.application,
            %control_addr,
            control_concurrency = config.control_concurrency,
            ingest = %config.ingest_url,
            "poolwatch agent started"
        );

        Ok(AgentHandle {
            factory: PoolFactory::new(registry.clone()),
            registry,
            reporter,
            control_addr,
            shutdown_tx,
            tasks: vec![server_task, reporter_task],
        })
    }
}

/// A running agent.
pub struct AgentHandle {
    registry: Arc<PoolRegistry>,
    factory: PoolFactory,
    reporter: Arc<TelemetryReporter>,
    control_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl AgentHandle {
    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }

    /// Factory whose pools register themselves with this agent.
    pub fn factory(&self) -> &PoolFactory {
        &self.factory
    }

    /// Address the control endpoint actually listens on.
    pub fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }

    /// Run one report cycle immediately, outside the timer.
    pub async fn report_now(&self) -> CycleReport {
        self.reporter.run_cycle().await
    }

    /// Stop the reporter and the control endpoint and wait for both.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!("poolwatch agent stopped");
    }
}
