//! Telemetry reporter — periodically snapshots every registered pool and
//! pushes the batch to the collector.
//!
//! A cycle never retries. Pools that fail to snapshot are pruned from the
//! registry; a failed push drops that cycle's batch and the next cycle
//! sends fresh snapshots. Shutdown abandons a push that is still in
//! flight.

use std::sync::Arc;
use std::time::Duration;

use http::Uri;
use poolwatch_core::{PoolSnapshot, UploadAck, post_json};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::handle::HandleError;
use crate::registry::{PoolRegistry, RegisteredPool};
use crate::snapshot::{BuildFailure, SnapshotBuilder};

/// What happened to a cycle's batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Nothing to send; no request was made.
    Skipped,
    /// The collector answered 2xx. `accepted` is its count when the reply
    /// carried an acknowledgement.
    Delivered { accepted: Option<usize> },
    /// Transport failure or non-2xx reply. The batch is gone.
    Dropped,
}

/// Summary of one reporting cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub built: usize,
    pub failed: usize,
    pub pruned: usize,
    pub pushed: PushOutcome,
}

pub struct TelemetryReporter {
    registry: Arc<PoolRegistry>,
    builder: SnapshotBuilder,
    ingest: Uri,
    interval: Duration,
    push_timeout: Duration,
}

impl TelemetryReporter {
    pub fn new(
        registry: Arc<PoolRegistry>,
        builder: SnapshotBuilder,
        ingest: Uri,
        interval: Duration,
        push_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            builder,
            ingest,
            interval,
            push_timeout,
        }
    }

    /// Build and push one batch.
    pub async fn run_cycle(&self) -> CycleReport {
        let (batch, failures) = self.collect();

        let source = self.builder.source();
        let mut pruned = 0;
        for (pool, failure) in &failures {
            warn!(
                identity = %failure.identity,
                host = %source.host,
                application = %source.application,
                cause = %failure.cause,
                "snapshot failed, dropping pool"
            );
            if self.registry.prune(pool) {
                info!(
                    identity = %pool.identity,
                    host = %source.host,
                    application = %source.application,
                    "stale pool pruned"
                );
                pruned += 1;
            }
        }

        let pushed = if batch.is_empty() {
            PushOutcome::Skipped
        } else {
            self.push(&batch).await
        };

        let report = CycleReport {
            built: batch.len(),
            failed: failures.len(),
            pruned,
            pushed,
        };
        debug!(?report, "report cycle finished");
        report
    }

    fn collect(&self) -> (Vec<PoolSnapshot>, Vec<(RegisteredPool, BuildFailure)>) {
        let mut batch = Vec::new();
        let mut failures = Vec::new();

        for pool in self.registry.list_all() {
            let result = match pool.handle() {
                Some(handle) => self.builder.build(&pool.identity, handle.as_ref()),
                None => Err(BuildFailure {
                    identity: pool.identity.clone(),
                    cause: HandleError::Stale,
                }),
            };
            match result {
                Ok(snapshot) => batch.push(snapshot),
                Err(failure) => failures.push((pool, failure)),
            }
        }
        (batch, failures)
    }

    async fn push(&self, batch: &[PoolSnapshot]) -> PushOutcome {
        let source = self.builder.source();
        match post_json(&self.ingest, batch, self.push_timeout).await {
            Ok(reply) if reply.status.is_success() => {
                let accepted = reply.json::<UploadAck>().ok().map(|ack| {
                    if ack.rejected > 0 {
                        warn!(
                            host = %source.host,
                            application = %source.application,
                            rejected = ack.rejected,
                            "collector rejected snapshots"
                        );
                    }
                    ack.accepted
                });
                debug!(pools = batch.len(), ?accepted, "snapshot batch delivered");
                PushOutcome::Delivered { accepted }
            }
            Ok(reply) => {
                warn!(
                    host = %source.host,
                    application = %source.application,
                    ingest = %self.ingest,
                    status = %reply.status,
                    pools = batch.len(),
                    "collector refused snapshot batch, dropping it"
                );
                PushOutcome::Dropped
            }
            Err(e) => {
                warn!(
                    host = %source.host,
                    application = %source.application,
                    ingest = %self.ingest,
                    error = %e,
                    pools = batch.len(),
                    "snapshot push failed, dropping batch"
                );
                PushOutcome::Dropped
            }
        }
    }

    /// Run cycles every `interval` until the shutdown signal fires.
    ///
    /// The first cycle runs one interval after start. A cycle still in
    /// progress when the signal fires is dropped along with its push.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            ingest = %self.ingest,
            "telemetry reporter started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => break,
            }
            tokio::select! {
                _ = self.run_cycle() => {}
                _ = shutdown.changed() => {
                    warn!(ingest = %self.ingest, "shutdown during report cycle, push abandoned");
                    break;
                }
            }
        }
        info!("telemetry reporter shutting down");
    }
}
