//! Snapshot builder — turns a live handle into an immutable `PoolSnapshot`.

use poolwatch_core::{PoolIdentity, PoolSnapshot, SourceInfo, epoch_millis};
use thiserror::Error;

use crate::handle::{HandleError, HandleResult, PoolHandle};

/// A snapshot could not be completed. The pool is treated as stale.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("snapshot of pool {identity} failed: {cause}")]
pub struct BuildFailure {
    pub identity: PoolIdentity,
    pub cause: HandleError,
}

/// Builds snapshots stamped with this process's host and application.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    source: SourceInfo,
}

impl SnapshotBuilder {
    pub fn new(source: SourceInfo) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &SourceInfo {
        &self.source
    }

    /// Read every metric from `handle` in one pass.
    ///
    /// A single failed read fails the whole build; partial snapshots are
    /// never produced.
    pub fn build(
        &self,
        identity: &PoolIdentity,
        handle: &dyn PoolHandle,
    ) -> Result<PoolSnapshot, BuildFailure> {
        self.read(identity, handle).map_err(|cause| BuildFailure {
            identity: identity.clone(),
            cause,
        })
    }

    fn read(&self, identity: &PoolIdentity, handle: &dyn PoolHandle) -> HandleResult<PoolSnapshot> {
        Ok(PoolSnapshot {
            identity: identity.clone(),
            display_name: display_name(identity, handle),
            core_pool_size: handle.core_pool_size()?,
            maximum_pool_size: handle.maximum_pool_size()?,
            keep_alive_time_millis: handle.keep_alive_time()?.as_millis() as u64,
            active_thread_count: handle.active_thread_count()?,
            queue_length: handle.queue_length()?,
            queue_remaining_capacity: handle.queue_remaining_capacity()?,
            total_task_count: handle.total_task_count()?,
            completed_task_count: handle.completed_task_count()?,
            custom_task_count: handle.custom_task_count()?,
            captured_at_epoch_millis: epoch_millis(),
            source_host: self.source.host.clone(),
            source_application: self.source.application.clone(),
        })
    }
}

/// Explicit construction-time name if there is one, otherwise
/// `{type_name}@{identity}`.
pub fn display_name(identity: &PoolIdentity, handle: &dyn PoolHandle) -> String {
    match handle.explicit_name() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("{}@{}", handle.type_name(), identity),
    }
}
