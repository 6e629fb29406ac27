//! Wire types shared by the agent and the collector.
//!
//! Everything here serializes with camelCase field names so the JSON
//! matches what existing agents and dashboards already exchange.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Identity ──────────────────────────────────────────────────────

/// Process-scoped identity of one pool instance.
///
/// Unique within a single process at any instant, but may be reused once
/// the pool it named is gone. Only `(host, application, identity)` is
/// meaningful outside the owning process; see [`PoolKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolIdentity(String);

impl PoolIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PoolIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PoolIdentity {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PoolIdentity {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Where a snapshot came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub host: String,
    pub application: String,
}

impl SourceInfo {
    pub fn new(host: impl Into<String>, application: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            application: application.into(),
        }
    }
}

/// Collector-side key for a pool: identities are only unique per process,
/// so the source host and application are part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolKey {
    pub source_host: String,
    pub source_application: String,
    pub identity: PoolIdentity,
}

impl PoolKey {
    pub fn new(
        source_host: impl Into<String>,
        source_application: impl Into<String>,
        identity: impl Into<PoolIdentity>,
    ) -> Self {
        Self {
            source_host: source_host.into(),
            source_application: source_application.into(),
            identity: identity.into(),
        }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.source_host, self.source_application, self.identity
        )
    }
}

// ── Snapshot ──────────────────────────────────────────────────────

/// Immutable point-in-time capture of one pool's configuration and load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSnapshot {
    pub identity: PoolIdentity,
    pub display_name: String,
    pub core_pool_size: u32,
    pub maximum_pool_size: u32,
    pub keep_alive_time_millis: u64,
    pub active_thread_count: u32,
    pub queue_length: u64,
    pub queue_remaining_capacity: u64,
    pub total_task_count: u64,
    pub completed_task_count: u64,
    #[serde(default)]
    pub custom_task_count: u64,
    pub captured_at_epoch_millis: u64,
    pub source_host: String,
    pub source_application: String,
}

impl PoolSnapshot {
    /// Collector key for this snapshot.
    pub fn key(&self) -> PoolKey {
        PoolKey {
            source_host: self.source_host.clone(),
            source_application: self.source_application.clone(),
            identity: self.identity.clone(),
        }
    }

    /// The settable parameters carried by this snapshot.
    pub fn parameters(&self) -> PoolParameters {
        PoolParameters {
            core_pool_size: self.core_pool_size,
            maximum_pool_size: self.maximum_pool_size,
            keep_alive_time_millis: self.keep_alive_time_millis,
        }
    }

    /// Overwrite the settable parameters, leaving load metrics alone.
    pub fn set_parameters(&mut self, params: &PoolParameters) {
        self.core_pool_size = params.core_pool_size;
        self.maximum_pool_size = params.maximum_pool_size;
        self.keep_alive_time_millis = params.keep_alive_time_millis;
    }
}

// ── Control ───────────────────────────────────────────────────────

/// The three settable parameters of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolParameters {
    pub core_pool_size: u32,
    pub maximum_pool_size: u32,
    pub keep_alive_time_millis: u64,
}

/// A partial parameter update. A value ≤ 0 means "leave unchanged".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterChange {
    #[serde(default)]
    pub core_pool_size: i32,
    #[serde(default)]
    pub maximum_pool_size: i32,
    #[serde(default, alias = "keepAliveTime")]
    pub keep_alive_time_millis: i64,
}

impl ParameterChange {
    pub fn new(core_pool_size: i32, maximum_pool_size: i32, keep_alive_time_millis: i64) -> Self {
        Self {
            core_pool_size,
            maximum_pool_size,
            keep_alive_time_millis,
        }
    }

    pub fn core_pool_size(&self) -> Option<u32> {
        (self.core_pool_size > 0).then_some(self.core_pool_size as u32)
    }

    pub fn maximum_pool_size(&self) -> Option<u32> {
        (self.maximum_pool_size > 0).then_some(self.maximum_pool_size as u32)
    }

    pub fn keep_alive_time_millis(&self) -> Option<u64> {
        (self.keep_alive_time_millis > 0).then_some(self.keep_alive_time_millis as u64)
    }

    /// True when every field means "unchanged".
    pub fn is_noop(&self) -> bool {
        self.core_pool_size().is_none()
            && self.maximum_pool_size().is_none()
            && self.keep_alive_time_millis().is_none()
    }

    /// The parameters that result from applying this change to `current`.
    pub fn resolve(&self, current: &PoolParameters) -> PoolParameters {
        PoolParameters {
            core_pool_size: self.core_pool_size().unwrap_or(current.core_pool_size),
            maximum_pool_size: self
                .maximum_pool_size()
                .unwrap_or(current.maximum_pool_size),
            keep_alive_time_millis: self
                .keep_alive_time_millis()
                .unwrap_or(current.keep_alive_time_millis),
        }
    }
}

/// Body of the agent's modify call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRequest {
    pub thread_pool_id: PoolIdentity,
    #[serde(default)]
    pub core_pool_size: i32,
    #[serde(default)]
    pub maximum_pool_size: i32,
    #[serde(default, alias = "keepAliveTime")]
    pub keep_alive_time_millis: i64,
}

impl ControlRequest {
    pub fn new(thread_pool_id: PoolIdentity, change: ParameterChange) -> Self {
        Self {
            thread_pool_id,
            core_pool_size: change.core_pool_size,
            maximum_pool_size: change.maximum_pool_size,
            keep_alive_time_millis: change.keep_alive_time_millis,
        }
    }

    pub fn change(&self) -> ParameterChange {
        ParameterChange {
            core_pool_size: self.core_pool_size,
            maximum_pool_size: self.maximum_pool_size,
            keep_alive_time_millis: self.keep_alive_time_millis,
        }
    }
}

/// Body of every control endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlResponse {
    pub code: u16,
    pub message: String,
    /// Post-mutation values, present when the change was applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<PoolParameters>,
}

/// Collector acknowledgement for an uploaded batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadAck {
    pub accepted: usize,
    pub rejected: usize,
}
