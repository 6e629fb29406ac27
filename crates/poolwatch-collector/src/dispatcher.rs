//! Command dispatcher — forwards an operator's parameter change to the
//! agent that owns the pool.
//!
//! The agent is reached at `http://{sourceHost}:{control_port}`. A
//! confirmed change is written into the stored record straight away so
//! readers see it before the next telemetry push, which then confirms or
//! corrects it. Failures are reported to the caller and never retried.

use std::time::Duration;

use http::{StatusCode, Uri};
use poolwatch_core::{
    CONTROL_PATH, ControlRequest, ControlResponse, DEFAULT_CONTROL_PORT, ParameterChange, PoolKey,
    PoolParameters, post_json,
};
use poolwatch_state::{CollectorStore, StateError, StoredPoolRecord};
use thiserror::Error;
use tracing::{info, warn};

/// Result type alias for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("pool {0} not found")]
    NotFound(PoolKey),

    #[error("agent at {addr} unreachable: {reason}")]
    RemoteUnreachable { addr: String, reason: String },

    #[error("agent rejected change ({code}): {message}")]
    RemoteRejected { code: u16, message: String },

    #[error(transparent)]
    State(#[from] StateError),
}

/// Where and how long to wait for agents.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    pub control_port: u16,
    pub timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            control_port: DEFAULT_CONTROL_PORT,
            timeout: Duration::from_millis(3000),
        }
    }
}

#[derive(Clone)]
pub struct CommandDispatcher {
    store: CollectorStore,
    config: DispatcherConfig,
}

impl CommandDispatcher {
    pub fn new(store: CollectorStore, config: DispatcherConfig) -> Self {
        Self { store, config }
    }

    /// Send `change` to the agent owning `key` and, once it confirms,
    /// update the stored record. Returns the updated record.
    pub async fn request_change(
        &self,
        key: &PoolKey,
        change: ParameterChange,
    ) -> DispatchResult<StoredPoolRecord> {
        let record = self
            .store
            .get(key)?
            .ok_or_else(|| DispatchError::NotFound(key.clone()))?;

        let addr = control_authority(&key.source_host, self.config.control_port);
        let unreachable_at = |reason: String| DispatchError::RemoteUnreachable {
            addr: addr.clone(),
            reason,
        };
        let uri: Uri = format!("http://{addr}{CONTROL_PATH}")
            .parse()
            .map_err(|e: http::uri::InvalidUri| unreachable_at(e.to_string()))?;

        let request = ControlRequest::new(key.identity.clone(), change);
        let reply = match post_json(&uri, &request, self.config.timeout).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(
                    identity = %key.identity,
                    host = %key.source_host,
                    application = %key.source_application,
                    %addr,
                    error = %e,
                    "control command failed"
                );
                return Err(unreachable_at(e.to_string()));
            }
        };

        let response = reply.json::<ControlResponse>().ok();
        if reply.status != StatusCode::OK {
            let (code, message) = match response {
                Some(body) => (body.code, body.message),
                None => (
                    reply.status.as_u16(),
                    String::from_utf8_lossy(&reply.body).into_owned(),
                ),
            };
            warn!(
                identity = %key.identity,
                host = %key.source_host,
                application = %key.source_application,
                code,
                %message,
                "agent rejected control command"
            );
            return Err(DispatchError::RemoteRejected { code, message });
        }

        let applied: PoolParameters = response
            .and_then(|body| body.parameters)
            .unwrap_or_else(|| change.resolve(&record.snapshot.parameters()));

        let updated = self
            .store
            .apply_parameters(key, &applied)?
            .ok_or_else(|| DispatchError::NotFound(key.clone()))?;

        info!(
            identity = %key.identity,
            host = %key.source_host,
            application = %key.source_application,
            core_pool_size = applied.core_pool_size,
            maximum_pool_size = applied.maximum_pool_size,
            keep_alive_time_millis = applied.keep_alive_time_millis,
            "pool change applied"
        );
        Ok(updated)
    }
}

fn control_authority(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}
