//! poolwatch-core — shared vocabulary for the poolwatch agent and collector.
//!
//! Holds the wire types exchanged between the two sides, the agent's
//! configuration surface, and a minimal JSON-over-HTTP client used for
//! both the telemetry push and the control call.
//!
//! # Wire protocol
//!
//! ```text
//! Agent ──POST /api/v1/pools/upload──▶ Collector     [PoolSnapshot, ...]
//! Collector ──POST /api/v1/pool/modify──▶ Agent      ControlRequest
//! ```
//!
//! All bodies are JSON with camelCase field names.

pub mod config;
pub mod transport;
pub mod types;

pub use config::{AgentConfig, ConfigError, ingest_url_for};
pub use transport::{HttpReply, TransportError, TransportResult, post_json};
pub use types::*;

/// Path of the agent's control endpoint.
pub const CONTROL_PATH: &str = "/api/v1/pool/modify";

/// Path of the collector's ingest endpoint.
pub const UPLOAD_PATH: &str = "/api/v1/pools/upload";

/// Port the agent's control endpoint listens on unless configured otherwise.
pub const DEFAULT_CONTROL_PORT: u16 = 9999;

/// Milliseconds since the Unix epoch.
pub fn epoch_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
