//! Error types for starting the agent.

use std::net::SocketAddr;

use poolwatch_core::ConfigError;
use thiserror::Error;

/// Result type alias for agent lifecycle operations.
pub type AgentResult<T> = Result<T, AgentError>;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid agent configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind control endpoint on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}
