//! poolwatch-agent — in-process monitoring and control of worker pools.
//!
//! Pools announce themselves to a [`PoolRegistry`] when constructed. A
//! [`TelemetryReporter`] periodically snapshots every registered pool and
//! pushes the batch to the collector, and the control endpoint applies
//! parameter changes the collector sends back.
//!
//! # Architecture
//!
//! ```text
//! PoolFactory::build()
//!   └── DiscoveryListener::on_pool_discovered() → PoolRegistry
//!
//! TelemetryReporter (every interval)
//!   ├── PoolRegistry::list_all()
//!   ├── SnapshotBuilder::build() per pool   (failures → prune)
//!   └── POST [PoolSnapshot] → collector
//!
//! control_router
//!   └── POST /api/v1/pool/modify → apply_change() → PoolHandle setters
//! ```

pub mod agent;
pub mod control;
pub mod error;
pub mod handle;
pub mod pool;
pub mod registry;
pub mod reporter;
pub mod snapshot;

#[cfg(test)]
mod testing;

pub use agent::{Agent, AgentHandle};
pub use control::{ControlError, apply_change, control_router};
pub use error::{AgentError, AgentResult};
pub use handle::{HandleError, HandleResult, PoolHandle, identity_of};
pub use pool::{PoolError, PoolFactory, WorkerPool, WorkerPoolConfig};
pub use registry::{DiscoveryListener, PoolRegistry, RegisteredPool};
pub use reporter::{CycleReport, PushOutcome, TelemetryReporter};
pub use snapshot::{BuildFailure, SnapshotBuilder, display_name};
