//! The accessor contract every monitored pool implements.

use std::sync::Arc;
use std::time::Duration;

use poolwatch_core::PoolIdentity;
use thiserror::Error;

/// Result type alias for handle reads and writes.
pub type HandleResult<T> = Result<T, HandleError>;

/// Failures reported by a [`PoolHandle`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandleError {
    /// The pool no longer answers (shut down or dropped).
    #[error("pool handle is stale")]
    Stale,

    #[error("invalid pool parameter: {0}")]
    InvalidParameter(String),
}

/// Live view of one worker pool.
///
/// Implementations must be safe for concurrent reads and writes: the
/// reporter reads from its timer task while the control endpoint writes
/// from request tasks. Reads are instantaneous and never block on the
/// pool's work.
pub trait PoolHandle: Send + Sync {
    /// Name supplied when the pool was constructed, if any.
    fn explicit_name(&self) -> Option<&str> {
        None
    }

    /// Implementation type name, used when no explicit name was given.
    fn type_name(&self) -> &'static str;

    fn core_pool_size(&self) -> HandleResult<u32>;
    fn set_core_pool_size(&self, size: u32) -> HandleResult<()>;

    fn maximum_pool_size(&self) -> HandleResult<u32>;
    fn set_maximum_pool_size(&self, size: u32) -> HandleResult<()>;

    fn keep_alive_time(&self) -> HandleResult<Duration>;
    fn set_keep_alive_time(&self, keep_alive: Duration) -> HandleResult<()>;

    fn active_thread_count(&self) -> HandleResult<u32>;
    fn queue_length(&self) -> HandleResult<u64>;
    fn queue_remaining_capacity(&self) -> HandleResult<u64>;
    fn total_task_count(&self) -> HandleResult<u64>;
    fn completed_task_count(&self) -> HandleResult<u64>;

    /// Application-maintained task counter.
    fn custom_task_count(&self) -> HandleResult<u64> {
        Ok(0)
    }
}

/// Derive a pool's identity from the address of the object behind it.
///
/// Stable while the object lives; may be handed out again after it is
/// freed, which is why the registry tolerates re-registration.
pub fn identity_of(handle: &Arc<dyn PoolHandle>) -> PoolIdentity {
    let addr = Arc::as_ptr(handle) as *const () as usize;
    PoolIdentity::new(format!("{addr:x}"))
}
