//! In-memory `PoolHandle` for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use crate::handle::{HandleError, HandleResult, PoolHandle};

pub(crate) struct FakePool {
    name: Option<String>,
    core: AtomicU32,
    max: AtomicU32,
    keep_alive_ms: AtomicU64,
    stale: AtomicBool,
    /// Reads of `completed_task_count` fail, simulating a mid-read death.
    fail_late_read: AtomicBool,
}

impl FakePool {
    pub(crate) fn shared(core: u32, max: u32, keep_alive_ms: u64) -> Arc<Self> {
        Arc::new(Self::new(None, core, max, keep_alive_ms))
    }

    pub(crate) fn named(name: &str, core: u32, max: u32, keep_alive_ms: u64) -> Arc<Self> {
        Arc::new(Self::new(Some(name.to_string()), core, max, keep_alive_ms))
    }

    fn new(name: Option<String>, core: u32, max: u32, keep_alive_ms: u64) -> Self {
        Self {
            name,
            core: AtomicU32::new(core),
            max: AtomicU32::new(max),
            keep_alive_ms: AtomicU64::new(keep_alive_ms),
            stale: AtomicBool::new(false),
            fail_late_read: AtomicBool::new(false),
        }
    }

    pub(crate) fn mark_stale(&self) {
        self.stale.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_late_read(&self) {
        self.fail_late_read.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> HandleResult<()> {
        if self.stale.load(Ordering::SeqCst) {
            Err(HandleError::Stale)
        } else {
            Ok(())
        }
    }
}

impl PoolHandle for FakePool {
    fn explicit_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn type_name(&self) -> &'static str {
        "FakePool"
    }

    fn core_pool_size(&self) -> HandleResult<u32> {
        self.check()?;
        Ok(self.core.load(Ordering::SeqCst))
    }

    fn set_core_pool_size(&self, size: u32) -> HandleResult<()> {
        self.check()?;
        if size > self.max.load(Ordering::SeqCst) {
            return Err(HandleError::InvalidParameter("core above max".to_string()));
        }
        self.core.store(size, Ordering::SeqCst);
        Ok(())
    }

    fn maximum_pool_size(&self) -> HandleResult<u32> {
        self.check()?;
        Ok(self.max.load(Ordering::SeqCst))
    }

    fn set_maximum_pool_size(&self, size: u32) -> HandleResult<()> {
        self.check()?;
        if size == 0 || size < self.core.load(Ordering::SeqCst) {
            return Err(HandleError::InvalidParameter("max below core".to_string()));
        }
        self.max.store(size, Ordering::SeqCst);
        Ok(())
    }

    fn keep_alive_time(&self) -> HandleResult<Duration> {
        self.check()?;
        Ok(Duration::from_millis(self.keep_alive_ms.load(Ordering::SeqCst)))
    }

    fn set_keep_alive_time(&self, keep_alive: Duration) -> HandleResult<()> {
        self.check()?;
        self.keep_alive_ms
            .store(keep_alive.as_millis() as u64, Ordering::SeqCst);
        Ok(())
    }

    fn active_thread_count(&self) -> HandleResult<u32> {
        self.check()?;
        Ok(1)
    }

    fn queue_length(&self) -> HandleResult<u64> {
        self.check()?;
        Ok(2)
    }

    fn queue_remaining_capacity(&self) -> HandleResult<u64> {
        self.check()?;
        Ok(98)
    }

    fn total_task_count(&self) -> HandleResult<u64> {
        self.check()?;
        Ok(10)
    }

    fn completed_task_count(&self) -> HandleResult<u64> {
        self.check()?;
        if self.fail_late_read.load(Ordering::SeqCst) {
            return Err(HandleError::Stale);
        }
        Ok(7)
    }
}
