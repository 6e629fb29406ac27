//! Worker pool — a tunable worker-thread executor that can be monitored.
//!
//! Behaves like a classic core/max executor:
//!
//! ```text
//! execute(job)
//!   workers < core         → start a worker with the job
//!   queue has room         → enqueue
//!   workers < max          → start a worker with the job
//!   otherwise              → PoolError::Saturated
//! ```
//!
//! Workers above `core` retire after `keep_alive` without work. Core, max
//! and keep-alive can all be changed while the pool runs. Once shut down,
//! every metric read reports `HandleError::Stale`.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::handle::{HandleError, HandleResult, PoolHandle};
use crate::registry::DiscoveryListener;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Errors from constructing or submitting to a [`WorkerPool`].
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("pool is shut down")]
    Shutdown,

    #[error("pool saturated: {workers} workers busy and queue full")]
    Saturated { workers: u32 },

    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),
}

/// Construction parameters for a [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Explicit display name; also used to name worker threads.
    pub name: Option<String>,
    pub core_pool_size: u32,
    pub maximum_pool_size: u32,
    pub keep_alive: Duration,
    /// Bounded queue capacity. Zero means direct hand-off.
    pub queue_capacity: usize,
}

impl WorkerPoolConfig {
    pub fn new(core_pool_size: u32, maximum_pool_size: u32) -> Self {
        Self {
            name: None,
            core_pool_size,
            maximum_pool_size,
            keep_alive: Duration::from_secs(60),
            queue_capacity: 1024,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    fn validate(&self) -> Result<(), PoolError> {
        if self.maximum_pool_size == 0 {
            return Err(PoolError::InvalidConfig(
                "maximum_pool_size must be at least 1".to_string(),
            ));
        }
        if self.core_pool_size > self.maximum_pool_size {
            return Err(PoolError::InvalidConfig(format!(
                "core_pool_size {} exceeds maximum_pool_size {}",
                self.core_pool_size, self.maximum_pool_size
            )));
        }
        Ok(())
    }
}

struct State {
    queue: VecDeque<Job>,
    workers: u32,
    core: u32,
    max: u32,
    keep_alive: Duration,
    shutdown: bool,
    next_worker_id: u64,
}

struct Shared {
    name: Option<String>,
    capacity: usize,
    state: Mutex<State>,
    available: Condvar,
    active: AtomicU32,
    submitted: AtomicU64,
    completed: AtomicU64,
    custom: AtomicU64,
}

impl Shared {
    // Jobs run outside the lock under catch_unwind, so a poisoned lock
    // still guards consistent state.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("pool")
    }

    fn spawn_worker(self: &Arc<Self>, state: &mut State, first: Option<Job>) -> Result<(), PoolError> {
        let id = state.next_worker_id;
        let shared = Arc::clone(self);
        thread::Builder::new()
            .name(format!("{}-worker-{id}", self.label()))
            .spawn(move || shared.work(first))
            .map_err(|e| PoolError::Spawn(e.to_string()))?;

        state.next_worker_id += 1;
        state.workers += 1;
        debug!(pool = self.label(), workers = state.workers, "worker started");
        Ok(())
    }

    fn work(self: Arc<Self>, first: Option<Job>) {
        if let Some(job) = first {
            self.run(job);
        }
        while let Some(job) = self.next_job() {
            self.run(job);
        }
    }

    /// Block until there is a job, or return `None` when this worker
    /// should retire. A retiring worker has already been uncounted.
    fn next_job(&self) -> Option<Job> {
        let mut state = self.lock();
        loop {
            if let Some(job) = state.queue.pop_front() {
                return Some(job);
            }
            if state.shutdown || state.workers > state.max {
                state.workers -= 1;
                return None;
            }

            if state.workers > state.core {
                let keep_alive = state.keep_alive;
                let (guard, wait) = self
                    .available
                    .wait_timeout(state, keep_alive)
                    .unwrap_or_else(PoisonError::into_inner);
                state = guard;
                if wait.timed_out() && state.queue.is_empty() && state.workers > state.core {
                    state.workers -= 1;
                    debug!(pool = self.label(), workers = state.workers, "idle worker retired");
                    return None;
                }
            } else {
                state = self
                    .available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
    }

    fn run(&self, job: Job) {
        self.active.fetch_add(1, Ordering::SeqCst);
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!(pool = self.label(), "task panicked");
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

/// A resizable pool of worker threads.
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                name: config.name,
                capacity: config.queue_capacity,
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    workers: 0,
                    core: config.core_pool_size,
                    max: config.maximum_pool_size,
                    keep_alive: config.keep_alive,
                    shutdown: false,
                    next_worker_id: 1,
                }),
                available: Condvar::new(),
                active: AtomicU32::new(0),
                submitted: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                custom: AtomicU64::new(0),
            }),
        })
    }

    /// Submit a job for execution.
    pub fn execute<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let job: Job = Box::new(job);
        let mut state = self.shared.lock();
        if state.shutdown {
            return Err(PoolError::Shutdown);
        }

        if state.workers < state.core {
            self.shared.spawn_worker(&mut state, Some(job))?;
        } else if state.queue.len() < self.shared.capacity {
            state.queue.push_back(job);
            if state.workers == 0 {
                self.shared.spawn_worker(&mut state, None)?;
            } else {
                self.shared.available.notify_one();
            }
        } else if state.workers < state.max {
            self.shared.spawn_worker(&mut state, Some(job))?;
        } else {
            return Err(PoolError::Saturated {
                workers: state.workers,
            });
        }

        self.shared.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Bump the application-maintained task counter.
    pub fn record_custom_task(&self) {
        self.shared.custom.fetch_add(1, Ordering::SeqCst);
    }

    /// Stop accepting work. Queued jobs still run; workers then exit.
    pub fn shutdown(&self) {
        let mut state = self.shared.lock();
        if !state.shutdown {
            state.shutdown = true;
            self.shared.available.notify_all();
            debug!(pool = self.shared.label(), queued = state.queue.len(), "pool shutting down");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.lock().shutdown
    }

    /// Number of live worker threads.
    pub fn pool_size(&self) -> u32 {
        self.shared.lock().workers
    }

    fn live(&self) -> HandleResult<MutexGuard<'_, State>> {
        let state = self.shared.lock();
        if state.shutdown {
            Err(HandleError::Stale)
        } else {
            Ok(state)
        }
    }

    fn ensure_live(&self) -> HandleResult<()> {
        self.live().map(drop)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl PoolHandle for WorkerPool {
    fn explicit_name(&self) -> Option<&str> {
        self.shared.name.as_deref()
    }

    fn type_name(&self) -> &'static str {
        "WorkerPool"
    }

    fn core_pool_size(&self) -> HandleResult<u32> {
        Ok(self.live()?.core)
    }

    fn set_core_pool_size(&self, size: u32) -> HandleResult<()> {
        let mut state = self.live()?;
        if size > state.max {
            return Err(HandleError::InvalidParameter(format!(
                "core_pool_size {size} exceeds maximum_pool_size {}",
                state.max
            )));
        }
        state.core = size;

        // Start workers for queued work the larger core now allows.
        let wanted = size.saturating_sub(state.workers);
        let backlog = state.queue.len().min(wanted as usize);
        for _ in 0..backlog {
            if let Err(e) = self.shared.spawn_worker(&mut state, None) {
                warn!(pool = self.shared.label(), error = %e, "could not grow to new core size");
                break;
            }
        }
        self.shared.available.notify_all();
        Ok(())
    }

    fn maximum_pool_size(&self) -> HandleResult<u32> {
        Ok(self.live()?.max)
    }

    fn set_maximum_pool_size(&self, size: u32) -> HandleResult<()> {
        let mut state = self.live()?;
        if size == 0 || size < state.core {
            return Err(HandleError::InvalidParameter(format!(
                "maximum_pool_size {size} must be at least 1 and not below core_pool_size {}",
                state.core
            )));
        }
        state.max = size;
        self.shared.available.notify_all();
        Ok(())
    }

    fn keep_alive_time(&self) -> HandleResult<Duration> {
        Ok(self.live()?.keep_alive)
    }

    fn set_keep_alive_time(&self, keep_alive: Duration) -> HandleResult<()> {
        let mut state = self.live()?;
        state.keep_alive = keep_alive;
        self.shared.available.notify_all();
        Ok(())
    }

    fn active_thread_count(&self) -> HandleResult<u32> {
        self.ensure_live()?;
        Ok(self.shared.active.load(Ordering::SeqCst))
    }

    fn queue_length(&self) -> HandleResult<u64> {
        Ok(self.live()?.queue.len() as u64)
    }

    fn queue_remaining_capacity(&self) -> HandleResult<u64> {
        let state = self.live()?;
        Ok(self.shared.capacity.saturating_sub(state.queue.len()) as u64)
    }

    fn total_task_count(&self) -> HandleResult<u64> {
        self.ensure_live()?;
        Ok(self.shared.submitted.load(Ordering::SeqCst))
    }

    fn completed_task_count(&self) -> HandleResult<u64> {
        self.ensure_live()?;
        Ok(self.shared.completed.load(Ordering::SeqCst))
    }

    fn custom_task_count(&self) -> HandleResult<u64> {
        self.ensure_live()?;
        Ok(self.shared.custom.load(Ordering::SeqCst))
    }
}

/// Constructs worker pools and announces each one to a discovery listener
/// before handing it out.
#[derive(Clone)]
pub struct PoolFactory {
    listener: Arc<dyn DiscoveryListener>,
}

impl PoolFactory {
    pub fn new(listener: Arc<dyn DiscoveryListener>) -> Self {
        Self { listener }
    }

    pub fn build(&self, config: WorkerPoolConfig) -> Result<Arc<WorkerPool>, PoolError> {
        let pool = Arc::new(WorkerPool::new(config)?);
        let handle: Arc<dyn PoolHandle> = pool.clone();
        self.listener.on_pool_discovered(handle);
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PoolRegistry;
    use std::sync::mpsc;
    use std::time::Instant;

    /// A latch jobs can block on until the test opens it.
    #[derive(Default)]
    struct Gate {
        open: Mutex<bool>,
        cv: Condvar,
    }

    impl Gate {
        fn wait(&self) {
            let mut open = self.open.lock().unwrap();
            while !*open {
                open = self.cv.wait(open).unwrap();
            }
        }

        fn open(&self) {
            *self.open.lock().unwrap() = true;
            self.cv.notify_all();
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(10));
        }
    }

    fn blocking_job(gate: &Arc<Gate>) -> impl FnOnce() + Send + 'static {
        let gate = gate.clone();
        move || gate.wait()
    }

    #[test]
    fn config_validation() {
        assert!(matches!(
            WorkerPool::new(WorkerPoolConfig::new(0, 0)),
            Err(PoolError::InvalidConfig(_))
        ));
        assert!(matches!(
            WorkerPool::new(WorkerPoolConfig::new(5, 2)),
            Err(PoolError::InvalidConfig(_))
        ));
        assert!(WorkerPool::new(WorkerPoolConfig::new(0, 1)).is_ok());
    }

    #[test]
    fn executes_jobs() {
        let pool = WorkerPool::new(WorkerPoolConfig::new(2, 4)).unwrap();
        let (tx, rx) = mpsc::channel();
        for i in 0..5 {
            let tx = tx.clone();
            pool.execute(move || tx.send(i).unwrap()).unwrap();
        }

        let mut got: Vec<i32> = (0..5)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        got.sort();
        assert_eq!(got, vec![0, 1, 2, 3, 4]);

        wait_until(|| pool.completed_task_count().unwrap() == 5);
        assert_eq!(pool.total_task_count().unwrap(), 5);
    }

    #[test]
    fn zero_core_still_runs_queued_work() {
        let pool = WorkerPool::new(WorkerPoolConfig::new(0, 1)).unwrap();
        let (tx, rx) = mpsc::channel();
        pool.execute(move || tx.send(()).unwrap()).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn rejects_when_saturated() {
        let pool = WorkerPool::new(WorkerPoolConfig::new(1, 1).with_queue_capacity(1)).unwrap();
        let gate = Arc::new(Gate::default());

        pool.execute(blocking_job(&gate)).unwrap();
        pool.execute(blocking_job(&gate)).unwrap();
        assert_eq!(pool.queue_length().unwrap(), 1);
        assert_eq!(pool.queue_remaining_capacity().unwrap(), 0);

        let err = pool.execute(|| {}).unwrap_err();
        assert!(matches!(err, PoolError::Saturated { workers: 1 }));

        gate.open();
        wait_until(|| pool.completed_task_count().unwrap() == 2);
        assert_eq!(pool.total_task_count().unwrap(), 2);
    }

    #[test]
    fn grows_past_core_when_queue_full_then_retires() {
        let config = WorkerPoolConfig::new(1, 3)
            .with_queue_capacity(0)
            .with_keep_alive(Duration::from_millis(50));
        let pool = WorkerPool::new(config).unwrap();
        let gate = Arc::new(Gate::default());

        for _ in 0..3 {
            pool.execute(blocking_job(&gate)).unwrap();
        }
        assert_eq!(pool.pool_size(), 3);
        wait_until(|| pool.active_thread_count().unwrap() == 3);
        assert!(matches!(
            pool.execute(|| {}),
            Err(PoolError::Saturated { .. })
        ));

        gate.open();
        wait_until(|| pool.pool_size() == 1);
    }

    #[test]
    fn panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::new(WorkerPoolConfig::new(1, 1)).unwrap();
        pool.execute(|| panic!("boom")).unwrap();

        let (tx, rx) = mpsc::channel();
        pool.execute(move || tx.send(()).unwrap()).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        wait_until(|| pool.completed_task_count().unwrap() == 2);
        assert_eq!(pool.pool_size(), 1);
    }

    #[test]
    fn parameters_are_tunable() {
        let pool = WorkerPool::new(WorkerPoolConfig::new(2, 4)).unwrap();

        pool.set_maximum_pool_size(10).unwrap();
        pool.set_core_pool_size(8).unwrap();
        pool.set_keep_alive_time(Duration::from_millis(1500)).unwrap();

        assert_eq!(pool.core_pool_size().unwrap(), 8);
        assert_eq!(pool.maximum_pool_size().unwrap(), 10);
        assert_eq!(pool.keep_alive_time().unwrap(), Duration::from_millis(1500));

        assert!(matches!(
            pool.set_core_pool_size(11),
            Err(HandleError::InvalidParameter(_))
        ));
        assert!(matches!(
            pool.set_maximum_pool_size(7),
            Err(HandleError::InvalidParameter(_))
        ));
        assert_eq!(pool.core_pool_size().unwrap(), 8);
    }

    #[test]
    fn raising_core_starts_workers_for_backlog() {
        let pool = WorkerPool::new(WorkerPoolConfig::new(1, 4)).unwrap();
        let gate = Arc::new(Gate::default());
        for _ in 0..3 {
            pool.execute(blocking_job(&gate)).unwrap();
        }
        assert_eq!(pool.pool_size(), 1);
        assert_eq!(pool.queue_length().unwrap(), 2);

        pool.set_core_pool_size(3).unwrap();
        assert_eq!(pool.pool_size(), 3);
        wait_until(|| pool.active_thread_count().unwrap() == 3);

        gate.open();
        wait_until(|| pool.completed_task_count().unwrap() == 3);
    }

    #[test]
    fn shutdown_makes_handle_stale() {
        let pool = WorkerPool::new(WorkerPoolConfig::new(1, 1)).unwrap();
        pool.shutdown();

        assert!(pool.is_shutdown());
        assert_eq!(pool.core_pool_size(), Err(HandleError::Stale));
        assert_eq!(pool.set_core_pool_size(1), Err(HandleError::Stale));
        assert_eq!(pool.active_thread_count(), Err(HandleError::Stale));
        assert_eq!(pool.total_task_count(), Err(HandleError::Stale));
        assert_eq!(pool.completed_task_count(), Err(HandleError::Stale));
        assert_eq!(pool.custom_task_count(), Err(HandleError::Stale));
        assert!(matches!(pool.execute(|| {}), Err(PoolError::Shutdown)));
    }

    #[test]
    fn custom_counter() {
        let pool = WorkerPool::new(WorkerPoolConfig::new(1, 1)).unwrap();
        pool.record_custom_task();
        pool.record_custom_task();
        assert_eq!(pool.custom_task_count().unwrap(), 2);
    }

    #[test]
    fn names() {
        let named = WorkerPool::new(WorkerPoolConfig::new(1, 1).with_name("orders")).unwrap();
        assert_eq!(named.explicit_name(), Some("orders"));

        let anonymous = WorkerPool::new(WorkerPoolConfig::new(1, 1)).unwrap();
        assert_eq!(anonymous.explicit_name(), None);
        assert_eq!(anonymous.type_name(), "WorkerPool");
    }

    #[test]
    fn factory_announces_pools() {
        let registry = Arc::new(PoolRegistry::new());
        let factory = PoolFactory::new(registry.clone());

        let pool = factory
            .build(WorkerPoolConfig::new(5, 10).with_name("fixed"))
            .unwrap();
        assert_eq!(registry.len(), 1);

        let listed = registry.list_all().remove(0);
        let handle = listed.handle().unwrap();
        assert_eq!(handle.explicit_name(), Some("fixed"));
        assert_eq!(handle.core_pool_size().unwrap(), 5);

        drop(handle);
        drop(pool);
        assert!(listed.handle().is_none());
    }
}
