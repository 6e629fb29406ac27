//! Pool registry — per-process index of discovered pools.
//!
//! Entries hold a weak reference so the registry never keeps a pool alive.
//! There is no deletion notification; dropped or shut-down pools are
//! pruned when the reporter fails to snapshot them.
//!
//! Backed by a sharded concurrent map: registration from arbitrary
//! threads, reads from the reporter and control tasks, and iteration all
//! proceed without a global lock. Iteration is weakly consistent.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use poolwatch_core::{PoolIdentity, epoch_millis};
use tracing::{debug, info};

use crate::handle::{PoolHandle, identity_of};

/// Hook invoked the moment a pool instance is constructed.
pub trait DiscoveryListener: Send + Sync {
    fn on_pool_discovered(&self, handle: Arc<dyn PoolHandle>);
}

struct RegistryEntry {
    handle: Weak<dyn PoolHandle>,
    registered_at_epoch_millis: u64,
}

/// One registry entry as seen by [`PoolRegistry::list_all`].
#[derive(Clone)]
pub struct RegisteredPool {
    pub identity: PoolIdentity,
    pub registered_at_epoch_millis: u64,
    handle: Weak<dyn PoolHandle>,
}

impl RegisteredPool {
    /// The live handle, or `None` if the pool has been dropped.
    pub fn handle(&self) -> Option<Arc<dyn PoolHandle>> {
        self.handle.upgrade()
    }
}

impl std::fmt::Debug for RegisteredPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredPool")
            .field("identity", &self.identity)
            .field("registered_at_epoch_millis", &self.registered_at_epoch_millis)
            .field("alive", &(self.handle.strong_count() > 0))
            .finish()
    }
}

/// Concurrency-safe map of pool identity → handle.
#[derive(Default)]
pub struct PoolRegistry {
    entries: DashMap<PoolIdentity, RegistryEntry>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle under `identity`, replacing any previous entry.
    ///
    /// Returns true if an entry was replaced.
    pub fn register(&self, identity: PoolIdentity, handle: &Arc<dyn PoolHandle>) -> bool {
        let entry = RegistryEntry {
            handle: Arc::downgrade(handle),
            registered_at_epoch_millis: epoch_millis(),
        };
        let replaced = self.entries.insert(identity.clone(), entry).is_some();
        info!(
            %identity,
            replaced,
            registered = self.entries.len(),
            "pool registered"
        );
        replaced
    }

    /// Look up a live handle.
    pub fn get(&self, identity: &PoolIdentity) -> Option<Arc<dyn PoolHandle>> {
        self.entries
            .get(identity)
            .and_then(|entry| entry.handle.upgrade())
    }

    /// Point-in-time copy of all entries, including ones whose pool has
    /// been dropped since registration.
    pub fn list_all(&self) -> Vec<RegisteredPool> {
        self.entries
            .iter()
            .map(|entry| RegisteredPool {
                identity: entry.key().clone(),
                registered_at_epoch_millis: entry.registered_at_epoch_millis,
                handle: entry.handle.clone(),
            })
            .collect()
    }

    /// Remove an entry unconditionally. Returns true if it existed.
    pub fn unregister(&self, identity: &PoolIdentity) -> bool {
        let existed = self.entries.remove(identity).is_some();
        debug!(%identity, existed, "pool unregistered");
        existed
    }

    /// Remove `pool`'s entry only if it still refers to the same handle.
    ///
    /// A pool re-registered under the same identity after `pool` was
    /// listed is left alone.
    pub fn prune(&self, pool: &RegisteredPool) -> bool {
        let removed = self
            .entries
            .remove_if(&pool.identity, |_, entry| {
                Weak::ptr_eq(&entry.handle, &pool.handle)
            })
            .is_some();
        if removed {
            debug!(identity = %pool.identity, "registry entry pruned");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DiscoveryListener for PoolRegistry {
    fn on_pool_discovered(&self, handle: Arc<dyn PoolHandle>) {
        let identity = identity_of(&handle);
        self.register(identity, &handle);
    }
}
