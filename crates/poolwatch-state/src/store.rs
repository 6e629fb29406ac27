//! CollectorStore — redb-backed table of the latest snapshot per pool.
//!
//! Records are keyed by `(sourceHost, sourceApplication, identity)`:
//! identities are only unique inside one process, so two processes that
//! report the same identity always get separate records.

use std::path::Path;
use std::sync::Arc;

use poolwatch_core::{PoolKey, PoolParameters, PoolSnapshot, epoch_millis};
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe collector store backed by redb.
#[derive(Clone)]
pub struct CollectorStore {
    db: Arc<Database>,
    policy: MergePolicy,
}

impl CollectorStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            policy: MergePolicy::default(),
        };
        store.ensure_tables()?;
        debug!(?path, "collector store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            policy: MergePolicy::default(),
        };
        store.ensure_tables()?;
        debug!("in-memory collector store opened");
        Ok(store)
    }

    pub fn with_policy(mut self, policy: MergePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(POOLS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Merge ──────────────────────────────────────────────────────

    /// Merge one snapshot, stamping it with the current time.
    pub fn merge(&self, snapshot: &PoolSnapshot) -> StateResult<MergeOutcome> {
        self.merge_at(snapshot, epoch_millis())
    }

    /// Merge one snapshot as if it arrived at `now`.
    pub fn merge_at(&self, snapshot: &PoolSnapshot, now: u64) -> StateResult<MergeOutcome> {
        let outcomes = self.merge_all(std::slice::from_ref(snapshot), now)?;
        Ok(outcomes[0])
    }

    /// Merge a whole upload batch in one transaction.
    pub fn merge_batch(&self, snapshots: &[PoolSnapshot]) -> StateResult<Vec<MergeOutcome>> {
        self.merge_all(snapshots, epoch_millis())
    }

    fn merge_all(&self, snapshots: &[PoolSnapshot], now: u64) -> StateResult<Vec<MergeOutcome>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut outcomes = Vec::with_capacity(snapshots.len());
        {
            let mut table = txn.open_table(POOLS).map_err(map_err!(Table))?;
            for snapshot in snapshots {
                let key = (
                    snapshot.source_host.as_str(),
                    snapshot.source_application.as_str(),
                    snapshot.identity.as_str(),
                );
                let existing = match table.get(key).map_err(map_err!(Read))? {
                    Some(guard) => Some(decode(guard.value())?),
                    None => None,
                };

                let (outcome, record) = merged(existing, snapshot, now, self.policy);
                if let Some(record) = record {
                    let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
                    table
                        .insert(key, value.as_slice())
                        .map_err(map_err!(Write))?;
                }
                debug!(
                    identity = %snapshot.identity,
                    host = %snapshot.source_host,
                    application = %snapshot.source_application,
                    ?outcome,
                    "snapshot merged"
                );
                outcomes.push(outcome);
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(outcomes)
    }

    // ── Reads ──────────────────────────────────────────────────────

    pub fn get(&self, key: &PoolKey) -> StateResult<Option<StoredPoolRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(POOLS).map_err(map_err!(Table))?;
        match table.get(columns(key)).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// All records, ordered by host, application, then identity.
    pub fn list(&self) -> StateResult<Vec<StoredPoolRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(POOLS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    // ── Optimistic update ──────────────────────────────────────────

    /// Overwrite the stored parameters after the owning agent confirmed a
    /// change. `last_seen_at` is left alone: it tracks telemetry only.
    ///
    /// Returns `None` if the record is gone.
    pub fn apply_parameters(
        &self,
        key: &PoolKey,
        params: &PoolParameters,
    ) -> StateResult<Option<StoredPoolRecord>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let updated;
        {
            let mut table = txn.open_table(POOLS).map_err(map_err!(Table))?;
            let existing = match table.get(columns(key)).map_err(map_err!(Read))? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            updated = match existing {
                Some(mut record) => {
                    record.snapshot.set_parameters(params);
                    let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
                    table
                        .insert(columns(key), value.as_slice())
                        .map_err(map_err!(Write))?;
                    Some(record)
                }
                None => None,
            };
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, found = updated.is_some(), "parameters applied to record");
        Ok(updated)
    }
}

fn columns(key: &PoolKey) -> (&str, &str, &str) {
    (
        key.source_host.as_str(),
        key.source_application.as_str(),
        key.identity.as_str(),
    )
}

fn decode(bytes: &[u8]) -> StateResult<StoredPoolRecord> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

/// Reconcile `snapshot` with the stored record. Returns the record to
/// write, or `None` when nothing changes.
fn merged(
    existing: Option<StoredPoolRecord>,
    snapshot: &PoolSnapshot,
    now: u64,
    policy: MergePolicy,
) -> (MergeOutcome, Option<StoredPoolRecord>) {
    match existing {
        None => (
            MergeOutcome::Inserted,
            Some(StoredPoolRecord {
                snapshot: snapshot.clone(),
                first_seen_at: now,
                last_seen_at: now,
            }),
        ),
        Some(record)
            if policy == MergePolicy::CapturedAt
                && snapshot.captured_at_epoch_millis < record.snapshot.captured_at_epoch_millis =>
        {
            (MergeOutcome::Stale, None)
        }
        Some(record) => (
            MergeOutcome::Updated,
            Some(StoredPoolRecord {
                snapshot: snapshot.clone(),
                first_seen_at: record.first_seen_at,
                last_seen_at: now,
            }),
        ),
    }
}
