//! redb table definitions for the collector store.

use redb::TableDefinition;

/// `(source_host, source_application, identity)`.
pub type PoolKeyColumns = (&'static str, &'static str, &'static str);

/// JSON-serialized `StoredPoolRecord`s.
pub const POOLS: TableDefinition<PoolKeyColumns, &[u8]> = TableDefinition::new("pools");
