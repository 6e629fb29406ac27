//! poolwatch-state — durable store of the latest snapshot per pool.
//!
//! Backed by [redb](https://docs.rs/redb). One table holds a
//! [`StoredPoolRecord`] per `(sourceHost, sourceApplication, identity)`,
//! JSON-serialized into a `&[u8]` value column.
//!
//! Every merge runs in its own write transaction. redb serializes write
//! transactions and readers see only committed state, so no reader ever
//! observes a half-written record.
//!
//! The `CollectorStore` is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Database>`) and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::CollectorStore;
pub use types::*;
