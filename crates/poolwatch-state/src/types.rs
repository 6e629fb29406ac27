//! Record and merge types for the collector store.

use std::fmt;
use std::str::FromStr;

use poolwatch_core::{PoolKey, PoolSnapshot};
use serde::{Deserialize, Serialize};

/// The collector's view of one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPoolRecord {
    pub snapshot: PoolSnapshot,
    /// Arrival time of the first snapshot for this key.
    pub first_seen_at: u64,
    /// Arrival time of the latest accepted snapshot.
    pub last_seen_at: u64,
}

impl StoredPoolRecord {
    pub fn key(&self) -> PoolKey {
        self.snapshot.key()
    }
}

/// How a later snapshot for an existing key is reconciled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicy {
    /// Last writer wins by arrival order.
    #[default]
    Arrival,
    /// A snapshot captured earlier than the stored one is discarded.
    CapturedAt,
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergePolicy::Arrival => write!(f, "arrival"),
            MergePolicy::CapturedAt => write!(f, "captured-at"),
        }
    }
}

impl FromStr for MergePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "arrival" => Ok(MergePolicy::Arrival),
            "captured-at" => Ok(MergePolicy::CapturedAt),
            other => Err(format!(
                "unknown merge policy '{other}' (expected 'arrival' or 'captured-at')"
            )),
        }
    }
}

/// Result of merging one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Updated,
    /// Discarded under [`MergePolicy::CapturedAt`]; the record is unchanged.
    Stale,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_policy_parses() {
        assert_eq!("arrival".parse::<MergePolicy>(), Ok(MergePolicy::Arrival));
        assert_eq!(
            "captured-at".parse::<MergePolicy>(),
            Ok(MergePolicy::CapturedAt)
        );
        assert!("newest".parse::<MergePolicy>().is_err());
        assert_eq!(MergePolicy::CapturedAt.to_string(), "captured-at");
        assert_eq!(MergePolicy::default(), MergePolicy::Arrival);
    }
}
