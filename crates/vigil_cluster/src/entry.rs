//! Wire representation of a violation record.
//!
//! ```text
//! key   = "{check}:{player}"            e.g. "speed:42"
//! value = {"level":3.5,"timestamp":1700000000000,"suppressed_until":1700000030000}
//! ```
//!
//! `suppressed_until` is omitted when no cooldown runs.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use vigil_detection::{RemoteLevel, ViolationRecord};
use vigil_shared::{CheckId, PlayerId, Timestamp};

/// Store key of one (check, player) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClusterKey {
    /// Check.
    pub check: CheckId,
    /// Player.
    pub player: PlayerId,
}

impl ClusterKey {
    /// Creates a key.
    #[must_use]
    pub const fn new(check: CheckId, player: PlayerId) -> Self {
        Self { check, player }
    }
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.check, self.player)
    }
}

/// Replicated level of one (check, player) pair.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterEntry {
    /// Level at `timestamp`.
    pub level: f64,
    /// Time of the writing instance's last update (epoch ms).
    pub timestamp: Timestamp,
    /// End of the verdict cooldown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppressed_until: Option<Timestamp>,
}

impl ClusterEntry {
    /// Creates an entry without a cooldown.
    #[must_use]
    pub const fn new(level: f64, timestamp: Timestamp) -> Self {
        Self {
            level,
            timestamp,
            suppressed_until: None,
        }
    }

    /// Last-writer-wins order: timestamp, then level, then suppression.
    #[must_use]
    pub fn precedence(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.level.total_cmp(&other.level))
            .then_with(|| self.suppressed_until.cmp(&other.suppressed_until))
    }

    /// JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] for a non-finite level.
    pub fn encode(&self, key: &str) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| StoreError::Corrupt {
            key: key.to_owned(),
            reason: e.to_string(),
        })
    }

    /// Parses JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if the value is not an entry or
    /// carries a negative level.
    pub fn decode(key: &str, bytes: &[u8]) -> StoreResult<Self> {
        let entry: Self = serde_json::from_slice(bytes).map_err(|e| StoreError::Corrupt {
            key: key.to_owned(),
            reason: e.to_string(),
        })?;
        if !entry.level.is_finite() || entry.level < 0.0 {
            return Err(StoreError::Corrupt {
                key: key.to_owned(),
                reason: format!("level {} out of range", entry.level),
            });
        }
        Ok(entry)
    }

    /// Ledger view of this entry.
    #[must_use]
    pub const fn to_remote(&self) -> RemoteLevel {
        RemoteLevel {
            level: self.level,
            timestamp: self.timestamp,
            suppressed_until: self.suppressed_until,
        }
    }
}

impl From<&ViolationRecord> for ClusterEntry {
    fn from(record: &ViolationRecord) -> Self {
        Self {
            level: record.level,
            timestamp: record.last_update,
            suppressed_until: record.suppressed_until,
        }
    }
}

/// Merges two entries for the same key.
///
/// Commutative, associative and idempotent: the result is whichever input
/// ranks higher under [`ClusterEntry::precedence`].
#[must_use]
pub fn merge(a: ClusterEntry, b: ClusterEntry) -> ClusterEntry {
    if b.precedence(&a) == Ordering::Greater {
        b
    } else {
        a
    }
}
