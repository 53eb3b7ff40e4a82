//! Aggregation for offline review.

use crate::error::AuditError;
use crate::record::{AuditKind, AuditRecord};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use vigil_shared::{PlayerId, Timestamp};

/// Totals for one check.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CheckSummary {
    /// Flag records.
    pub flags: u64,
    /// Verdict records.
    pub verdicts: u64,
    /// Distinct players with a verdict.
    pub players: BTreeSet<PlayerId>,
    /// Highest recorded level.
    pub max_level: f64,
}

/// Totals for one player.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PlayerSummary {
    /// Flag records.
    pub flags: u64,
    /// Verdict records.
    pub verdicts: u64,
    /// Checks that produced a verdict.
    pub checks: BTreeSet<String>,
    /// First record.
    pub first_seen: Option<Timestamp>,
    /// Last record.
    pub last_seen: Option<Timestamp>,
}

/// Summary of a whole log.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AuditSummary {
    /// Records read.
    pub records: u64,
    /// Per check.
    pub checks: BTreeMap<String, CheckSummary>,
    /// Per player.
    pub players: BTreeMap<PlayerId, PlayerSummary>,
    /// Reading stopped at a partial trailing record.
    pub torn_tail: bool,
    /// Reading stopped at a corrupt record.
    pub corruption: Option<String>,
}

impl AuditSummary {
    /// Folds every record of a reader (or any record iterator).
    pub fn collect(records: impl IntoIterator<Item = Result<AuditRecord, AuditError>>) -> Self {
        let mut summary = Self::default();
        for record in records {
            match record {
                Ok(record) => summary.add(&record),
                Err(err) => {
                    summary.corruption = Some(err.to_string());
                    break;
                }
            }
        }
        summary
    }

    /// Adds one record.
    pub fn add(&mut self, record: &AuditRecord) {
        self.records += 1;
        let check = self.checks.entry(record.check.clone()).or_default();
        let player = self.players.entry(record.player).or_default();
        match record.kind {
            AuditKind::Flagged => {
                check.flags += 1;
                player.flags += 1;
            }
            AuditKind::Verdict => {
                check.verdicts += 1;
                check.players.insert(record.player);
                player.verdicts += 1;
                player.checks.insert(record.check.clone());
            }
        }
        check.max_level = check.max_level.max(record.level);
        player.first_seen = Some(player.first_seen.map_or(record.timestamp, |t| t.min(record.timestamp)));
        player.last_seen = Some(player.last_seen.map_or(record.timestamp, |t| t.max(record.timestamp)));
    }

    /// Players ordered by verdict count, most first.
    #[must_use]
    pub fn worst_players(&self, limit: usize) -> Vec<(PlayerId, &PlayerSummary)> {
        let mut players: Vec<_> = self.players.iter().map(|(id, s)| (*id, s)).collect();
        players.sort_by(|a, b| b.1.verdicts.cmp(&a.1.verdicts).then(b.1.flags.cmp(&a.1.flags)).then(a.0.cmp(&b.0)));
        players.truncate(limit);
        players
    }
}
