//! Outbound verdicts.
//!
//! The engine never punishes anyone itself. It hands [`Verdict`]s to a
//! [`VerdictSink`] owned by the punishment/alerting layer of the host.

use crate::events::{Event, Evidence};
use crate::ids::{CheckId, PlayerId, Timestamp};
use serde::Serialize;

/// Decision that a player crossed a threshold for one check.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Verdict {
    /// Offending player.
    pub player: PlayerId,
    /// Check that crossed its threshold.
    pub check: CheckId,
    /// Violation level at the crossing.
    pub level: f64,
    /// Evidence from the score that caused the crossing.
    pub evidence: Evidence,
    /// Time of the crossing.
    pub timestamp: Timestamp,
    /// The player's most recent events up to the crossing, oldest first.
    /// Empty when replay capture is off.
    pub replay: Vec<Event>,
}

/// Receiver of verdicts.
///
/// Delivery is at-least-once. Implementations must be idempotent against a
/// repeated verdict for the same player and check within the cooldown
/// window, must not block, and must not panic (a panic is caught and logged
/// but the verdict is lost for that sink).
pub trait VerdictSink: Send + Sync {
    /// Level crossed the punish threshold (T2).
    fn verdict(&self, verdict: &Verdict);

    /// Level crossed the report threshold (T1).
    fn flagged(&self, _report: &Verdict) {}
}
