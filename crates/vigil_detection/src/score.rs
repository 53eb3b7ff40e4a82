//! Check output.

use vigil_shared::{CheckId, Event, Evidence, PlayerId, Timestamp};
use vigil_stats::clamp01;

/// One check's judgment of one event.
///
/// Transient: the ledger consumes it immediately.
#[derive(Clone, Debug, PartialEq)]
pub struct Score {
    /// Scoring check.
    pub check: CheckId,
    /// Scored player.
    pub player: PlayerId,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Numbers behind the confidence.
    pub evidence: Evidence,
    /// Event time.
    pub timestamp: Timestamp,
}

impl Score {
    /// Creates a score for `event`, clamping the confidence into `[0, 1]`
    /// (NaN becomes `0`).
    #[must_use]
    pub fn new(check: CheckId, event: &Event, confidence: f64, evidence: Evidence) -> Self {
        Self {
            check,
            player: event.player(),
            confidence: clamp01(confidence),
            evidence,
            timestamp: event.timestamp(),
        }
    }

    /// Zero-confidence score: not enough data, or nothing suspicious.
    #[must_use]
    pub fn zero(check: CheckId, event: &Event) -> Self {
        Self::new(check, event, 0.0, Evidence::new())
    }

    /// True if the score carries no evidence of cheating.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.confidence <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_clamped() {
        let event = Event::swing(PlayerId(1), Timestamp(5));
        assert_eq!(Score::new(CheckId::SPEED, &event, 4.0, Evidence::new()).confidence, 1.0);
        assert_eq!(Score::new(CheckId::SPEED, &event, -1.0, Evidence::new()).confidence, 0.0);
        assert!(Score::new(CheckId::SPEED, &event, f64::NAN, Evidence::new()).is_zero());
        assert_eq!(Score::zero(CheckId::REACH, &event).timestamp, Timestamp(5));
    }
}
