//! Attack distance against latency-compensated reach.

use super::{Check, CheckState};
use crate::config::DetectionConfig;
use crate::error::CheckError;
use crate::score::Score;
use vigil_shared::{Action, CheckId, Event, EventKind, Evidence};
use vigil_stats::{clamp01, RollingWindow};

/// Per-player history of reach excess (blocks beyond the allowance, or 0).
#[derive(Clone, Debug)]
pub struct ReachState {
    excess: RollingWindow,
}

/// Combat reach check.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReachCheck;

impl Check for ReachCheck {
    fn id(&self) -> CheckId {
        CheckId::REACH
    }

    fn subscriptions(&self) -> &[EventKind] {
        &[EventKind::Attack]
    }

    fn new_state(&self, config: &DetectionConfig) -> CheckState {
        CheckState::Reach(ReachState {
            excess: RollingWindow::new(config.common(CheckId::REACH).window),
        })
    }

    fn on_event(
        &self,
        config: &DetectionConfig,
        state: &mut CheckState,
        event: &Event,
    ) -> Result<Score, CheckError> {
        let CheckState::Reach(state) = state else {
            return Err(CheckError::StateMismatch { check: CheckId::REACH });
        };
        let Action::Attack { distance, rtt_ms } = *event.action() else {
            return Ok(Score::zero(CheckId::REACH, event));
        };

        let cfg = &config.checks.reach;
        let allowed = cfg.allowed_reach(rtt_ms);
        let excess = distance - allowed;
        let summary = state.excess.push(excess.max(0.0));

        // Only hits that are themselves too long are scored; the window
        // mean keeps one laggy hit from saturating.
        if summary.count < config.common(CheckId::REACH).min_samples || excess <= 0.0 {
            return Ok(Score::zero(CheckId::REACH, event));
        }

        let confidence = clamp01(summary.mean / cfg.saturation_excess);
        let evidence = Evidence::new()
            .with("distance", distance)
            .with("allowed", allowed)
            .with("excess", excess)
            .with("mean_excess", summary.mean)
            .with("rtt_ms", rtt_ms);
        Ok(Score::new(CheckId::REACH, event, confidence, evidence))
    }
}
