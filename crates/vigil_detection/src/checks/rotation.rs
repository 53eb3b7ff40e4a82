//! Rotation consistency and snapping.
//!
//! - **Snap**: share of recent rotations at or above `snap_floor_deg`
//!   beyond what a human sustains.
//! - **Synthetic aim**: consecutive yaw deltas keep sharing one GCD
//!   (a fixed step) while yaw jitter stays below `jitter_ceiling`.

use super::{Check, CheckState};
use crate::config::DetectionConfig;
use crate::error::CheckError;
use crate::score::Score;
use vigil_shared::{Action, CheckId, Event, EventKind, Evidence};
use vigil_stats::{clamp01, GcdTracker, RollingWindow};

/// Per-player rotation state.
#[derive(Clone, Debug)]
pub struct RotationState {
    snaps: RollingWindow,
    yaw: RollingWindow,
    gcd: GcdTracker,
}

/// Rotation check.
#[derive(Clone, Copy, Debug, Default)]
pub struct RotationCheck;

impl Check for RotationCheck {
    fn id(&self) -> CheckId {
        CheckId::ROTATION
    }

    fn subscriptions(&self) -> &[EventKind] {
        &[EventKind::Rotation]
    }

    fn new_state(&self, config: &DetectionConfig) -> CheckState {
        let window = config.common(CheckId::ROTATION).window;
        CheckState::Rotation(RotationState {
            snaps: RollingWindow::new(window),
            yaw: RollingWindow::new(window),
            gcd: GcdTracker::new(window, config.checks.rotation.gcd_tolerance),
        })
    }

    fn on_event(
        &self,
        config: &DetectionConfig,
        state: &mut CheckState,
        event: &Event,
    ) -> Result<Score, CheckError> {
        let CheckState::Rotation(state) = state else {
            return Err(CheckError::StateMismatch { check: CheckId::ROTATION });
        };
        let Action::Rotation { yaw_delta, pitch_delta } = *event.action() else {
            return Ok(Score::zero(CheckId::ROTATION, event));
        };

        let cfg = &config.checks.rotation;
        let min_samples = config.common(CheckId::ROTATION).min_samples;
        let magnitude = yaw_delta.hypot(pitch_delta);
        let snapped = magnitude >= cfg.snap_floor_deg;

        state.snaps.push(if snapped { 1.0 } else { 0.0 });
        state.yaw.push(yaw_delta.abs());
        let consistency = state.gcd.push(yaw_delta);

        if state.snaps.len() < min_samples {
            return Ok(Score::zero(CheckId::ROTATION, event));
        }

        let snap_rate = state.snaps.mean();
        let snap = if snapped && snap_rate > cfg.max_snap_rate {
            clamp01((snap_rate - cfg.max_snap_rate) / (1.0 - cfg.max_snap_rate))
        } else {
            0.0
        };

        let jitter = state.yaw.std_dev();
        let aim = if state.gcd.len() >= min_samples
            && consistency >= cfg.gcd_consistency
            && jitter <= cfg.jitter_ceiling
            && yaw_delta.abs() > 0.0
        {
            clamp01((consistency - cfg.gcd_consistency) / (1.0 - cfg.gcd_consistency))
        } else {
            0.0
        };

        let confidence = snap.max(aim);
        if confidence <= 0.0 {
            return Ok(Score::zero(CheckId::ROTATION, event));
        }
        let evidence = Evidence::new()
            .with("magnitude", magnitude)
            .with("snap_rate", snap_rate)
            .with("gcd_consistency", consistency)
            .with("jitter", jitter)
            .with("gcd", state.gcd.last_gcd().unwrap_or(0.0));
        Ok(Score::new(CheckId::ROTATION, event, confidence, evidence))
    }
}
