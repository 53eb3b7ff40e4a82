//! Horizontal movement speed against a configured cap.
//!
//! Two signals, the larger wins:
//! - the rolling mean sits above `cap * (1 + tolerance)` (sustained speed),
//! - the latest sample is above the same limit *and* a z-score outlier
//!   against the window (a burst).

use super::{Check, CheckState};
use crate::config::DetectionConfig;
use crate::error::CheckError;
use crate::score::Score;
use vigil_shared::{Action, CheckId, Event, EventKind, Evidence};
use vigil_stats::{clamp01, confidence_from_z, RollingWindow};

/// Per-player speed history.
#[derive(Clone, Debug)]
pub struct SpeedState {
    velocities: RollingWindow,
}

/// Movement speed check.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpeedCheck;

impl Check for SpeedCheck {
    fn id(&self) -> CheckId {
        CheckId::SPEED
    }

    fn subscriptions(&self) -> &[EventKind] {
        &[EventKind::Movement]
    }

    fn new_state(&self, config: &DetectionConfig) -> CheckState {
        CheckState::Speed(SpeedState {
            velocities: RollingWindow::new(config.common(CheckId::SPEED).window),
        })
    }

    fn on_event(
        &self,
        config: &DetectionConfig,
        state: &mut CheckState,
        event: &Event,
    ) -> Result<Score, CheckError> {
        let CheckState::Speed(state) = state else {
            return Err(CheckError::StateMismatch { check: CheckId::SPEED });
        };
        let Action::Movement { velocity, .. } = event.action() else {
            return Ok(Score::zero(CheckId::SPEED, event));
        };

        let cfg = &config.checks.speed;
        let speed = velocity.horizontal_length();
        let z = state.velocities.zscore(speed);
        let summary = state.velocities.push(speed);
        if summary.count < config.common(CheckId::SPEED).min_samples {
            return Ok(Score::zero(CheckId::SPEED, event));
        }

        let allowed_ratio = 1.0 + cfg.tolerance;
        let limit = cfg.max_speed * allowed_ratio;

        let sustained = if summary.mean > limit {
            clamp01((summary.mean / cfg.max_speed - allowed_ratio) / (cfg.saturation_ratio - allowed_ratio))
        } else {
            0.0
        };
        let burst = if speed > limit {
            confidence_from_z(z, cfg.spike_z, cfg.spike_z * 2.0)
        } else {
            0.0
        };

        let confidence = sustained.max(burst);
        if confidence <= 0.0 {
            return Ok(Score::zero(CheckId::SPEED, event));
        }
        let evidence = Evidence::new()
            .with("velocity", speed)
            .with("mean_velocity", summary.mean)
            .with("cap", cfg.max_speed)
            .with("z", z);
        Ok(Score::new(CheckId::SPEED, event, confidence, evidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::test_support::run;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use vigil_shared::{PlayerId, Timestamp, Vec3};

    fn moving(speeds: &[f64]) -> Vec<Event> {
        speeds
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let velocity = Vec3::new(s, 0.0, 0.0);
                Event::movement(PlayerId(1), Timestamp(50 * i as u64), velocity * 0.05, velocity)
            })
            .collect()
    }

    #[test]
    fn test_no_score_below_min_samples() {
        let config = DetectionConfig::default();
        let min = config.common(CheckId::SPEED).min_samples;
        let scores = run(&SpeedCheck, &config, &moving(&vec![50.0; min - 1]));
        assert!(scores.iter().all(Score::is_zero));
    }

    #[test]
    fn test_noise_around_cap_is_clean() {
        let config = DetectionConfig::default();
        let cap = config.checks.speed.max_speed;
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let speeds: Vec<f64> = (0..200).map(|_| cap * (1.0 + rng.gen_range(-0.05..0.05))).collect();
        let scores = run(&SpeedCheck, &config, &moving(&speeds));
        assert!(scores.iter().all(Score::is_zero));
    }

    #[test]
    fn test_triple_cap_saturates() {
        let config = DetectionConfig::default();
        let cap = config.checks.speed.max_speed;
        let scores = run(&SpeedCheck, &config, &moving(&vec![cap * 3.0; 20]));
        let last = &scores[19];
        assert_eq!(last.confidence, 1.0);
        assert_eq!(last.evidence.get("velocity"), Some(cap * 3.0));
        assert_eq!(last.evidence.get("cap"), Some(cap));
    }

    #[test]
    fn test_single_burst_scores_partially() {
        let config = DetectionConfig::default();
        let cap = config.checks.speed.max_speed;
        let mut speeds: Vec<f64> = (0..20).map(|i| cap * 0.6 + f64::from(i % 3) * 0.1).collect();
        speeds.push(cap * 1.6);
        let scores = run(&SpeedCheck, &config, &moving(&speeds));
        let burst = &scores[20];
        assert!(burst.confidence > 0.0 && burst.confidence <= 1.0);
        assert!(scores[..20].iter().all(Score::is_zero));
    }
}
