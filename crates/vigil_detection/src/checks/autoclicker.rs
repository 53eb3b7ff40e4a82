//! Click cadence: too fast, or too regular for a human hand.

use super::{Check, CheckState};
use crate::config::DetectionConfig;
use crate::error::CheckError;
use crate::score::Score;
use vigil_shared::{CheckId, Event, EventKind, Evidence, Timestamp};
use vigil_stats::{clamp01, coefficient_of_variation, RollingWindow};

/// Per-player click intervals of the current burst.
#[derive(Clone, Debug)]
pub struct AutoClickerState {
    last: Option<Timestamp>,
    intervals: RollingWindow,
}

/// Click pattern check.
#[derive(Clone, Copy, Debug, Default)]
pub struct AutoClickerCheck;

impl Check for AutoClickerCheck {
    fn id(&self) -> CheckId {
        CheckId::AUTOCLICKER
    }

    fn subscriptions(&self) -> &[EventKind] {
        &[EventKind::Swing]
    }

    fn new_state(&self, config: &DetectionConfig) -> CheckState {
        CheckState::AutoClicker(AutoClickerState {
            last: None,
            intervals: RollingWindow::new(config.common(CheckId::AUTOCLICKER).window),
        })
    }

    fn on_event(
        &self,
        config: &DetectionConfig,
        state: &mut CheckState,
        event: &Event,
    ) -> Result<Score, CheckError> {
        let CheckState::AutoClicker(state) = state else {
            return Err(CheckError::StateMismatch { check: CheckId::AUTOCLICKER });
        };
        if event.kind() != EventKind::Swing {
            return Ok(Score::zero(CheckId::AUTOCLICKER, event));
        }

        let now = event.timestamp();
        let Some(last) = state.last.replace(now) else {
            return Ok(Score::zero(CheckId::AUTOCLICKER, event));
        };

        let cfg = &config.checks.autoclicker;
        let interval = now.saturating_since(last) as f64;
        if interval > cfg.max_interval_ms {
            // Burst over; the next one is judged on its own.
            state.intervals.clear();
            return Ok(Score::zero(CheckId::AUTOCLICKER, event));
        }

        let summary = state.intervals.push(interval);
        if summary.count < config.common(CheckId::AUTOCLICKER).min_samples {
            return Ok(Score::zero(CheckId::AUTOCLICKER, event));
        }

        let mean = summary.mean.max(1.0);
        let cps = 1_000.0 / mean;
        let cv = coefficient_of_variation(mean, summary.std_dev());

        let regular = if cps >= cfg.min_cps && cv <= cfg.cv_threshold {
            clamp01((cps - cfg.min_cps) * 0.5 + (cfg.cv_threshold - cv) * 20.0)
        } else {
            0.0
        };
        let fast = if cps > cfg.max_cps {
            clamp01((cps - cfg.max_cps) / cfg.max_cps)
        } else {
            0.0
        };

        let confidence = regular.max(fast);
        if confidence <= 0.0 {
            return Ok(Score::zero(CheckId::AUTOCLICKER, event));
        }
        let evidence = Evidence::new()
            .with("cps", cps)
            .with("cv", cv)
            .with("interval_ms", interval);
        Ok(Score::new(CheckId::AUTOCLICKER, event, confidence, evidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::test_support::run;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use vigil_shared::PlayerId;

    fn clicks(intervals: &[u64]) -> Vec<Event> {
        let mut t = 10_000;
        let mut events = vec![Event::swing(PlayerId(5), Timestamp(t))];
        for &dt in intervals {
            t += dt;
            events.push(Event::swing(PlayerId(5), Timestamp(t)));
        }
        events
    }

    #[test]
    fn test_human_clicking_is_clean() {
        let config = DetectionConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        // ~9 CPS with human spread.
        let intervals: Vec<u64> = (0..200).map(|_| rng.gen_range(70..160)).collect();
        let scores = run(&AutoClickerCheck, &config, &clicks(&intervals));
        assert!(scores.iter().all(Score::is_zero));
    }

    #[test]
    fn test_metronome_clicking_scores() {
        let config = DetectionConfig::default();
        // 14 CPS, almost no spread.
        let intervals: Vec<u64> = (0..40).map(|i| if i % 2 == 0 { 71 } else { 72 }).collect();
        let scores = run(&AutoClickerCheck, &config, &clicks(&intervals));
        let last = &scores[40];
        assert_eq!(last.confidence, 1.0);
        assert!(last.evidence.get("cv").is_some_and(|cv| cv < 0.01));
    }

    #[test]
    fn test_pause_resets_burst() {
        let config = DetectionConfig::default();
        let mut intervals = vec![71; 19];
        intervals.push(5_000);
        intervals.extend(vec![71; 19]);
        let scores = run(&AutoClickerCheck, &config, &clicks(&intervals));
        assert!(scores.iter().all(Score::is_zero));
    }
}
