//! Movement packet cadence against the server tick.
//!
//! Every movement sample is one client tick. The check keeps a CUSUM of
//! `(interval - nominal) / nominal`, i.e. ticks gained on the server
//! clock. Lag banks credit (bounded by `max_credit_ticks`) so the burst
//! that follows a stall does not count. Crossing `cusum_h` ticks is an
//! alarm; the sums are re-armed afterwards so a steady timer keeps
//! producing alarms.

use super::{Check, CheckState};
use crate::config::DetectionConfig;
use crate::error::CheckError;
use crate::score::Score;
use vigil_shared::{CheckId, Event, EventKind, Evidence, Timestamp};
use vigil_stats::{clamp01, Cusum, RollingWindow, Shift};

/// Per-player cadence state.
#[derive(Clone, Debug)]
pub struct TimerState {
    last: Option<Timestamp>,
    intervals: RollingWindow,
    cusum: Cusum,
}

/// Packet timer check.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimerCheck;

impl Check for TimerCheck {
    fn id(&self) -> CheckId {
        CheckId::TIMER
    }

    fn subscriptions(&self) -> &[EventKind] {
        &[EventKind::Movement]
    }

    fn new_state(&self, config: &DetectionConfig) -> CheckState {
        let cfg = &config.checks.timer;
        CheckState::Timer(TimerState {
            last: None,
            intervals: RollingWindow::new(config.common(CheckId::TIMER).window),
            cusum: Cusum::new(cfg.cusum_k, cfg.cusum_h).with_credit(cfg.max_credit_ticks),
        })
    }

    fn on_event(
        &self,
        config: &DetectionConfig,
        state: &mut CheckState,
        event: &Event,
    ) -> Result<Score, CheckError> {
        let CheckState::Timer(state) = state else {
            return Err(CheckError::StateMismatch { check: CheckId::TIMER });
        };
        if event.kind() != EventKind::Movement {
            return Ok(Score::zero(CheckId::TIMER, event));
        }

        let now = event.timestamp();
        let Some(last) = state.last.replace(now) else {
            return Ok(Score::zero(CheckId::TIMER, event));
        };

        let cfg = &config.checks.timer;
        let nominal = config.normalizer.nominal_tick_ms as f64;
        let interval = (now.saturating_since(last) as f64).min(cfg.max_interval_ms);
        state.intervals.push(interval);
        let shift = state.cusum.push_known(interval, nominal, nominal);

        if state.intervals.len() < config.common(CheckId::TIMER).min_samples {
            return Ok(Score::zero(CheckId::TIMER, event));
        }
        if shift != Some(Shift::Decrease) {
            return Ok(Score::zero(CheckId::TIMER, event));
        }

        let gained = state.cusum.lower();
        state.cusum.rearm();

        let mean = state.intervals.mean().max(1.0);
        let rate = nominal / mean;
        // The alarm alone is worth half; a clearly fast clock saturates.
        let confidence = 0.5 + 0.5 * clamp01((rate - 1.0) / (cfg.saturation_rate - 1.0));
        let evidence = Evidence::new()
            .with("interval_ms", interval)
            .with("mean_interval_ms", mean)
            .with("clock_rate", rate)
            .with("ticks_ahead", gained);
        tracing::debug!(player = %event.player(), rate, gained, "timer alarm");
        Ok(Score::new(CheckId::TIMER, event, confidence, evidence))
    }
}
