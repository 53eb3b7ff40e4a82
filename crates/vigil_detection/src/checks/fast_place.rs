//! Block place/use cadence.
//!
//! Places and uses are tracked separately. An interaction is scored when
//! it comes sooner than `max(min_interval_ms, mean - 2σ)` of the player's
//! own recent intervals.

use super::{Check, CheckState};
use crate::config::DetectionConfig;
use crate::error::CheckError;
use crate::score::Score;
use vigil_shared::{Action, BlockAction, CheckId, Event, EventKind, Evidence, Timestamp};
use vigil_stats::{clamp01, RollingWindow};

#[derive(Clone, Debug)]
struct Lane {
    last: Option<Timestamp>,
    intervals: RollingWindow,
}

impl Lane {
    fn new(window: usize) -> Self {
        Self {
            last: None,
            intervals: RollingWindow::new(window),
        }
    }
}

/// Per-player place and use cadence.
#[derive(Clone, Debug)]
pub struct FastPlaceState {
    place: Lane,
    interact: Lane,
}

/// Block interaction rate check.
#[derive(Clone, Copy, Debug, Default)]
pub struct FastPlaceCheck;

impl Check for FastPlaceCheck {
    fn id(&self) -> CheckId {
        CheckId::FAST_PLACE
    }

    fn subscriptions(&self) -> &[EventKind] {
        &[EventKind::BlockPlace, EventKind::BlockUse]
    }

    fn new_state(&self, config: &DetectionConfig) -> CheckState {
        let window = config.common(CheckId::FAST_PLACE).window;
        CheckState::FastPlace(FastPlaceState {
            place: Lane::new(window),
            interact: Lane::new(window),
        })
    }

    fn on_event(
        &self,
        config: &DetectionConfig,
        state: &mut CheckState,
        event: &Event,
    ) -> Result<Score, CheckError> {
        let CheckState::FastPlace(state) = state else {
            return Err(CheckError::StateMismatch { check: CheckId::FAST_PLACE });
        };
        let Action::Block { action, .. } = *event.action() else {
            return Ok(Score::zero(CheckId::FAST_PLACE, event));
        };
        let lane = match action {
            BlockAction::Place => &mut state.place,
            BlockAction::Use => &mut state.interact,
        };

        let now = event.timestamp();
        let Some(last) = lane.last.replace(now) else {
            return Ok(Score::zero(CheckId::FAST_PLACE, event));
        };

        let cfg = &config.checks.fast_place;
        let interval = (now.saturating_since(last) as f64).min(cfg.max_interval_ms);

        // Judge against history that does not include this interval.
        let ready = lane.intervals.len() >= config.common(CheckId::FAST_PLACE).min_samples;
        let mean = lane.intervals.mean();
        let limit = cfg.min_interval_ms.max(mean - 2.0 * lane.intervals.std_dev());
        lane.intervals.push(interval);

        if !ready || interval >= limit {
            return Ok(Score::zero(CheckId::FAST_PLACE, event));
        }

        let confidence = clamp01((limit - interval) / limit);
        let evidence = Evidence::new()
            .with("interval_ms", interval)
            .with("limit_ms", limit)
            .with("mean_interval_ms", mean);
        Ok(Score::new(CheckId::FAST_PLACE, event, confidence, evidence))
    }
}
