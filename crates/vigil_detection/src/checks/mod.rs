//! # Checks
//!
//! One behavioral rule per check. The coordinator owns a list of
//! `Box<dyn Check>`; each session owns one [`CheckState`] per check.
//!
//! ```text
//!              ┌──────────────┐
//!   Event ───► │ Check::      │ ──► Score { confidence ∈ [0,1], evidence }
//!              │  on_event    │
//!   &mut ────► │  (pure fn of │
//!   CheckState │  state+event)│
//!              └──────────────┘
//! ```
//!
//! ## Contract
//!
//! - Never block; O(1) per event (window scans bounded by capacity).
//! - Below `min_samples` the answer is [`Score::zero`].
//! - A check only ever sees its own state.

mod autoclicker;
mod fast_place;
mod reach;
mod rotation;
mod speed;
mod timer;

pub use autoclicker::{AutoClickerCheck, AutoClickerState};
pub use fast_place::{FastPlaceCheck, FastPlaceState};
pub use reach::{ReachCheck, ReachState};
pub use rotation::{RotationCheck, RotationState};
pub use speed::{SpeedCheck, SpeedState};
pub use timer::{TimerCheck, TimerState};

use crate::config::DetectionConfig;
use crate::error::CheckError;
use crate::score::Score;
use std::any::Any;
use std::fmt;
use vigil_shared::{CheckId, Event, EventKind};

/// A behavioral detection rule.
pub trait Check: Send + Sync {
    /// Stable id, used for config sections, ledger keys and store keys.
    fn id(&self) -> CheckId;

    /// Event kinds this check consumes.
    fn subscriptions(&self) -> &[EventKind];

    /// Fresh per-player state, sized from the current snapshot.
    fn new_state(&self, config: &DetectionConfig) -> CheckState;

    /// Folds `event` into `state` and scores it.
    ///
    /// # Errors
    ///
    /// Any error is logged by the coordinator and the check is skipped for
    /// this event only.
    fn on_event(
        &self,
        config: &DetectionConfig,
        state: &mut CheckState,
        event: &Event,
    ) -> Result<Score, CheckError>;
}

/// Per-player state of one check.
pub enum CheckState {
    /// [`SpeedCheck`]
    Speed(SpeedState),
    /// [`TimerCheck`]
    Timer(TimerState),
    /// [`ReachCheck`]
    Reach(ReachState),
    /// [`RotationCheck`]
    Rotation(RotationState),
    /// [`AutoClickerCheck`]
    AutoClicker(AutoClickerState),
    /// [`FastPlaceCheck`]
    FastPlace(FastPlaceState),
    /// Host check that keeps nothing per player.
    Stateless,
    /// Host check with its own state type.
    Custom(Box<dyn Any + Send>),
}

impl CheckState {
    /// Wraps a host-defined state.
    #[must_use]
    pub fn custom<T: Any + Send>(state: T) -> Self {
        Self::Custom(Box::new(state))
    }

    /// Host-defined state, if this is one of type `T`.
    pub fn custom_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        match self {
            Self::Custom(inner) => inner.downcast_mut::<T>(),
            _ => None,
        }
    }

    /// Variant name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Speed(_) => "speed",
            Self::Timer(_) => "timer",
            Self::Reach(_) => "reach",
            Self::Rotation(_) => "rotation",
            Self::AutoClicker(_) => "autoclicker",
            Self::FastPlace(_) => "fast_place",
            Self::Stateless => "stateless",
            Self::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CheckState::{}", self.name())
    }
}

/// The built-in catalogue, in [`CheckId::BUILTIN`] order.
#[must_use]
pub fn default_checks() -> Vec<Box<dyn Check>> {
    vec![
        Box::new(SpeedCheck),
        Box::new(TimerCheck),
        Box::new(ReachCheck),
        Box::new(RotationCheck),
        Box::new(AutoClickerCheck),
        Box::new(FastPlaceCheck),
    ]
}
