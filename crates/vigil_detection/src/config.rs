//! # Detection Configuration
//!
//! Immutable snapshot of everything the checks, normalizer and ledger read.
//!
//! ```toml
//! [ledger]
//! epsilon = 0.05
//! grace_ms = 10000
//!
//! [checks.speed]
//! max_speed = 7.2
//! flag_threshold = 5.0      # overrides the speed default only
//!
//! [checks.custom.my_check]
//! tau_secs = 5.0
//!
//! [replay]
//! max_bytes = 16384
//! ```
//!
//! Each check has its own defaults for the shared settings (window, decay,
//! thresholds); a TOML section only overrides the keys it names. A running
//! engine never mutates a snapshot: [`ConfigHandle::swap`] replaces the
//! whole `Arc`.

use crate::error::{ConfigError, ConfigResult};
use crate::ledger::LedgerParams;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use vigil_shared::CheckId;

/// Settings every check has, resolved.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CheckCommon {
    /// Check runs at all.
    pub enabled: bool,
    /// Rolling window capacity (samples).
    pub window: usize,
    /// Samples required before the check may score.
    pub min_samples: usize,
    /// Decay time constant τ (seconds).
    pub tau_secs: f64,
    /// Multiplier applied to each score before accumulation.
    pub weight: f64,
    /// Report threshold T1.
    pub flag_threshold: f64,
    /// Punish threshold T2.
    pub punish_threshold: f64,
    /// Cooldown after a verdict (ms).
    pub cooldown_ms: u64,
}

impl Default for CheckCommon {
    fn default() -> Self {
        Self {
            enabled: true,
            window: 20,
            min_samples: 8,
            tau_secs: 20.0,
            weight: 1.0,
            flag_threshold: 4.0,
            punish_threshold: 12.0,
            cooldown_ms: 30_000,
        }
    }
}

impl CheckCommon {
    fn validate(&self, check: &str) -> ConfigResult<()> {
        let invalid = |field: &str, reason: String| ConfigError::Invalid {
            field: format!("checks.{check}.{field}"),
            reason,
        };
        if self.min_samples == 0 {
            return Err(invalid("min_samples", "must be at least 1".into()));
        }
        if self.window < self.min_samples {
            return Err(invalid(
                "window",
                format!("{} is smaller than min_samples {}", self.window, self.min_samples),
            ));
        }
        if !(self.tau_secs.is_finite() && self.tau_secs > 0.0) {
            return Err(invalid("tau_secs", format!("{} is not positive", self.tau_secs)));
        }
        if !(self.weight.is_finite() && self.weight >= 0.0) {
            return Err(invalid("weight", format!("{} is negative", self.weight)));
        }
        if !(self.flag_threshold.is_finite() && self.flag_threshold > 0.0) {
            return Err(invalid(
                "flag_threshold",
                format!("{} is not positive", self.flag_threshold),
            ));
        }
        if !(self.punish_threshold.is_finite() && self.punish_threshold >= self.flag_threshold) {
            return Err(invalid(
                "punish_threshold",
                format!("{} is below flag_threshold {}", self.punish_threshold, self.flag_threshold),
            ));
        }
        Ok(())
    }
}

/// Per-key overrides of [`CheckCommon`] as read from TOML.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CommonOverrides {
    /// See [`CheckCommon::enabled`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// See [`CheckCommon::window`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<usize>,
    /// See [`CheckCommon::min_samples`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_samples: Option<usize>,
    /// See [`CheckCommon::tau_secs`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tau_secs: Option<f64>,
    /// See [`CheckCommon::weight`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    /// See [`CheckCommon::flag_threshold`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag_threshold: Option<f64>,
    /// See [`CheckCommon::punish_threshold`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub punish_threshold: Option<f64>,
    /// See [`CheckCommon::cooldown_ms`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_ms: Option<u64>,
}

impl CommonOverrides {
    /// Applies the overrides on top of `base`.
    #[must_use]
    pub fn apply(&self, base: CheckCommon) -> CheckCommon {
        CheckCommon {
            enabled: self.enabled.unwrap_or(base.enabled),
            window: self.window.unwrap_or(base.window),
            min_samples: self.min_samples.unwrap_or(base.min_samples),
            tau_secs: self.tau_secs.unwrap_or(base.tau_secs),
            weight: self.weight.unwrap_or(base.weight),
            flag_threshold: self.flag_threshold.unwrap_or(base.flag_threshold),
            punish_threshold: self.punish_threshold.unwrap_or(base.punish_threshold),
            cooldown_ms: self.cooldown_ms.unwrap_or(base.cooldown_ms),
        }
    }
}

/// Movement speed check.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    /// Shared settings.
    #[serde(flatten)]
    pub overrides: CommonOverrides,
    /// Horizontal speed cap (blocks/s).
    pub max_speed: f64,
    /// Fraction above the cap still treated as legitimate.
    pub tolerance: f64,
    /// Mean/cap ratio at which confidence saturates.
    pub saturation_ratio: f64,
    /// z-score of a single sample that counts as a spike.
    pub spike_z: f64,
}

impl SpeedConfig {
    /// Built-in shared settings.
    pub const BASE: CheckCommon = CheckCommon {
        enabled: true,
        window: 20,
        min_samples: 8,
        tau_secs: 20.0,
        weight: 1.0,
        flag_threshold: 4.0,
        punish_threshold: 12.0,
        cooldown_ms: 30_000,
    };
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            overrides: CommonOverrides::default(),
            max_speed: 7.2,        // sprint-jump with a little headroom
            tolerance: 0.1,
            saturation_ratio: 2.0, // twice the cap is certain
            spike_z: 4.0,
        }
    }
}

/// Packet timer check.
///
/// Works in units of ticks: each movement sample earns one tick and costs
/// its interval divided by the nominal tick. A client running its clock
/// fast gains ticks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Shared settings.
    #[serde(flatten)]
    pub overrides: CommonOverrides,
    /// Drift tolerated per sample (ticks).
    pub cusum_k: f64,
    /// Ticks gained before the check fires.
    pub cusum_h: f64,
    /// Ticks of lag a player may bank against a later burst.
    pub max_credit_ticks: f64,
    /// Intervals are clamped to this (ms).
    pub max_interval_ms: f64,
    /// Clock rate (nominal / observed interval) at which confidence saturates.
    pub saturation_rate: f64,
}

impl TimerConfig {
    /// Built-in shared settings.
    pub const BASE: CheckCommon = CheckCommon {
        enabled: true,
        window: 20,
        min_samples: 10,
        tau_secs: 30.0,
        weight: 1.0,
        flag_threshold: 3.0,
        punish_threshold: 8.0,
        cooldown_ms: 30_000,
    };
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            overrides: CommonOverrides::default(),
            cusum_k: 0.0,
            cusum_h: 5.0,           // 250 ms ahead of the server clock
            max_credit_ticks: 20.0, // one second of lag
            max_interval_ms: 1_000.0,
            saturation_rate: 1.2,
        }
    }
}

/// Combat reach check.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReachConfig {
    /// Shared settings.
    #[serde(flatten)]
    pub overrides: CommonOverrides,
    /// Reach without latency compensation (blocks).
    pub base_reach: f64,
    /// RTT that earns one block of compensation (ms).
    pub latency_divisor_ms: f64,
    /// Cap on latency compensation (blocks).
    pub max_latency_bonus: f64,
    /// Fixed tolerance (blocks).
    pub tolerance: f64,
    /// Mean excess at which confidence saturates (blocks).
    pub saturation_excess: f64,
}

impl ReachConfig {
    /// Built-in shared settings.
    pub const BASE: CheckCommon = CheckCommon {
        enabled: true,
        window: 10,
        min_samples: 5,
        tau_secs: 30.0,
        weight: 1.0,
        flag_threshold: 3.0,
        punish_threshold: 8.0,
        cooldown_ms: 30_000,
    };

    /// Reach allowed at the given round-trip time.
    #[must_use]
    pub fn allowed_reach(&self, rtt_ms: f64) -> f64 {
        let bonus = if self.latency_divisor_ms > 0.0 {
            (rtt_ms.max(0.0) / self.latency_divisor_ms).clamp(0.0, self.max_latency_bonus)
        } else {
            0.0
        };
        self.base_reach + bonus + self.tolerance
    }
}

impl Default for ReachConfig {
    fn default() -> Self {
        Self {
            overrides: CommonOverrides::default(),
            base_reach: 3.0,
            latency_divisor_ms: 200.0,
            max_latency_bonus: 0.6,
            tolerance: 0.2,
            saturation_excess: 0.5,
        }
    }
}

/// Rotation (aim) check.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Shared settings.
    #[serde(flatten)]
    pub overrides: CommonOverrides,
    /// Rotation per sample (degrees) that counts as a snap.
    pub snap_floor_deg: f64,
    /// Snap rate a human can sustain.
    pub max_snap_rate: f64,
    /// Pair-GCDs closer than this (degrees) are the same divisor.
    pub gcd_tolerance: f64,
    /// GCD consistency above which rotation looks synthetic.
    pub gcd_consistency: f64,
    /// Yaw standard deviation (degrees) below which motion counts as smooth.
    pub jitter_ceiling: f64,
}

impl RotationConfig {
    /// Built-in shared settings.
    pub const BASE: CheckCommon = CheckCommon {
        enabled: true,
        window: 40,
        min_samples: 40,
        tau_secs: 30.0,
        weight: 0.5,
        flag_threshold: 5.0,
        punish_threshold: 15.0,
        cooldown_ms: 60_000,
    };
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            overrides: CommonOverrides::default(),
            snap_floor_deg: 60.0, // 1200°/s at 20 Hz
            max_snap_rate: 0.2,
            gcd_tolerance: 0.000_5,
            gcd_consistency: 0.95,
            jitter_ceiling: 1.5,
        }
    }
}

/// Click pattern check.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoClickerConfig {
    /// Shared settings.
    #[serde(flatten)]
    pub overrides: CommonOverrides,
    /// CPS from which interval regularity is judged.
    pub min_cps: f64,
    /// Coefficient of variation below which clicking is too regular.
    pub cv_threshold: f64,
    /// CPS no human sustains.
    pub max_cps: f64,
    /// Longer gaps end a click burst (ms).
    pub max_interval_ms: f64,
}

impl AutoClickerConfig {
    /// Built-in shared settings.
    pub const BASE: CheckCommon = CheckCommon {
        enabled: true,
        window: 20,
        min_samples: 20,
        tau_secs: 15.0,
        weight: 1.0,
        flag_threshold: 4.0,
        punish_threshold: 10.0,
        cooldown_ms: 30_000,
    };
}

impl Default for AutoClickerConfig {
    fn default() -> Self {
        Self {
            overrides: CommonOverrides::default(),
            min_cps: 10.5,
            cv_threshold: 0.055,
            max_cps: 20.0,
            max_interval_ms: 1_000.0,
        }
    }
}

/// Block place/use rate check.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FastPlaceConfig {
    /// Shared settings.
    #[serde(flatten)]
    pub overrides: CommonOverrides,
    /// Hard floor on the interval between interactions (ms).
    pub min_interval_ms: f64,
    /// Intervals are clamped to this (ms).
    pub max_interval_ms: f64,
}

impl FastPlaceConfig {
    /// Built-in shared settings.
    pub const BASE: CheckCommon = CheckCommon {
        enabled: true,
        window: 10,
        min_samples: 10,
        tau_secs: 15.0,
        weight: 1.0,
        flag_threshold: 4.0,
        punish_threshold: 10.0,
        cooldown_ms: 30_000,
    };
}

impl Default for FastPlaceConfig {
    fn default() -> Self {
        Self {
            overrides: CommonOverrides::default(),
            min_interval_ms: 60.0,
            max_interval_ms: 2_000.0,
        }
    }
}

/// All check settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksConfig {
    /// `speed`
    pub speed: SpeedConfig,
    /// `timer`
    pub timer: TimerConfig,
    /// `reach`
    pub reach: ReachConfig,
    /// `rotation`
    pub rotation: RotationConfig,
    /// `autoclicker`
    pub autoclicker: AutoClickerConfig,
    /// `fast_place`
    pub fast_place: FastPlaceConfig,
    /// Host-supplied checks, keyed by check id, over [`CheckCommon::default`].
    pub custom: BTreeMap<String, CommonOverrides>,
}

/// Ledger settings shared by every check.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Levels below this count as zero.
    pub epsilon: f64,
    /// Time without evidence before a record may return to Clean (ms).
    pub grace_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.05,
            grace_ms: 10_000,
        }
    }
}

/// Normalizer bounds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Interval assumed for a player's first movement sample (ms).
    pub nominal_tick_ms: u64,
    /// Lower clamp on the velocity time base (ms).
    pub min_dt_ms: u64,
    /// Upper clamp on the velocity time base (ms).
    pub max_dt_ms: u64,
    /// Largest accepted position delta per sample (blocks).
    pub max_move_delta: f64,
    /// Largest accepted yaw/pitch delta per sample (degrees).
    pub max_rotation_delta: f64,
    /// Largest accepted attack distance (blocks).
    pub max_attack_distance: f64,
    /// Largest accepted round-trip time (ms).
    pub max_rtt_ms: f64,
    /// Largest accepted absolute block coordinate.
    pub max_coordinate: f64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            nominal_tick_ms: vigil_shared::NOMINAL_TICK_MS,
            min_dt_ms: 25,
            max_dt_ms: 1_000,
            max_move_delta: 64.0, // hosts filter teleports before this
            max_rotation_delta: 720.0,
            max_attack_distance: 32.0,
            max_rtt_ms: 30_000.0,
            max_coordinate: 30_000_000.0, // world border
        }
    }
}

/// Largest replay bound accepted. Keeps a verdict's audit record well under
/// the audit log's frame limit.
pub const MAX_REPLAY_BYTES: usize = 256 * 1024;

/// Per-session replay capture.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Bytes of recent events kept per session, charged at wire size.
    /// Zero turns capture off.
    pub max_bytes: usize,
    /// How far back a verdict's attached replay reaches (ms).
    pub verdict_window_ms: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            max_bytes: 16 * 1024, // ~220 events
            verdict_window_ms: 10_000,
        }
    }
}

/// Complete detection snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Ledger settings.
    pub ledger: LedgerConfig,
    /// Normalizer bounds.
    pub normalizer: NormalizerConfig,
    /// Replay capture.
    pub replay: ReplayConfig,
    /// Per-check settings.
    pub checks: ChecksConfig,
}

impl DetectionConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Resolved shared settings for a check.
    ///
    /// Unknown ids fall back to `checks.custom.<id>` over
    /// [`CheckCommon::default`].
    #[must_use]
    pub fn common(&self, check: CheckId) -> CheckCommon {
        let checks = &self.checks;
        match check {
            CheckId::SPEED => checks.speed.overrides.apply(SpeedConfig::BASE),
            CheckId::TIMER => checks.timer.overrides.apply(TimerConfig::BASE),
            CheckId::REACH => checks.reach.overrides.apply(ReachConfig::BASE),
            CheckId::ROTATION => checks.rotation.overrides.apply(RotationConfig::BASE),
            CheckId::AUTOCLICKER => checks.autoclicker.overrides.apply(AutoClickerConfig::BASE),
            CheckId::FAST_PLACE => checks.fast_place.overrides.apply(FastPlaceConfig::BASE),
            other => checks
                .custom
                .get(other.as_str())
                .map_or_else(CheckCommon::default, |o| o.apply(CheckCommon::default())),
        }
    }

    /// Ledger parameters for a check.
    #[must_use]
    pub fn ledger_params(&self, check: CheckId) -> LedgerParams {
        self.params_for(&self.common(check))
    }

    /// Shortest store expiry that keeps a punish-level entry alive until it
    /// would have decayed to Clean locally, over every configured check
    /// (and the defaults an unconfigured host check gets).
    #[must_use]
    pub fn min_cluster_ttl_ms(&self) -> u64 {
        let configured = CheckId::BUILTIN.into_iter().map(|id| self.common(id));
        let custom = self
            .checks
            .custom
            .values()
            .map(|overrides| overrides.apply(CheckCommon::default()));
        configured
            .chain(custom)
            .chain(std::iter::once(CheckCommon::default()))
            .map(|common| self.params_for(&common).decay_to_clean_ms(common.punish_threshold))
            .max()
            .unwrap_or(0)
    }

    fn params_for(&self, common: &CheckCommon) -> LedgerParams {
        LedgerParams {
            tau_secs: common.tau_secs,
            weight: common.weight,
            flag_threshold: common.flag_threshold,
            punish_threshold: common.punish_threshold,
            cooldown_ms: common.cooldown_ms,
            epsilon: self.ledger.epsilon,
            grace_ms: self.ledger.grace_ms,
        }
    }

    /// Checks every value range.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError::Invalid`] found.
    pub fn validate(&self) -> ConfigResult<()> {
        for id in CheckId::BUILTIN {
            self.common(id).validate(id.as_str())?;
        }
        for (name, overrides) in &self.checks.custom {
            overrides.apply(CheckCommon::default()).validate(name)?;
        }

        if !(self.ledger.epsilon.is_finite() && self.ledger.epsilon > 0.0) {
            return Err(ConfigError::Invalid {
                field: "ledger.epsilon".into(),
                reason: format!("{} is not positive", self.ledger.epsilon),
            });
        }

        let n = &self.normalizer;
        if n.nominal_tick_ms == 0 || n.min_dt_ms == 0 || n.min_dt_ms > n.max_dt_ms {
            return Err(ConfigError::Invalid {
                field: "normalizer".into(),
                reason: format!(
                    "need 0 < min_dt_ms <= max_dt_ms and nominal_tick_ms > 0 (got {}, {}, {})",
                    n.min_dt_ms, n.max_dt_ms, n.nominal_tick_ms
                ),
            });
        }

        if self.replay.max_bytes > MAX_REPLAY_BYTES {
            return Err(ConfigError::Invalid {
                field: "replay.max_bytes".into(),
                reason: format!("{} exceeds {MAX_REPLAY_BYTES}", self.replay.max_bytes),
            });
        }

        let speed = &self.checks.speed;
        if !(speed.max_speed > 0.0 && speed.saturation_ratio > 1.0 + speed.tolerance) {
            return Err(ConfigError::Invalid {
                field: "checks.speed".into(),
                reason: "need max_speed > 0 and saturation_ratio > 1 + tolerance".into(),
            });
        }
        let timer = &self.checks.timer;
        if !(timer.cusum_h > 0.0
            && timer.cusum_k >= 0.0
            && timer.max_credit_ticks >= 0.0
            && timer.saturation_rate > 1.0)
        {
            return Err(ConfigError::Invalid {
                field: "checks.timer".into(),
                reason: "need cusum_h > 0, cusum_k >= 0, max_credit_ticks >= 0, saturation_rate > 1".into(),
            });
        }
        if !(self.checks.reach.saturation_excess > 0.0) {
            return Err(ConfigError::Invalid {
                field: "checks.reach.saturation_excess".into(),
                reason: "must be positive".into(),
            });
        }
        let rotation = &self.checks.rotation;
        if !(rotation.max_snap_rate < 1.0 && rotation.gcd_consistency < 1.0) {
            return Err(ConfigError::Invalid {
                field: "checks.rotation".into(),
                reason: "max_snap_rate and gcd_consistency must be below 1".into(),
            });
        }
        Ok(())
    }
}

/// Shared, atomically replaceable configuration.
///
/// Readers take an `Arc` snapshot per event and keep using it even if a
/// reload lands mid-event.
#[derive(Debug)]
pub struct ConfigHandle {
    current: RwLock<Arc<DetectionConfig>>,
    generation: AtomicU64,
}

impl ConfigHandle {
    /// Creates a handle after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if validation fails.
    pub fn new(config: DetectionConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(config)),
            generation: AtomicU64::new(0),
        })
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<DetectionConfig> {
        Arc::clone(&self.current.read())
    }

    /// Validates and installs a new snapshot, returning the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`]; the current snapshot stays active.
    pub fn swap(&self, config: DetectionConfig) -> ConfigResult<Arc<DetectionConfig>> {
        config.validate()?;
        let previous = std::mem::replace(&mut *self.current.write(), Arc::new(config));
        self.generation.fetch_add(1, Ordering::Release);
        tracing::info!(generation = self.generation(), "detection config swapped");
        Ok(previous)
    }

    /// Number of successful swaps.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}
