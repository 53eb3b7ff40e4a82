//! # Event Normalizer
//!
//! Turns raw host samples into immutable [`Event`]s. This is the only
//! place malformed input is rejected; nothing behind it re-validates.
//!
//! ```text
//!   bytes ──decode──► RawSample ──normalize──► Event
//!                        │
//!                        ├─ unknown kind code        ─► UnknownKind
//!                        ├─ NaN / ±inf               ─► NonFinite
//!                        ├─ beyond plausibility      ─► Implausible
//!                        └─ older than last sample   ─► TimestampRegression
//! ```
//!
//! Movement velocity is `delta / dt`, where `dt` is the time since the
//! player's previous movement sample clamped to `[min_dt_ms, max_dt_ms]`
//! (the nominal tick for a player's first sample).

use crate::config::NormalizerConfig;
use crate::error::NormalizeError;
use dashmap::DashMap;
use vigil_shared::{
    Action, BlockAction, Event, EventKind, PlayerId, RawSample, Timestamp, Vec3, FLAG_ON_GROUND,
    RAW_SAMPLE_SIZE,
};

#[derive(Clone, Copy, Debug, Default)]
struct PlayerClock {
    last_seen: Timestamp,
    last_movement: Option<Timestamp>,
}

/// Raw sample validator with per-player timing state.
#[derive(Debug, Default)]
pub struct Normalizer {
    clocks: DashMap<PlayerId, PlayerClock>,
}

/// Decodes one wire sample.
///
/// # Errors
///
/// Returns [`NormalizeError::BadLength`] unless `bytes` is exactly one
/// sample long.
pub fn decode(bytes: &[u8]) -> Result<RawSample, NormalizeError> {
    if bytes.len() != RAW_SAMPLE_SIZE {
        return Err(NormalizeError::BadLength {
            len: bytes.len(),
            expected: RAW_SAMPLE_SIZE,
        });
    }
    bytemuck::try_pod_read_unaligned(bytes).map_err(|_| NormalizeError::BadLength {
        len: bytes.len(),
        expected: RAW_SAMPLE_SIZE,
    })
}

fn check_bound(kind: EventKind, field: &'static str, value: f64, limit: f64) -> Result<(), NormalizeError> {
    if value.abs() > limit {
        return Err(NormalizeError::Implausible { kind, field, value, limit });
    }
    Ok(())
}

impl Normalizer {
    /// Creates a normalizer with no players.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `raw` and builds the event.
    ///
    /// Rejected samples leave the player's timing state untouched.
    ///
    /// # Errors
    ///
    /// See the module table.
    pub fn normalize(&self, config: &NormalizerConfig, raw: &RawSample) -> Result<Event, NormalizeError> {
        let kind = u8::try_from(raw.kind)
            .ok()
            .and_then(EventKind::from_u8)
            .ok_or(NormalizeError::UnknownKind(raw.kind))?;
        if raw.values.iter().any(|v| !v.is_finite()) {
            return Err(NormalizeError::NonFinite { kind });
        }

        let player = raw.player();
        let now = raw.timestamp();
        let clock = self.clocks.get(&player).map(|c| *c);
        if let Some(clock) = clock {
            if now < clock.last_seen {
                return Err(NormalizeError::TimestampRegression {
                    player,
                    last: clock.last_seen,
                    got: now,
                });
            }
        }

        let action = match kind {
            EventKind::Movement => {
                let delta = raw.vec3();
                check_bound(kind, "delta", delta.length(), config.max_move_delta)?;
                let dt_ms = clock
                    .and_then(|c| c.last_movement)
                    .map_or(config.nominal_tick_ms, |last| now.saturating_since(last))
                    .clamp(config.min_dt_ms, config.max_dt_ms);
                Action::Movement {
                    delta,
                    velocity: velocity_over(delta, dt_ms),
                    on_ground: raw.flags & FLAG_ON_GROUND != 0,
                }
            }
            EventKind::Rotation => {
                let (yaw_delta, pitch_delta) = (raw.values[0], raw.values[1]);
                check_bound(kind, "yaw_delta", yaw_delta, config.max_rotation_delta)?;
                check_bound(kind, "pitch_delta", pitch_delta, config.max_rotation_delta)?;
                Action::Rotation { yaw_delta, pitch_delta }
            }
            EventKind::Swing => Action::Swing,
            EventKind::Attack => {
                let (distance, rtt_ms) = (raw.values[0], raw.values[1]);
                if distance < 0.0 {
                    return Err(NormalizeError::Implausible {
                        kind,
                        field: "distance",
                        value: distance,
                        limit: 0.0,
                    });
                }
                check_bound(kind, "distance", distance, config.max_attack_distance)?;
                check_bound(kind, "rtt_ms", rtt_ms, config.max_rtt_ms)?;
                Action::Attack { distance, rtt_ms: rtt_ms.max(0.0) }
            }
            EventKind::BlockPlace | EventKind::BlockUse => {
                let position = raw.vec3();
                for (field, value) in [("x", position.x), ("y", position.y), ("z", position.z)] {
                    check_bound(kind, field, value, config.max_coordinate)?;
                }
                let action = if kind == EventKind::BlockPlace {
                    BlockAction::Place
                } else {
                    BlockAction::Use
                };
                Action::Block { action, position }
            }
        };

        let mut entry = self.clocks.entry(player).or_default();
        entry.last_seen = now;
        if kind == EventKind::Movement {
            entry.last_movement = Some(now);
        }
        Ok(Event::new(player, now, action))
    }

    /// Decodes and normalizes one wire sample.
    ///
    /// # Errors
    ///
    /// As [`decode`] and [`normalize`](Self::normalize).
    pub fn normalize_bytes(&self, config: &NormalizerConfig, bytes: &[u8]) -> Result<Event, NormalizeError> {
        self.normalize(config, &decode(bytes)?)
    }

    /// Drops a player's timing state (disconnect).
    pub fn forget(&self, player: PlayerId) {
        self.clocks.remove(&player);
    }

    /// Players with timing state.
    #[must_use]
    pub fn tracked_players(&self) -> usize {
        self.clocks.len()
    }
}

/// Velocity the normalizer would derive for `delta` over `dt_ms`.
#[must_use]
pub fn velocity_over(delta: Vec3, dt_ms: u64) -> Vec3 {
    delta / (dt_ms.max(1) as f64 / 1_000.0)
}
