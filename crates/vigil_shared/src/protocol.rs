//! Raw per-tick wire sample.
//!
//! Host adapters that decode packets themselves (or receive them from a
//! packet-interception plugin) can hand the engine this fixed-layout record
//! instead of building [`Event`](crate::events::Event)s. The normalizer
//! validates it and derives velocity.
//!
//! ## Layout (72 bytes, little endian)
//!
//! ```text
//! [8: player id][8: timestamp ms][4: kind][4: flags][6 x 8: values]
//! ```
//!
//! | kind          | values                           | flags            |
//! |---------------|----------------------------------|------------------|
//! | 0 movement    | `[dx, dy, dz, -, -, -]`          | bit 0: on ground |
//! | 1 rotation    | `[yaw delta, pitch delta, ...]`  |                  |
//! | 2 swing       | unused                           |                  |
//! | 3 attack      | `[distance, rtt ms, ...]`        |                  |
//! | 4 block place | `[x, y, z, ...]`                 |                  |
//! | 5 block use   | `[x, y, z, ...]`                 |                  |
//!
//! The `Pod` derive expands to an `unsafe impl`; the layout above has no
//! padding, which is what makes it sound.

#![allow(unsafe_code)]

use crate::events::EventKind;
use crate::ids::{PlayerId, Timestamp};
use crate::math::Vec3;
use bytemuck::{Pod, Zeroable};

/// Movement flag: client claims to be on the ground.
pub const FLAG_ON_GROUND: u32 = 1;

/// Size of one encoded sample.
pub const RAW_SAMPLE_SIZE: usize = std::mem::size_of::<RawSample>();

/// Fixed-layout sample as delivered by the host adapter.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct RawSample {
    /// Player id.
    pub player_id: u64,
    /// Host timestamp (epoch ms).
    pub timestamp_ms: u64,
    /// [`EventKind`] code.
    pub kind: u32,
    /// Kind-specific flags.
    pub flags: u32,
    /// Kind-specific values.
    pub values: [f64; 6],
}

impl RawSample {
    fn with_kind(player: PlayerId, timestamp: Timestamp, kind: EventKind) -> Self {
        Self {
            player_id: player.raw(),
            timestamp_ms: timestamp.as_millis(),
            kind: u32::from(kind as u8),
            ..Self::default()
        }
    }

    /// Movement sample carrying a position delta.
    #[must_use]
    pub fn movement(player: PlayerId, timestamp: Timestamp, delta: Vec3, on_ground: bool) -> Self {
        let mut sample = Self::with_kind(player, timestamp, EventKind::Movement);
        sample.values[..3].copy_from_slice(&delta.to_array());
        if on_ground {
            sample.flags |= FLAG_ON_GROUND;
        }
        sample
    }

    /// Rotation sample.
    #[must_use]
    pub fn rotation(player: PlayerId, timestamp: Timestamp, yaw_delta: f64, pitch_delta: f64) -> Self {
        let mut sample = Self::with_kind(player, timestamp, EventKind::Rotation);
        sample.values[0] = yaw_delta;
        sample.values[1] = pitch_delta;
        sample
    }

    /// Swing sample.
    #[must_use]
    pub fn swing(player: PlayerId, timestamp: Timestamp) -> Self {
        Self::with_kind(player, timestamp, EventKind::Swing)
    }

    /// Attack sample.
    #[must_use]
    pub fn attack(player: PlayerId, timestamp: Timestamp, distance: f64, rtt_ms: f64) -> Self {
        let mut sample = Self::with_kind(player, timestamp, EventKind::Attack);
        sample.values[0] = distance;
        sample.values[1] = rtt_ms;
        sample
    }

    /// Block place/use sample.
    #[must_use]
    pub fn block(player: PlayerId, timestamp: Timestamp, kind: EventKind, position: Vec3) -> Self {
        let mut sample = Self::with_kind(player, timestamp, kind);
        sample.values[..3].copy_from_slice(&position.to_array());
        sample
    }

    /// Player id.
    #[must_use]
    pub const fn player(&self) -> PlayerId {
        PlayerId(self.player_id)
    }

    /// Timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> Timestamp {
        Timestamp(self.timestamp_ms)
    }

    /// First three values as a vector.
    #[must_use]
    pub fn vec3(&self) -> Vec3 {
        Vec3::new(self.values[0], self.values[1], self.values[2])
    }

    /// Encodes to wire bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        bytemuck::bytes_of(self).to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_has_no_padding() {
        assert_eq!(RAW_SAMPLE_SIZE, 72);
    }

    #[test]
    fn test_movement_sample_sets_flag_and_delta() {
        let sample = RawSample::movement(PlayerId(9), Timestamp(100), Vec3::new(0.1, 0.0, 0.2), true);
        assert_eq!(sample.kind, 0);
        assert_eq!(sample.flags & FLAG_ON_GROUND, FLAG_ON_GROUND);
        assert_eq!(sample.vec3(), Vec3::new(0.1, 0.0, 0.2));

        let bytes = sample.to_bytes();
        let back: RawSample = bytemuck::pod_read_unaligned(&bytes);
        assert_eq!(back, sample);
    }
}
