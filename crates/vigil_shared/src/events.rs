//! Canonical player action events.
//!
//! The host adapter turns whatever its server exposes into these records (or
//! into a [`RawSample`](crate::protocol::RawSample) for the normalizer). Once
//! built an [`Event`] is never mutated: it moves from the normalizer to the
//! coordinator and is only borrowed by checks.

use crate::ids::{PlayerId, Timestamp};
use crate::math::Vec3;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Event kind discriminator, used for check subscriptions.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Position update
    Movement = 0,
    /// Look direction change
    Rotation = 1,
    /// Arm swing / click
    Swing = 2,
    /// Hit on another entity
    Attack = 3,
    /// Block placed
    BlockPlace = 4,
    /// Block or item used
    BlockUse = 5,
}

impl EventKind {
    /// Number of kinds (size of routing tables).
    pub const COUNT: usize = 6;

    /// All kinds in index order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Movement,
        Self::Rotation,
        Self::Swing,
        Self::Attack,
        Self::BlockPlace,
        Self::BlockUse,
    ];

    /// Dense index in `0..COUNT`.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Converts from the wire code.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Movement),
            1 => Some(Self::Rotation),
            2 => Some(Self::Swing),
            3 => Some(Self::Attack),
            4 => Some(Self::BlockPlace),
            5 => Some(Self::BlockUse),
            _ => None,
        }
    }

    /// Lowercase name for logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Movement => "movement",
            Self::Rotation => "rotation",
            Self::Swing => "swing",
            Self::Attack => "attack",
            Self::BlockPlace => "block_place",
            Self::BlockUse => "block_use",
        }
    }
}

/// Block interaction flavour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockAction {
    /// Block placed
    Place,
    /// Block/item used
    Use,
}

/// Event payload.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Player moved.
    Movement {
        /// Position delta since the previous movement sample.
        delta: Vec3,
        /// Velocity in blocks per second.
        velocity: Vec3,
        /// Client claims to be on the ground.
        on_ground: bool,
    },
    /// Player turned.
    Rotation {
        /// Yaw change in degrees.
        yaw_delta: f64,
        /// Pitch change in degrees.
        pitch_delta: f64,
    },
    /// Player swung (clicked).
    Swing,
    /// Player hit an entity.
    Attack {
        /// Eye-to-hitbox distance in blocks.
        distance: f64,
        /// Round-trip time measured by the host, in milliseconds.
        rtt_ms: f64,
    },
    /// Player interacted with a block.
    Block {
        /// Place or use.
        action: BlockAction,
        /// Target block position.
        position: Vec3,
    },
}

impl Action {
    /// Kind of this payload.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Movement { .. } => EventKind::Movement,
            Self::Rotation { .. } => EventKind::Rotation,
            Self::Swing => EventKind::Swing,
            Self::Attack { .. } => EventKind::Attack,
            Self::Block { action: BlockAction::Place, .. } => EventKind::BlockPlace,
            Self::Block { action: BlockAction::Use, .. } => EventKind::BlockUse,
        }
    }
}

/// Immutable normalized event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    player: PlayerId,
    timestamp: Timestamp,
    action: Action,
}

impl Event {
    /// Creates an event.
    #[must_use]
    pub const fn new(player: PlayerId, timestamp: Timestamp, action: Action) -> Self {
        Self { player, timestamp, action }
    }

    /// Movement event.
    #[must_use]
    pub const fn movement(player: PlayerId, timestamp: Timestamp, delta: Vec3, velocity: Vec3) -> Self {
        Self::new(player, timestamp, Action::Movement { delta, velocity, on_ground: true })
    }

    /// Rotation event.
    #[must_use]
    pub const fn rotation(player: PlayerId, timestamp: Timestamp, yaw_delta: f64, pitch_delta: f64) -> Self {
        Self::new(player, timestamp, Action::Rotation { yaw_delta, pitch_delta })
    }

    /// Swing event.
    #[must_use]
    pub const fn swing(player: PlayerId, timestamp: Timestamp) -> Self {
        Self::new(player, timestamp, Action::Swing)
    }

    /// Attack event.
    #[must_use]
    pub const fn attack(player: PlayerId, timestamp: Timestamp, distance: f64, rtt_ms: f64) -> Self {
        Self::new(player, timestamp, Action::Attack { distance, rtt_ms })
    }

    /// Block interaction event.
    #[must_use]
    pub const fn block(player: PlayerId, timestamp: Timestamp, action: BlockAction, position: Vec3) -> Self {
        Self::new(player, timestamp, Action::Block { action, position })
    }

    /// Acting player.
    #[must_use]
    pub const fn player(&self) -> PlayerId {
        self.player
    }

    /// Host timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Payload.
    #[must_use]
    pub const fn action(&self) -> &Action {
        &self.action
    }

    /// Kind of the payload.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.action.kind()
    }
}

/// Numeric evidence attached to a score or verdict.
///
/// Keys are static so building evidence on the hot path only pushes onto a
/// small vector. Serializes as a JSON object.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Evidence {
    entries: Vec<(&'static str, f64)>,
}

impl Evidence {
    /// Empty evidence.
    #[must_use]
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Adds (or replaces) a value, builder style.
    #[must_use]
    pub fn with(mut self, key: &'static str, value: f64) -> Self {
        self.insert(key, value);
        self
    }

    /// Adds (or replaces) a value.
    pub fn insert(&mut self, key: &'static str, value: f64) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Looks up a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.entries.iter().copied()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there is no evidence.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Evidence {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
