//! Identifiers and time.
//!
//! Every timestamp in the engine is epoch milliseconds supplied by the host.
//! Instances in one cluster are expected to share a synchronized clock; the
//! last-writer-wins merge depends on it.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Stable player identity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl PlayerId {
    /// Creates a player id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a check.
///
/// Check ids are static names so they can be used in store keys and log
/// fields without allocating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CheckId(pub &'static str);

impl CheckId {
    /// Horizontal movement speed.
    pub const SPEED: Self = Self("speed");
    /// Movement packet cadence (game timer manipulation).
    pub const TIMER: Self = Self("timer");
    /// Combat reach distance.
    pub const REACH: Self = Self("reach");
    /// Rotation consistency and snapping.
    pub const ROTATION: Self = Self("rotation");
    /// Click cadence.
    pub const AUTOCLICKER: Self = Self("autoclicker");
    /// Block place/use cadence.
    pub const FAST_PLACE: Self = Self("fast_place");

    /// The built-in catalogue.
    pub const BUILTIN: [Self; 6] = [
        Self::SPEED,
        Self::TIMER,
        Self::REACH,
        Self::ROTATION,
        Self::AUTOCLICKER,
        Self::FAST_PLACE,
    ];

    /// Returns the name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Serialize for CheckId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

/// Epoch milliseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The epoch.
    pub const ZERO: Self = Self(0);

    /// Creates a timestamp from epoch milliseconds.
    #[must_use]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Returns epoch milliseconds.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self(ms)
    }

    /// Milliseconds elapsed since `earlier`, saturating at zero.
    #[must_use]
    pub const fn saturating_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Seconds elapsed since `earlier`, saturating at zero.
    #[must_use]
    pub fn secs_since(self, earlier: Self) -> f64 {
        self.saturating_since(earlier) as f64 / 1000.0
    }

    /// Returns this timestamp moved forward by `ms`.
    #[must_use]
    pub const fn plus_millis(self, ms: u64) -> Self {
        Self(self.0.saturating_add(ms))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_elapsed_saturates() {
        let a = Timestamp::from_millis(1_000);
        let b = Timestamp::from_millis(1_500);
        assert_eq!(b.saturating_since(a), 500);
        assert_eq!(a.saturating_since(b), 0);
        assert!((b.secs_since(a) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ids_serialize_as_plain_values() {
        let json = serde_json::to_string(&(PlayerId(7), CheckId::SPEED, Timestamp(42))).unwrap();
        assert_eq!(json, r#"[7,"speed",42]"#);
    }
}
