//! Player sessions.
//!
//! A session holds one [`CheckState`] per registered check, index-aligned
//! with the coordinator's check list, and a [`ReplayBuffer`] of the
//! player's recent events. The registry guarantees at most one
//! live session per player; each session sits behind its own mutex so
//! players never contend with each other.

use crate::checks::{Check, CheckState};
use crate::config::DetectionConfig;
use crate::replay::ReplayBuffer;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use vigil_shared::{Event, PlayerId, Timestamp};

/// Per-player detection state.
#[derive(Debug)]
pub struct PlayerSession {
    player: PlayerId,
    created_at: Timestamp,
    last_seen: Timestamp,
    events: u64,
    states: Vec<CheckState>,
    replay: ReplayBuffer,
}

impl PlayerSession {
    /// Creates a session with fresh state for every check.
    #[must_use]
    pub fn new(player: PlayerId, now: Timestamp, checks: &[Box<dyn Check>], config: &DetectionConfig) -> Self {
        Self {
            player,
            created_at: now,
            last_seen: now,
            events: 0,
            states: checks.iter().map(|c| c.new_state(config)).collect(),
            replay: ReplayBuffer::new(),
        }
    }

    /// Player.
    #[must_use]
    pub const fn player(&self) -> PlayerId {
        self.player
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Time of the latest event.
    #[must_use]
    pub const fn last_seen(&self) -> Timestamp {
        self.last_seen
    }

    /// Events processed.
    #[must_use]
    pub const fn events(&self) -> u64 {
        self.events
    }

    /// Records activity at `now`.
    pub fn touch(&mut self, now: Timestamp) {
        if now > self.last_seen {
            self.last_seen = now;
        }
        self.events += 1;
    }

    /// Captures `event` for replay within `max_bytes`.
    pub fn capture(&mut self, event: &Event, max_bytes: usize) {
        self.replay.record(event, max_bytes);
    }

    /// Recent events of this session.
    #[must_use]
    pub const fn replay(&self) -> &ReplayBuffer {
        &self.replay
    }

    /// State of the check at `index`.
    pub fn state_mut(&mut self, index: usize) -> Option<&mut CheckState> {
        self.states.get_mut(index)
    }

    /// Replaces a check's state with a fresh one (after that check faulted
    /// mid-update).
    pub fn reset_state(&mut self, index: usize, check: &dyn Check, config: &DetectionConfig) {
        if let Some(slot) = self.states.get_mut(index) {
            *slot = check.new_state(config);
        }
    }

    /// True if no event arrived for `timeout_ms`.
    #[must_use]
    pub const fn is_idle(&self, now: Timestamp, timeout_ms: u64) -> bool {
        now.saturating_since(self.last_seen) >= timeout_ms
    }
}

/// Shared handle to a session.
pub type SessionHandle = Arc<Mutex<PlayerSession>>;

/// Live sessions of one instance.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<PlayerId, SessionHandle>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the player's session, creating it with `create` if absent.
    ///
    /// The flag is `true` if this call created it.
    pub fn get_or_create(&self, player: PlayerId, create: impl FnOnce() -> PlayerSession) -> (SessionHandle, bool) {
        match self.sessions.entry(player) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let handle = Arc::new(Mutex::new(create()));
                entry.insert(Arc::clone(&handle));
                (handle, true)
            }
        }
    }

    /// Existing session.
    #[must_use]
    pub fn get(&self, player: PlayerId) -> Option<SessionHandle> {
        self.sessions.get(&player).map(|s| Arc::clone(s.value()))
    }

    /// Removes and returns a session. In-flight events on other threads
    /// finish against the detached session.
    pub fn remove(&self, player: PlayerId) -> Option<SessionHandle> {
        self.sessions.remove(&player).map(|(_, s)| s)
    }

    /// Removes every session idle for at least `timeout_ms` and returns
    /// their players. Idleness is re-checked under the map lock, so a
    /// session touched after the scan stays.
    pub fn remove_idle(&self, now: Timestamp, timeout_ms: u64) -> Vec<PlayerId> {
        self.idle(now, timeout_ms)
            .into_iter()
            .filter(|player| {
                self.sessions
                    .remove_if(player, |_, session| session.lock().is_idle(now, timeout_ms))
                    .is_some()
            })
            .collect()
    }

    /// Players idle for at least `timeout_ms`.
    #[must_use]
    pub fn idle(&self, now: Timestamp, timeout_ms: u64) -> Vec<PlayerId> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().lock().is_idle(now, timeout_ms))
            .map(|entry| *entry.key())
            .collect()
    }

    /// Live players.
    #[must_use]
    pub fn players(&self) -> Vec<PlayerId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True if no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
