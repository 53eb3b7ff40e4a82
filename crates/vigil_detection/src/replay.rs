//! Per-player replay capture.
//!
//! Keeps the most recent events of a session so a verdict (and its audit
//! record) can show what the player actually sent, not only the numbers of
//! the last score. The buffer is bounded by bytes: each event is charged its
//! wire size, and the oldest events go first.

use std::collections::VecDeque;
use vigil_shared::{Event, Timestamp, RAW_SAMPLE_SIZE};

/// Bytes charged per captured event.
pub const EVENT_CHARGE: usize = RAW_SAMPLE_SIZE;

/// Byte-bounded ring of recent events, oldest first.
#[derive(Debug, Default, Clone)]
pub struct ReplayBuffer {
    events: VecDeque<Event>,
    bytes: usize,
}

impl ReplayBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `event`, then evicts from the front until the buffer fits
    /// `max_bytes`. A bound of zero disables capture.
    pub fn record(&mut self, event: &Event, max_bytes: usize) {
        if max_bytes < EVENT_CHARGE {
            self.clear();
            return;
        }
        self.events.push_back(event.clone());
        self.bytes += EVENT_CHARGE;
        while self.bytes > max_bytes {
            if self.events.pop_front().is_none() {
                self.bytes = 0;
                break;
            }
            self.bytes -= EVENT_CHARGE;
        }
    }

    /// Every captured event, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Event> {
        self.events.iter().cloned().collect()
    }

    /// Captured events at or after `cutoff`, oldest first.
    #[must_use]
    pub fn since(&self, cutoff: Timestamp) -> Vec<Event> {
        self.events
            .iter()
            .filter(|event| event.timestamp() >= cutoff)
            .cloned()
            .collect()
    }

    /// Drops everything.
    pub fn clear(&mut self) {
        self.events.clear();
        self.bytes = 0;
    }

    /// Captured events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True if nothing is captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Bytes charged for what is captured.
    #[must_use]
    pub const fn bytes(&self) -> usize {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_shared::PlayerId;

    fn swing(t: u64) -> Event {
        Event::swing(PlayerId(1), Timestamp(t))
    }

    #[test]
    fn test_bounded_by_bytes_oldest_evicted() {
        let mut replay = ReplayBuffer::new();
        let max_bytes = EVENT_CHARGE * 4 + EVENT_CHARGE / 2;
        for t in 0..10 {
            replay.record(&swing(t), max_bytes);
            assert!(replay.bytes() <= max_bytes);
        }
        assert_eq!(replay.len(), 4);
        let times: Vec<u64> = replay.snapshot().iter().map(|e| e.timestamp().as_millis()).collect();
        assert_eq!(times, vec![6, 7, 8, 9]);
    }

    #[test]
    fn test_shrinking_bound_applies_on_next_record() {
        let mut replay = ReplayBuffer::new();
        for t in 0..8 {
            replay.record(&swing(t), EVENT_CHARGE * 8);
        }
        replay.record(&swing(8), EVENT_CHARGE * 2);
        assert_eq!(replay.len(), 2);
        assert_eq!(replay.snapshot()[0].timestamp(), Timestamp(7));

        replay.record(&swing(9), 0);
        assert!(replay.is_empty());
        assert_eq!(replay.bytes(), 0);
    }

    #[test]
    fn test_since_filters_by_time() {
        let mut replay = ReplayBuffer::new();
        for t in [100, 200, 300, 400] {
            replay.record(&swing(t), EVENT_CHARGE * 16);
        }
        let recent: Vec<Timestamp> = replay.since(Timestamp(250)).iter().map(Event::timestamp).collect();
        assert_eq!(recent, vec![Timestamp(300), Timestamp(400)]);
        assert_eq!(replay.since(Timestamp(0)), replay.snapshot());
    }
}
