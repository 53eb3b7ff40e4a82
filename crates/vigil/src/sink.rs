//! Verdict sinks provided with the engine.
//!
//! Hosts usually implement [`VerdictSink`] themselves. [`ChannelSink`]
//! covers the common case of handling verdicts on another thread (a
//! punishment queue or an alert relay), in the same non-blocking style as
//! the engine's event bus.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use vigil_shared::{Verdict, VerdictSink};

/// Which threshold a delivered verdict crossed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VerdictKind {
    /// Report threshold (T1).
    Flagged,
    /// Punish threshold (T2).
    Punish,
}

/// Verdict as delivered through a [`ChannelSink`].
#[derive(Clone, Debug, PartialEq)]
pub struct VerdictMessage {
    /// Threshold crossed.
    pub kind: VerdictKind,
    /// The verdict.
    pub verdict: Verdict,
}

/// Sink that forwards verdicts into a bounded channel.
///
/// Never blocks: when the channel is full the verdict is dropped and
/// counted.
#[derive(Debug)]
pub struct ChannelSink {
    sender: Sender<VerdictMessage>,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Creates a sink and the receiver the host drains.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, Receiver<VerdictMessage>) {
        let (sender, receiver) = bounded(capacity);
        (
            Self {
                sender,
                dropped: AtomicU64::new(0),
            },
            receiver,
        )
    }

    /// Verdicts dropped because the channel was full or closed.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn send(&self, kind: VerdictKind, verdict: &Verdict) {
        let message = VerdictMessage {
            kind,
            verdict: verdict.clone(),
        };
        match self.sender.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(player = %verdict.player, check = %verdict.check, "verdict channel full, dropping");
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl VerdictSink for ChannelSink {
    fn verdict(&self, verdict: &Verdict) {
        self.send(VerdictKind::Punish, verdict);
    }

    fn flagged(&self, report: &Verdict) {
        self.send(VerdictKind::Flagged, report);
    }
}
