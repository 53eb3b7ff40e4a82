//! # Cluster Synchronizer
//!
//! Moves violation levels between the local ledger and the shared store
//! without ever putting the store on the event path.
//!
//! ```text
//!  event path                     writer thread                 store
//!  ──────────                     ─────────────                 ─────
//!  publish(key, entry) ──► PendingQueue ──► get ► merge ► CAS ──► key
//!     (never blocks)       coalesce per key        │
//!                          evict oldest key        └─ fail: backoff, requeue
//!
//!  fetch(key) ──► fetch queue ──► fetch thread ──► get ──► reply
//!     └──────── recv_timeout ◄──────────────────────────────┘
//!               (timeout => None, caller stays local-only)
//! ```
//!
//! A key waits in the queue at most once: a second publish merges into the
//! waiting entry under last-writer-wins, so nothing is lost by coalescing.

use crate::config::SyncConfig;
use crate::entry::{merge, ClusterEntry, ClusterKey};
use crate::error::{StoreError, StoreResult, SyncError};
use crate::store::ClusterStore;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::cmp::Ordering as Precedence;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Synchronizer counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Publishes accepted.
    pub queued: u64,
    /// Publishes merged into a waiting entry for the same key.
    pub coalesced: u64,
    /// Waiting keys dropped because the queue was full.
    pub evicted: u64,
    /// Entries written to the store.
    pub published: u64,
    /// Entries not written because the store already held a newer value.
    pub superseded: u64,
    /// Failed write attempts.
    pub failures: u64,
    /// Entries scheduled for another attempt.
    pub retries: u64,
    /// Entries given up on.
    pub abandoned: u64,
    /// Lost compare-and-set rounds.
    pub cas_conflicts: u64,
    /// Fetch calls.
    pub fetches: u64,
    /// Fetched keys that held an entry.
    pub fetch_hits: u64,
    /// Fetches that ran past the deadline.
    pub fetch_timeouts: u64,
    /// Fetches the store answered with an error.
    pub fetch_errors: u64,
    /// Fetches refused because the fetch queue was full.
    pub fetch_rejected: u64,
}

#[derive(Debug)]
struct Pending {
    entry: ClusterEntry,
    ttl: Duration,
    attempts: u32,
    not_before: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Offer {
    Queued,
    Coalesced,
    Evicted,
}

/// Waiting writes, one per key, oldest first.
#[derive(Debug, Default)]
struct PendingQueue {
    order: VecDeque<String>,
    pending: HashMap<String, Pending>,
}

impl PendingQueue {
    fn len(&self) -> usize {
        self.pending.len()
    }

    fn offer(&mut self, name: String, entry: ClusterEntry, ttl: Duration, capacity: usize) -> Offer {
        if let Some(waiting) = self.pending.get_mut(&name) {
            waiting.entry = merge(waiting.entry, entry);
            waiting.ttl = waiting.ttl.max(ttl);
            return Offer::Coalesced;
        }
        let mut offer = Offer::Queued;
        while self.pending.len() >= capacity {
            let Some(oldest) = self.order.pop_front() else { break };
            if self.pending.remove(&oldest).is_some() {
                offer = Offer::Evicted;
            }
        }
        self.pending.insert(
            name.clone(),
            Pending {
                entry,
                ttl,
                attempts: 0,
                not_before: Instant::now(),
            },
        );
        self.order.push_back(name);
        offer
    }

    /// Puts a failed write back. A newer publish for the same key absorbs it.
    fn requeue(&mut self, name: String, failed: Pending, capacity: usize) -> bool {
        if let Some(waiting) = self.pending.get_mut(&name) {
            waiting.entry = merge(waiting.entry, failed.entry);
            waiting.ttl = waiting.ttl.max(failed.ttl);
            return true;
        }
        if self.pending.len() >= capacity {
            return false;
        }
        self.pending.insert(name.clone(), failed);
        self.order.push_back(name);
        true
    }

    fn take_ready(&mut self, now: Instant, max: usize, ignore_backoff: bool) -> Vec<(String, Pending)> {
        let mut ready = Vec::new();
        let mut waiting = VecDeque::with_capacity(self.order.len());
        while let Some(name) = self.order.pop_front() {
            let due = ready.len() < max
                && self
                    .pending
                    .get(&name)
                    .is_some_and(|p| ignore_backoff || p.not_before <= now);
            if due {
                if let Some(pending) = self.pending.remove(&name) {
                    ready.push((name, pending));
                }
            } else if self.pending.contains_key(&name) {
                waiting.push_back(name);
            }
        }
        self.order = waiting;
        ready
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.not_before).min()
    }
}

enum WriteOutcome {
    Written,
    Superseded,
}

type FetchReply = StoreResult<Vec<Option<ClusterEntry>>>;

struct FetchRequest {
    keys: Vec<String>,
    reply: Sender<FetchReply>,
}

struct Shared {
    store: Arc<dyn ClusterStore>,
    config: SyncConfig,
    queue: Mutex<PendingQueue>,
    wakeup: Condvar,
    in_flight: AtomicUsize,
    shutdown: AtomicBool,
    stats: Mutex<SyncStats>,
}

impl Shared {
    fn writer_loop(&self) {
        let idle = Duration::from_millis(self.config.idle_wait_ms);
        loop {
            let (batch, final_pass) = {
                let mut queue = self.queue.lock();
                loop {
                    if self.shutdown.load(Ordering::SeqCst) {
                        let everything = queue.len();
                        break (queue.take_ready(Instant::now(), everything, true), true);
                    }
                    let now = Instant::now();
                    let batch = queue.take_ready(now, self.config.batch_size, false);
                    if !batch.is_empty() {
                        self.in_flight.fetch_add(batch.len(), Ordering::SeqCst);
                        break (batch, false);
                    }
                    let wait = queue
                        .next_deadline()
                        .map_or(idle, |deadline| deadline.saturating_duration_since(now).min(idle));
                    self.wakeup.wait_for(&mut queue, wait);
                }
            };

            if final_pass {
                self.drain(batch);
                return;
            }
            for (name, pending) in batch {
                if self.shutdown.load(Ordering::SeqCst) {
                    // Leave the rest to the bounded shutdown drain.
                    self.queue.lock().requeue(name, pending, usize::MAX);
                } else {
                    self.publish_one(name, pending, false);
                }
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    fn drain(&self, batch: Vec<(String, Pending)>) {
        if batch.is_empty() {
            return;
        }
        let deadline = Instant::now() + self.config.shutdown_flush();
        let total = batch.len();
        let mut written = 0;
        for (name, pending) in batch {
            if Instant::now() >= deadline {
                self.stats.lock().abandoned += 1;
                continue;
            }
            self.publish_one(name, pending, true);
            written += 1;
        }
        tracing::info!(total, attempted = written, "cluster sync drained at shutdown");
    }

    fn publish_one(&self, name: String, mut pending: Pending, final_pass: bool) {
        match self.write_merged(&name, pending.entry, pending.ttl) {
            Ok(WriteOutcome::Written) => self.stats.lock().published += 1,
            Ok(WriteOutcome::Superseded) => self.stats.lock().superseded += 1,
            Err(err) => {
                pending.attempts += 1;
                let give_up = final_pass
                    || pending.attempts >= self.config.max_attempts
                    || matches!(err, StoreError::Corrupt { .. });
                if give_up {
                    let mut stats = self.stats.lock();
                    stats.failures += 1;
                    stats.abandoned += 1;
                    drop(stats);
                    tracing::warn!(key = %name, attempts = pending.attempts, error = %err, "abandoning cluster publish");
                    return;
                }
                pending.not_before = Instant::now() + self.config.backoff(pending.attempts);
                tracing::debug!(key = %name, attempts = pending.attempts, error = %err, "cluster publish failed, retrying");
                let requeued = self.queue.lock().requeue(name, pending, self.config.queue_capacity);
                let mut stats = self.stats.lock();
                stats.failures += 1;
                if requeued {
                    stats.retries += 1;
                } else {
                    stats.evicted += 1;
                }
            }
        }
    }

    /// Read, keep the newer value, compare-and-set.
    fn write_merged(&self, name: &str, entry: ClusterEntry, ttl: Duration) -> StoreResult<WriteOutcome> {
        let bytes = entry.encode(name)?;
        for _ in 0..=self.config.cas_retries {
            let current = self.store.get(name)?;
            match current.as_deref().map(|raw| ClusterEntry::decode(name, raw)) {
                Some(Ok(remote)) if remote.precedence(&entry) != Precedence::Less => {
                    return Ok(WriteOutcome::Superseded);
                }
                Some(Err(err)) => tracing::warn!(key = %name, error = %err, "overwriting unreadable cluster entry"),
                _ => {}
            }
            if self.store.compare_and_set(name, current.as_deref(), &bytes, ttl)? {
                return Ok(WriteOutcome::Written);
            }
            self.stats.lock().cas_conflicts += 1;
        }
        Err(StoreError::Conflict {
            key: name.to_owned(),
            attempts: self.config.cas_retries + 1,
        })
    }

    fn read(&self, name: &str) -> StoreResult<Option<ClusterEntry>> {
        let Some(raw) = self.store.get(name)? else {
            return Ok(None);
        };
        match ClusterEntry::decode(name, &raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(err) => {
                tracing::warn!(key = %name, error = %err, "ignoring unreadable cluster entry");
                Ok(None)
            }
        }
    }

    fn fetch_loop(&self, requests: &Receiver<FetchRequest>) {
        for request in requests {
            let result = request.keys.iter().map(|name| self.read(name)).collect();
            // The caller may have timed out and gone.
            let _ = request.reply.send(result);
        }
    }
}

/// Background replication of violation levels.
///
/// [`shutdown`](Self::shutdown) (or dropping the synchronizer) stops both
/// threads after a bounded final drain of waiting writes.
pub struct ClusterSync {
    shared: Arc<Shared>,
    fetch_tx: Mutex<Option<Sender<FetchRequest>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl ClusterSync {
    /// Validates the config and starts the writer and fetch threads.
    ///
    /// # Errors
    ///
    /// Invalid config or a failed thread spawn.
    pub fn start(store: Arc<dyn ClusterStore>, config: SyncConfig) -> Result<Self, SyncError> {
        config.validate()?;
        let (fetch_tx, fetch_rx) = crossbeam_channel::bounded(config.fetch_queue);
        let shared = Arc::new(Shared {
            store,
            config,
            queue: Mutex::new(PendingQueue::default()),
            wakeup: Condvar::new(),
            in_flight: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            stats: Mutex::new(SyncStats::default()),
        });

        let writer_shared = Arc::clone(&shared);
        let writer = thread::Builder::new()
            .name("vigil-sync-writer".into())
            .spawn(move || writer_shared.writer_loop())
            .map_err(|source| SyncError::Spawn { thread: "writer", source })?;

        let fetch_shared = Arc::clone(&shared);
        let fetcher = thread::Builder::new()
            .name("vigil-sync-fetch".into())
            .spawn(move || fetch_shared.fetch_loop(&fetch_rx));
        let fetcher = match fetcher {
            Ok(handle) => handle,
            Err(source) => {
                shared.shutdown.store(true, Ordering::SeqCst);
                shared.wakeup.notify_all();
                let _ = writer.join();
                return Err(SyncError::Spawn { thread: "fetch", source });
            }
        };

        tracing::info!(
            ttl_ms = shared.config.ttl_ms,
            fetch_timeout_ms = shared.config.fetch_timeout_ms,
            "cluster sync started"
        );
        Ok(Self {
            shared,
            fetch_tx: Mutex::new(Some(fetch_tx)),
            threads: Mutex::new(vec![writer, fetcher]),
        })
    }

    /// Queues an entry for writing with the configured expiry. Never blocks
    /// on the store.
    pub fn publish(&self, key: ClusterKey, entry: ClusterEntry) {
        self.publish_with_ttl(key, entry, Duration::ZERO);
    }

    /// Queues an entry that must stay in the store for at least `ttl`. The
    /// configured expiry is the floor.
    pub fn publish_with_ttl(&self, key: ClusterKey, entry: ClusterEntry, ttl: Duration) {
        if !entry.level.is_finite() {
            return;
        }
        let ttl = ttl.max(self.shared.config.ttl());
        let offer = self
            .shared
            .queue
            .lock()
            .offer(key.to_string(), entry, ttl, self.shared.config.queue_capacity);
        self.shared.wakeup.notify_one();

        let mut stats = self.shared.stats.lock();
        stats.queued += 1;
        match offer {
            Offer::Queued => {}
            Offer::Coalesced => stats.coalesced += 1,
            Offer::Evicted => stats.evicted += 1,
        }
    }

    /// Reads one key within the fetch deadline.
    #[must_use]
    pub fn fetch(&self, key: ClusterKey) -> Option<ClusterEntry> {
        self.fetch_many(&[key]).pop().flatten()
    }

    /// Reads several keys in one round trip within the fetch deadline.
    ///
    /// The result has one slot per key. On timeout, store error or a full
    /// fetch queue every slot is `None`.
    #[must_use]
    pub fn fetch_many(&self, keys: &[ClusterKey]) -> Vec<Option<ClusterEntry>> {
        let misses = || vec![None; keys.len()];
        self.shared.stats.lock().fetches += 1;
        let Some(fetch_tx) = self.fetch_tx.lock().clone() else {
            return misses();
        };

        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        let request = FetchRequest {
            keys: keys.iter().map(ToString::to_string).collect(),
            reply: reply_tx,
        };
        if let Err(err) = fetch_tx.try_send(request) {
            self.shared.stats.lock().fetch_rejected += 1;
            if matches!(err, TrySendError::Full(_)) {
                tracing::debug!("cluster fetch queue full");
            }
            return misses();
        }

        match reply_rx.recv_timeout(self.shared.config.fetch_timeout()) {
            Ok(Ok(entries)) => {
                let hits = entries.iter().filter(|e| e.is_some()).count() as u64;
                self.shared.stats.lock().fetch_hits += hits;
                entries
            }
            Ok(Err(err)) => {
                self.shared.stats.lock().fetch_errors += 1;
                tracing::debug!(error = %err, "cluster fetch failed, continuing local-only");
                misses()
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                self.shared.stats.lock().fetch_timeouts += 1;
                tracing::debug!(
                    timeout_ms = self.shared.config.fetch_timeout_ms,
                    "cluster fetch timed out, continuing local-only"
                );
                misses()
            }
        }
    }

    /// Waits until no write is waiting or in flight. Returns `false` if
    /// `timeout` passed first (e.g. entries are in retry backoff).
    pub fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.pending() == 0 && self.shared.in_flight.load(Ordering::SeqCst) == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            self.shared.wakeup.notify_one();
            thread::sleep(Duration::from_millis(2));
        }
    }

    /// Keys waiting to be written.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> SyncStats {
        self.shared.stats.lock().clone()
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    /// Stops the threads. Idempotent.
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let queue = self.shared.queue.lock();
            self.shared.wakeup.notify_all();
            drop(queue);
        }
        drop(self.fetch_tx.lock().take());
        let threads = std::mem::take(&mut *self.threads.lock());
        for handle in threads {
            let _ = handle.join();
        }
        tracing::info!(stats = ?self.stats(), "cluster sync stopped");
    }
}

impl Drop for ClusterSync {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ClusterSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterSync")
            .field("config", &self.shared.config)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryClusterStore;
    use vigil_shared::{CheckId, PlayerId, Timestamp};

    fn key(player: u64) -> ClusterKey {
        ClusterKey::new(CheckId::SPEED, PlayerId(player))
    }

    fn fast_config() -> SyncConfig {
        SyncConfig {
            retry_base_ms: 5,
            retry_max_ms: 20,
            idle_wait_ms: 5,
            ..SyncConfig::default()
        }
    }

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_queue_coalesces_per_key() {
        let mut queue = PendingQueue::default();
        let old = ClusterEntry::new(1.0, Timestamp(100));
        let new = ClusterEntry::new(0.5, Timestamp(200));
        assert_eq!(queue.offer("a".into(), old, TTL, 8), Offer::Queued);
        assert_eq!(queue.offer("a".into(), new, TTL, 8), Offer::Coalesced);
        // An older publish arriving late does not roll the entry back, but
        // its longer expiry is kept.
        assert_eq!(queue.offer("a".into(), old, TTL * 3, 8), Offer::Coalesced);
        assert_eq!(queue.len(), 1);
        let ready = queue.take_ready(Instant::now(), 8, false);
        assert_eq!(ready[0].1.entry, new);
        assert_eq!(ready[0].1.ttl, TTL * 3);
    }

    #[test]
    fn test_queue_evicts_oldest_key() {
        let mut queue = PendingQueue::default();
        let entry = ClusterEntry::new(1.0, Timestamp(1));
        queue.offer("a".into(), entry, TTL, 2);
        queue.offer("b".into(), entry, TTL, 2);
        assert_eq!(queue.offer("c".into(), entry, TTL, 2), Offer::Evicted);
        let names: Vec<String> = queue.take_ready(Instant::now(), 8, false).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b".to_owned(), "c".to_owned()]);
    }

    #[test]
    fn test_queue_respects_backoff() {
        let mut queue = PendingQueue::default();
        let later = Instant::now() + Duration::from_secs(60);
        let failed = Pending {
            entry: ClusterEntry::new(1.0, Timestamp(1)),
            ttl: TTL,
            attempts: 1,
            not_before: later,
        };
        assert!(queue.requeue("a".into(), failed, 8));
        assert!(queue.take_ready(Instant::now(), 8, false).is_empty());
        assert_eq!(queue.next_deadline(), Some(later));
        assert_eq!(queue.take_ready(Instant::now(), 8, true).len(), 1);
    }

    #[test]
    fn test_publish_then_fetch() {
        let store = MemoryClusterStore::new();
        let sync = ClusterSync::start(Arc::new(store.clone()), fast_config()).unwrap();
        let entry = ClusterEntry::new(2.5, Timestamp(1_000));
        sync.publish(key(1), entry);
        assert!(sync.flush(Duration::from_secs(2)));
        assert_eq!(sync.fetch(key(1)), Some(entry));
        assert_eq!(sync.fetch(key(2)), None);
        assert_eq!(sync.stats().published, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_entry_expiry_never_below_requested() {
        let store = MemoryClusterStore::new();
        let config = SyncConfig {
            ttl_ms: 20,
            ..fast_config()
        };
        let sync = ClusterSync::start(Arc::new(store.clone()), config).unwrap();
        sync.publish(key(1), ClusterEntry::new(1.0, Timestamp(10)));
        sync.publish_with_ttl(key(2), ClusterEntry::new(30.0, Timestamp(10)), Duration::from_secs(60));
        assert!(sync.flush(Duration::from_secs(2)));

        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(store.get(&key(1).to_string()).unwrap(), None);
        assert!(store.get(&key(2).to_string()).unwrap().is_some());
    }

    #[test]
    fn test_older_publish_does_not_overwrite() {
        let store = MemoryClusterStore::new();
        let sync = ClusterSync::start(Arc::new(store), fast_config()).unwrap();
        let newer = ClusterEntry::new(0.9, Timestamp(150));
        sync.publish(key(1), newer);
        assert!(sync.flush(Duration::from_secs(2)));
        sync.publish(key(1), ClusterEntry::new(0.4, Timestamp(100)));
        assert!(sync.flush(Duration::from_secs(2)));
        assert_eq!(sync.fetch(key(1)), Some(newer));
        assert_eq!(sync.stats().superseded, 1);
    }

    #[test]
    fn test_fetch_times_out_on_slow_store() {
        let store = MemoryClusterStore::new();
        store.set_latency(Duration::from_millis(200));
        let config = SyncConfig { fetch_timeout_ms: 20, ..fast_config() };
        let sync = ClusterSync::start(Arc::new(store.clone()), config).unwrap();
        let started = Instant::now();
        assert_eq!(sync.fetch_many(&[key(1), key(2)]), vec![None, None]);
        assert!(started.elapsed() < Duration::from_millis(150));
        assert_eq!(sync.stats().fetch_timeouts, 1);
        store.set_latency(Duration::ZERO);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = SyncConfig { queue_capacity: 0, ..SyncConfig::default() };
        let result = ClusterSync::start(Arc::new(MemoryClusterStore::new()), config);
        assert!(matches!(result, Err(SyncError::Config(_))));
    }
}
