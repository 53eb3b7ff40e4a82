//! # Shared Key-Value Store
//!
//! The cluster layer needs three operations from whatever backs it (Redis,
//! etcd, a database row): read, write with expiry, and compare-and-set.
//! Values are opaque bytes; the entry codec lives in [`crate::entry`].
//!
//! [`MemoryClusterStore`] is the in-process implementation used by tests,
//! the simulator and single-host deployments that still run several engine
//! instances. Cloning it shares the underlying map, so two engines holding
//! clones behave like two servers on one store.

use crate::error::{StoreError, StoreResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Backend of the cluster layer.
///
/// Implementations are called from the sync worker threads only, never from
/// the event path, so they may block (within the configured timeouts).
pub trait ClusterStore: Send + Sync {
    /// Reads a value. Expired keys read as `None`.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Writes a value that expires after `ttl`.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()>;

    /// Writes `value` only if the current value equals `expected`
    /// (`None` = key absent or expired). Returns whether the write happened.
    ///
    /// # Errors
    ///
    /// Backend failures.
    fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: &[u8],
        ttl: Duration,
    ) -> StoreResult<bool>;
}

#[derive(Debug)]
struct Stored {
    bytes: Vec<u8>,
    expires_at: Instant,
}

impl Stored {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Default)]
struct Faults {
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
}

/// In-process store with lazy expiry and fault injection.
#[derive(Debug, Clone, Default)]
pub struct MemoryClusterStore {
    entries: Arc<DashMap<String, Stored>>,
    faults: Arc<Faults>,
    operations: Arc<AtomicU64>,
}

impl MemoryClusterStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// While unavailable every operation fails with [`StoreError::Timeout`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Adds a delay to every operation.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.faults.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Operations attempted so far, failed ones included.
    #[must_use]
    pub fn operations(&self) -> u64 {
        self.operations.load(Ordering::Relaxed)
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.is_live(now)).count()
    }

    /// True if no live keys exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn enter(&self) -> StoreResult<()> {
        self.operations.fetch_add(1, Ordering::Relaxed);
        let latency = self.faults.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            thread::sleep(Duration::from_millis(latency));
        }
        if self.faults.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Timeout);
        }
        Ok(())
    }
}

impl ClusterStore for MemoryClusterStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.enter()?;
        let now = Instant::now();
        let live = self
            .entries
            .get(key)
            .map(|stored| stored.is_live(now).then(|| stored.bytes.clone()));
        match live {
            Some(Some(bytes)) => Ok(Some(bytes)),
            Some(None) => {
                self.entries.remove_if(key, |_, stored| !stored.is_live(now));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        self.enter()?;
        self.entries.insert(
            key.to_owned(),
            Stored {
                bytes: value.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: &[u8],
        ttl: Duration,
    ) -> StoreResult<bool> {
        self.enter()?;
        let now = Instant::now();
        let stored = Stored {
            bytes: value.to_vec(),
            expires_at: now + ttl,
        };
        match self.entries.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                let current = current.is_live(now).then_some(current.bytes.as_slice());
                if current != expected {
                    return Ok(false);
                }
                occupied.insert(stored);
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                if expected.is_some() {
                    return Ok(false);
                }
                vacant.insert(stored);
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_get_set() {
        let store = MemoryClusterStore::new();
        assert_eq!(store.get("a"), Ok(None));
        store.set_with_ttl("a", b"1", TTL).unwrap();
        assert_eq!(store.get("a"), Ok(Some(b"1".to_vec())));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_compare_and_set() {
        let store = MemoryClusterStore::new();
        assert_eq!(store.compare_and_set("a", Some(b"x"), b"1", TTL), Ok(false));
        assert_eq!(store.compare_and_set("a", None, b"1", TTL), Ok(true));
        assert_eq!(store.compare_and_set("a", None, b"2", TTL), Ok(false));
        assert_eq!(store.compare_and_set("a", Some(b"1"), b"2", TTL), Ok(true));
        assert_eq!(store.get("a"), Ok(Some(b"2".to_vec())));
    }

    #[test]
    fn test_ttl_expiry() {
        let store = MemoryClusterStore::new();
        store.set_with_ttl("a", b"1", Duration::from_millis(10)).unwrap();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(store.get("a"), Ok(None));
        assert!(store.is_empty());
        // An expired key counts as absent for CAS.
        store.set_with_ttl("b", b"1", Duration::from_millis(10)).unwrap();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(store.compare_and_set("b", None, b"2", TTL), Ok(true));
    }

    #[test]
    fn test_clones_share_state() {
        let a = MemoryClusterStore::new();
        let b = a.clone();
        a.set_with_ttl("k", b"v", TTL).unwrap();
        assert_eq!(b.get("k"), Ok(Some(b"v".to_vec())));
    }

    #[test]
    fn test_unavailable() {
        let store = MemoryClusterStore::new();
        store.set_unavailable(true);
        assert_eq!(store.get("a"), Err(StoreError::Timeout));
        assert_eq!(store.set_with_ttl("a", b"1", TTL), Err(StoreError::Timeout));
        store.set_unavailable(false);
        assert_eq!(store.get("a"), Ok(None));
        assert_eq!(store.operations(), 3);
    }
}
