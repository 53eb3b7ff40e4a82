//! Property tests for the last-writer-wins merge.

use proptest::prelude::*;
use vigil_cluster::{merge, ClusterEntry};
use vigil_shared::Timestamp;

fn entry() -> impl Strategy<Value = ClusterEntry> {
    // Small domains so ties on timestamp and level actually happen.
    (0u64..5, 0u8..4, proptest::option::of(0u64..5)).prop_map(|(ts, level, until)| ClusterEntry {
        level: f64::from(level) * 0.5,
        timestamp: Timestamp(ts * 100),
        suppressed_until: until.map(|u| Timestamp(u * 1_000)),
    })
}

proptest! {
    #[test]
    fn test_merge_commutative(a in entry(), b in entry()) {
        prop_assert_eq!(merge(a, b), merge(b, a));
    }

    #[test]
    fn test_merge_associative(a in entry(), b in entry(), c in entry()) {
        prop_assert_eq!(merge(merge(a, b), c), merge(a, merge(b, c)));
    }

    #[test]
    fn test_merge_idempotent(a in entry(), b in entry()) {
        prop_assert_eq!(merge(a, a), a);
        let ab = merge(a, b);
        prop_assert_eq!(merge(ab, b), ab);
    }

    #[test]
    fn test_merge_keeps_latest_timestamp(a in entry(), b in entry()) {
        let merged = merge(a, b);
        prop_assert_eq!(merged.timestamp, a.timestamp.max(b.timestamp));
    }

    #[test]
    fn test_any_order_converges(entries in proptest::collection::vec(entry(), 1..8)) {
        let forward = entries.iter().copied().reduce(merge);
        let backward = entries.iter().rev().copied().reduce(merge);
        prop_assert_eq!(forward, backward);
    }
}
