//! Property tests for the store's quantified invariants: admission
//! monotonicity, counter resurrection, cooldown monotonicity, and
//! atomicity under concurrent contention.

use std::sync::Arc;

use proptest::prelude::*;
use quota_governor::store::{InMemoryStore, Store, TwoWindowKeys, WindowSpec};

fn rt() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap()
}

proptest! {
    /// For any limit and any number of admission attempts, at most `limit`
    /// ever succeed within the window.
    #[test]
    fn admission_monotonicity(limit in 1u32..50, attempts in 0u32..100) {
        let store = InMemoryStore::new();
        let spec = WindowSpec { limit, window_secs: 3600 };
        let keys = TwoWindowKeys { seconds_key: "s", minutes_key: "m", block_key: "b" };

        let rt = rt();
        let allowed_count = rt.block_on(async {
            let mut allowed = 0u32;
            for _ in 0..attempts {
                let decision = store.two_window_admit(keys, Some(spec), None).await.unwrap();
                if decision.allowed {
                    allowed += 1;
                }
            }
            allowed
        });

        prop_assert!(allowed_count <= limit);
    }

    /// Once a cooldown marker is absorbed with `new_retry_after`, it is
    /// never weakened by a smaller subsequent absorb.
    #[test]
    fn cooldown_monotonicity(first in 1u64..100, second in 1u64..100) {
        let store = InMemoryStore::new();
        let rt = rt();
        let (first_effective, second_effective) = rt.block_on(async {
            let a = store.absorb_monotonic("b", first).await.unwrap();
            let b = store.absorb_monotonic("b", second).await.unwrap();
            (a.effective_retry_after, b.effective_retry_after)
        });

        prop_assert_eq!(first_effective, first);
        prop_assert_eq!(second_effective, first.max(second));
        prop_assert!(second_effective >= first_effective.min(second_effective));
    }
}

#[tokio::test]
async fn counter_resurrection_after_synthetic_expiry() {
    // The in-memory store uses real wall-clock TTLs, so a true expiry test
    // would need to sleep; instead this drives the window length down to
    // the smallest representable unit and confirms the *shape* of
    // resurrection: a fresh key after expiry starts back at count 1 with a
    // full-length TTL, not a continuation of the old count.
    let store = InMemoryStore::new();
    let spec = WindowSpec { limit: 1, window_secs: 1 };
    let keys = TwoWindowKeys { seconds_key: "s", minutes_key: "m", block_key: "b" };

    let first = store.two_window_admit(keys, Some(spec), None).await.unwrap();
    assert!(first.allowed);
    assert_eq!(first.seconds_count, Some(1));

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    let resurrected = store.two_window_admit(keys, Some(spec), None).await.unwrap();
    assert!(resurrected.allowed);
    assert_eq!(resurrected.seconds_count, Some(1));
}

#[tokio::test]
async fn atomicity_under_concurrent_contention() {
    let store = Arc::new(InMemoryStore::new());
    let spec = WindowSpec { limit: 10, window_secs: 60 };
    let keys = TwoWindowKeys { seconds_key: "s", minutes_key: "m", block_key: "b" };

    let mut handles = Vec::new();
    for _ in 0..50 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.two_window_admit(keys, Some(spec), None).await.unwrap().allowed
        }));
    }

    let mut allowed = 0;
    for handle in handles {
        if handle.await.unwrap() {
            allowed += 1;
        }
    }

    assert_eq!(allowed, 10);
}
