#![allow(clippy::unwrap_used, missing_docs)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use attr_cache_fs::cache::traits::{SyncReadableCache as _, SyncWritableCache as _};
use attr_cache_fs::cache::{ExpirableCache, ManualClock};

type ManualCache = ExpirableCache<u32, Option<String>, Arc<ManualClock>>;

fn manual(interval: Duration) -> (Arc<ManualClock>, ManualCache) {
    let clock = Arc::new(ManualClock::new());
    let cache = ExpirableCache::with_clock(interval, Arc::clone(&clock));
    (clock, cache)
}

#[test]
fn inserts_within_window_are_all_visible() {
    let (_clock, mut cache) = manual(Duration::from_secs(5));
    for key in 0..3 {
        cache.insert(key, Some(format!("v{key}")));
    }

    assert_eq!(cache.len(), 3);
    assert_eq!(cache.get(&1), Some(Some("v1".to_owned())));
    assert!(cache.contains(&2));
}

#[test]
fn expiry_drops_every_entry_at_once() {
    let (clock, mut cache) = manual(Duration::from_secs(5));
    cache.insert(1, Some("a".into()));
    clock.advance(Duration::from_secs(3));
    cache.insert(2, Some("b".into()));
    assert_eq!(cache.len(), 2);

    // Entry 2 is younger than the interval, but the window started before it.
    clock.advance(Duration::from_secs(2));
    assert_eq!(cache.len(), 0);
    assert!(cache.is_empty());
    assert_eq!(cache.get(&1), None);
    assert_eq!(cache.get(&2), None);
}

#[test]
fn compute_runs_once_per_window() {
    let (clock, mut cache) = manual(Duration::from_secs(5));
    let mut runs = 0;

    let first = cache.compute_if_expired_or_absent(7, |_| {
        runs += 1;
        Some("first".to_owned())
    });
    let second = cache.compute_if_expired_or_absent(7, |_| {
        runs += 1;
        Some("second".to_owned())
    });
    assert_eq!(first, Some("first".to_owned()));
    assert_eq!(second, Some("first".to_owned()));
    assert_eq!(runs, 1);

    clock.advance(Duration::from_secs(5));
    let third = cache.compute_if_expired_or_absent(7, |_| {
        runs += 1;
        Some("third".to_owned())
    });
    assert_eq!(third, Some("third".to_owned()));
    assert_eq!(runs, 2);
}

#[test]
fn computed_absence_is_cached() {
    let (_clock, mut cache) = manual(Duration::from_secs(5));
    let mut runs = 0;

    for _ in 0..3 {
        let value = cache.compute_if_expired_or_absent(1, |_| {
            runs += 1;
            None
        });
        assert_eq!(value, None);
    }
    assert_eq!(runs, 1);
    assert!(cache.contains(&1), "the absent marker occupies the key");
}

#[test]
fn remove_and_clear() {
    let (_clock, mut cache) = manual(Duration::from_secs(5));
    cache.insert(1, Some("a".into()));
    cache.insert(2, None);

    assert_eq!(cache.remove(&1), Some(Some("a".into())));
    assert_eq!(cache.remove(&1), None);
    assert_eq!(cache.len(), 1);

    cache.clear();
    assert!(cache.is_empty());
}

#[test]
fn failed_fallible_compute_is_retried() {
    let (_clock, mut cache) = manual(Duration::from_secs(5));

    let err = cache.try_compute_if_expired_or_absent(1, |_| Err::<Option<String>, _>("boom"));
    assert_eq!(err, Err("boom"));
    assert!(!cache.contains(&1));

    let ok = cache.try_compute_if_expired_or_absent(1, |_| Ok::<_, &str>(Some("ok".into())));
    assert_eq!(ok, Ok(Some("ok".to_owned())));
}

#[test]
fn system_clock_expires_after_real_time() {
    let mut cache = ExpirableCache::new(Duration::from_millis(50));
    cache.insert("k", 1);
    assert_eq!(cache.get(&"k"), Some(1));

    thread::sleep(Duration::from_millis(120));
    assert_eq!(cache.get(&"k"), None);
    assert_eq!(cache.len(), 0);
}
