//! End-to-end exercises of the public `Cache` surface, as distinct from the
//! per-module unit tests inside `src/`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tlfu_cache::{Cache, CacheEventListener, EvictReason, LoaderError, Profile};

fn wait_until(mut check: impl FnMut() -> bool, timeout: Duration) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    check()
}

#[test]
fn basic_put_get_remove_round_trip() {
    let cache: Cache<String, String> = Cache::builder().maximum_size(100).build();
    assert!(cache.get_if_present(&"missing".to_owned()).is_none());

    cache.put("a".to_owned(), "1".to_owned());
    assert_eq!(cache.get_if_present(&"a".to_owned()).as_deref(), Some(&"1".to_owned()));
    assert!(cache.contains_key(&"a".to_owned()));

    assert_eq!(cache.remove(&"a".to_owned()).as_deref(), Some(&"1".to_owned()));
    assert!(!cache.contains_key(&"a".to_owned()));
}

#[test]
fn get_with_loader_populates_on_miss_and_hits_afterward() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache: Cache<u32, u32> = Cache::builder().maximum_size(100).build();

    let loads = Arc::clone(&calls);
    let v = cache
        .get_with(&7, move |k| {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok::<_, LoaderError>(k * 10)
        })
        .unwrap();
    assert_eq!(*v, 70);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Already cached: get_if_present should now see it without re-invoking
    // any loader.
    assert_eq!(cache.get_if_present(&7).map(|v| *v), Some(70));
}

#[test]
fn configured_loader_is_used_by_plain_get() {
    struct DoublingLoader;
    impl tlfu_cache::Loader<u32, u32> for DoublingLoader {
        fn load(&self, key: &u32) -> Result<u32, LoaderError> {
            Ok(key * 2)
        }
    }

    let cache: Cache<u32, u32> = Cache::builder().maximum_size(100).loader(DoublingLoader).build();
    assert_eq!(cache.get(&21).map(|v| *v), Some(42));
    assert_eq!(cache.get_if_present(&21).map(|v| *v), Some(42));
}

#[test]
fn loader_failure_surfaces_as_an_error_and_does_not_populate_the_cache() {
    let cache: Cache<u32, u32> = Cache::builder().maximum_size(100).build();
    let result = cache.get_with(&1, |_| Err(LoaderError::from_message("boom")));
    assert!(result.is_err());
    assert!(cache.get_if_present(&1).is_none());
}

#[test]
fn size_bound_is_respected_under_sustained_overwrite_pressure() {
    let cache: Cache<u32, u32> = Cache::builder().maximum_size(50).build();
    for round in 0..5u32 {
        for i in 0..2_000u32 {
            cache.put(i + round * 2_000, i);
        }
    }
    cache.shutdown();
    assert!(cache.size() <= 50, "size was {}", cache.size());
}

#[test]
fn weight_bound_holds_with_a_custom_weigher() {
    let cache: Cache<u32, Vec<u8>> = Cache::builder()
        .maximum_weight(1_000)
        .weigher(|_k: &u32, v: &Vec<u8>| v.len() as u32)
        .build();
    for i in 0..200u32 {
        cache.put(i, vec![0u8; 50]);
    }
    cache.shutdown();
    assert!(cache.weight() <= 1_000, "weight was {}", cache.weight());
}

#[test]
fn expire_after_write_makes_entries_invisible_past_their_deadline() {
    let cache: Cache<String, String> = Cache::builder()
        .maximum_size(10)
        .expire_after_write(Duration::from_millis(20))
        .build();
    cache.put("k".to_owned(), "v".to_owned());
    assert!(cache.get_if_present(&"k".to_owned()).is_some());
    std::thread::sleep(Duration::from_millis(50));
    assert!(cache.get_if_present(&"k".to_owned()).is_none());
}

#[test]
fn expire_after_access_resets_on_every_read() {
    let cache: Cache<String, String> = Cache::builder()
        .maximum_size(10)
        .expire_after_access(Duration::from_millis(60))
        .build();
    cache.put("k".to_owned(), "v".to_owned());
    for _ in 0..4 {
        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.get_if_present(&"k".to_owned()).is_some());
    }
}

#[test]
fn profile_session_applies_an_access_based_expiration_default() {
    let cache: Cache<String, String> = Cache::builder().profile(Profile::Session).build();
    cache.put("k".to_owned(), "v".to_owned());
    assert!(cache.get_if_present(&"k".to_owned()).is_some());
}

#[test]
fn event_listener_observes_put_and_explicit_remove() {
    #[derive(Default)]
    struct Recorder {
        puts: AtomicUsize,
        removes: AtomicUsize,
    }
    impl CacheEventListener<String, u32> for Arc<Recorder> {
        fn on_put(&self, _key: &Arc<String>, _value: &Arc<u32>) {
            self.puts.fetch_add(1, Ordering::SeqCst);
        }
        fn on_remove(&self, _key: &Arc<String>, _value: &Arc<u32>) {
            self.removes.fetch_add(1, Ordering::SeqCst);
        }
    }

    let recorder = Arc::new(Recorder::default());
    let cache: Cache<String, u32> = Cache::builder().maximum_size(10).listener(Arc::clone(&recorder)).build();
    cache.put("a".to_owned(), 1);
    cache.remove(&"a".to_owned());
    assert_eq!(recorder.puts.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.removes.load(Ordering::SeqCst), 1);
}

#[test]
fn removing_a_listener_stops_further_notifications() {
    let count = Arc::new(AtomicUsize::new(0));
    struct Counter(Arc<AtomicUsize>);
    impl CacheEventListener<String, u32> for Counter {
        fn on_put(&self, _key: &Arc<String>, _value: &Arc<u32>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let cache: Cache<String, u32> = Cache::builder().maximum_size(10).build();
    let id = cache.add_listener(Counter(Arc::clone(&count)));
    cache.put("a".to_owned(), 1);
    cache.remove_listener(id);
    cache.put("b".to_owned(), 2);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn concurrent_loads_for_the_same_missing_key_coalesce() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let cache: Cache<String, String> = Cache::builder().maximum_size(10).build();
    let mut handles = Vec::new();
    for _ in 0..32 {
        let cache = cache.clone();
        let invocations = Arc::clone(&invocations);
        handles.push(std::thread::spawn(move || {
            cache
                .get_with(&"shared".to_owned(), |_| {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(30));
                    Ok::<_, LoaderError>("v".to_owned())
                })
                .unwrap()
        }));
    }
    for h in handles {
        assert_eq!(*h.join().unwrap(), "v");
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[test]
fn get_async_resolves_via_the_configured_async_loader() {
    struct AsyncDoubler;
    impl tlfu_cache::AsyncLoader<u32, u32> for AsyncDoubler {
        fn load_blocking(&self, key: &u32) -> Result<u32, LoaderError> {
            std::thread::sleep(Duration::from_millis(10));
            Ok(key * 2)
        }
    }

    let cache: Cache<u32, u32> = Cache::builder().maximum_size(10).async_loader(AsyncDoubler).build();
    let handle = cache.get_async(&5);
    let value = handle.wait().unwrap();
    assert_eq!(*value, 10);
}

#[test]
fn views_reflect_current_contents() {
    let cache: Cache<u32, u32> = Cache::builder().maximum_size(100).build();
    for i in 0..5u32 {
        cache.put(i, i * i);
    }
    let mut keys: Vec<u32> = cache.keys().collect();
    keys.sort_unstable();
    assert_eq!(keys, vec![0, 1, 2, 3, 4]);

    let mut values: Vec<u32> = cache.values().collect();
    values.sort_unstable();
    assert_eq!(values, vec![0, 1, 4, 9, 16]);

    assert_eq!(cache.entries().count(), 5);
}

#[test]
fn stats_track_hits_misses_and_evictions() {
    let cache: Cache<u32, u32> = Cache::builder().maximum_size(5).build();
    for i in 0..100u32 {
        cache.put(i, i);
    }
    cache.shutdown();
    for i in 0..100u32 {
        cache.get_if_present(&i);
    }
    let stats = cache.stats();
    assert!(stats.request_count() >= 100);
    assert!(stats.eviction_count > 0);
}

#[test]
fn clear_removes_everything_and_fires_on_clear() {
    let cleared = Arc::new(AtomicUsize::new(0));
    struct ClearCounter(Arc<AtomicUsize>);
    impl CacheEventListener<u32, u32> for ClearCounter {
        fn on_clear(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
    let cache: Cache<u32, u32> = Cache::builder().maximum_size(10).listener(ClearCounter(Arc::clone(&cleared))).build();
    for i in 0..10u32 {
        cache.put(i, i);
    }
    cache.clear();
    assert_eq!(cache.size(), 0);
    assert_eq!(cleared.load(Ordering::SeqCst), 1);
}

#[test]
fn shutdown_is_idempotent_and_cache_remains_usable_for_reads() {
    let cache: Cache<u32, u32> = Cache::builder().maximum_size(10).build();
    cache.put(1, 1);
    cache.shutdown();
    cache.shutdown();
    assert_eq!(cache.get_if_present(&1).map(|v| *v), Some(1));
}

#[test]
fn weight_based_eviction_eventually_notifies_listener() {
    let evictions = Arc::new(AtomicUsize::new(0));
    struct EvictCounter(Arc<AtomicUsize>);
    impl CacheEventListener<u32, Vec<u8>> for EvictCounter {
        fn on_evict(&self, _key: &Arc<u32>, _value: &Arc<Vec<u8>>, reason: EvictReason) {
            if reason == EvictReason::Weight {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
    let cache: Cache<u32, Vec<u8>> = Cache::builder()
        .maximum_weight(100)
        .weigher(|_k: &u32, v: &Vec<u8>| v.len() as u32)
        .listener(EvictCounter(Arc::clone(&evictions)))
        .build();
    for i in 0..50u32 {
        cache.put(i, vec![0u8; 10]);
    }
    cache.shutdown();
    assert!(wait_until(|| evictions.load(Ordering::SeqCst) > 0, Duration::from_millis(200)));
}
