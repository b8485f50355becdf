//! Integration tests for the cached lookup decorator.
//!
//! All tests run with Tokio's clock paused, so "100ms later" is exact
//! and the upstream's simulated latency costs no wall time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use earshot_cache::{CacheConfig, Cached, Coalescer, Lookup};

// ---------------------------------------------------------------------------
// Test upstream
// ---------------------------------------------------------------------------

/// Counts calls, sleeps `latency` per call, and fails while `failing`.
#[derive(Default)]
struct Counters {
    gets: AtomicUsize,
    lists: AtomicUsize,
    failing: AtomicBool,
    latency: Duration,
}

#[derive(Clone, Default)]
struct Upstream(Arc<Counters>);

impl Upstream {
    fn with_latency(latency: Duration) -> Self {
        Self(Arc::new(Counters { latency, ..Default::default() }))
    }
}

impl std::ops::Deref for Upstream {
    type Target = Counters;

    fn deref(&self) -> &Counters {
        &self.0
    }
}

impl Lookup for Upstream {
    type Key = String;
    type Item = String;
    type Error = String;

    async fn get(&self, key: &String) -> Result<String, String> {
        let n = self.gets.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.latency).await;
        if self.failing.load(Ordering::SeqCst) {
            return Err(format!("upstream down ({n})"));
        }
        Ok(format!("{key}#{n}"))
    }

    async fn list(&self) -> Result<Vec<String>, String> {
        let n = self.lists.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.latency).await;
        if self.failing.load(Ordering::SeqCst) {
            return Err("upstream down".into());
        }
        Ok(vec![format!("list#{n}")])
    }
}

fn cached(upstream: &Upstream) -> Arc<Cached<Upstream>> {
    Arc::new(Cached::new(upstream.clone(), CacheConfig::default()))
}

// ---------------------------------------------------------------------------
// Coalescing
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_get_concurrent_misses_share_one_call() {
    let upstream = Upstream::with_latency(Duration::from_millis(20));
    let cache = cached(&upstream);

    let key = "alice".to_string();
    let (a, b) = tokio::join!(cache.get(&key), cache.get(&key));

    assert_eq!(a, Ok("alice#1".to_string()));
    assert_eq!(b, Ok("alice#1".to_string()));
    assert_eq!(upstream.gets.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_get_many_waiters_share_one_call() {
    let upstream = Upstream::with_latency(Duration::from_millis(50));
    let cache = cached(&upstream);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get(&"bob".into()).await })
        })
        .collect();
    for h in handles {
        assert_eq!(h.await.unwrap(), Ok("bob#1".to_string()));
    }

    assert_eq!(upstream.gets.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_get_concurrent_errors_are_shared() {
    let upstream = Upstream::with_latency(Duration::from_millis(20));
    upstream.failing.store(true, Ordering::SeqCst);
    let cache = cached(&upstream);

    let key = "x".to_string();
    let (a, b) = tokio::join!(cache.get(&key), cache.get(&key));

    assert_eq!(a, Err("upstream down (1)".to_string()));
    assert_eq!(a, b);
    assert_eq!(upstream.gets.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_list_miss_does_not_wait_on_get_miss() {
    let upstream = Upstream::with_latency(Duration::from_millis(40));
    let cache = cached(&upstream);

    let slow_get = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get(&"carol".into()).await })
    };
    tokio::task::yield_now().await;

    let started = tokio::time::Instant::now();
    let list = cache.list().await;
    assert_eq!(list, Ok(vec!["list#1".to_string()]));
    assert!(started.elapsed() < Duration::from_millis(80));
    assert_eq!(upstream.lists.load(Ordering::SeqCst), 1);

    slow_get.await.unwrap().unwrap();
    assert_eq!(upstream.gets.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Expiry
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_get_within_max_age_is_served_from_cache() {
    let upstream = Upstream::default();
    let cache = cached(&upstream);

    cache.get(&"dave".into()).await.unwrap();
    tokio::time::advance(Duration::from_millis(50)).await;
    let again = cache.get(&"dave".into()).await;

    assert_eq!(again, Ok("dave#1".to_string()));
    assert_eq!(upstream.gets.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_get_after_max_age_refetches() {
    let upstream = Upstream::default();
    let cache = cached(&upstream);

    cache.get(&"erin".into()).await.unwrap();
    tokio::time::advance(Duration::from_millis(101)).await;
    let again = cache.get(&"erin".into()).await;

    assert_eq!(again, Ok("erin#2".to_string()));
    assert_eq!(upstream.gets.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_list_after_max_age_refetches() {
    let upstream = Upstream::default();
    let cache = cached(&upstream);

    cache.list().await.unwrap();
    cache.list().await.unwrap();
    assert_eq!(upstream.lists.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_millis(101)).await;
    assert_eq!(cache.list().await, Ok(vec!["list#2".to_string()]));
}

// ---------------------------------------------------------------------------
// Non-poisoning
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_get_failure_is_not_cached() {
    let upstream = Upstream::default();
    upstream.failing.store(true, Ordering::SeqCst);
    let cache = cached(&upstream);

    assert!(cache.get(&"frank".into()).await.is_err());

    upstream.failing.store(false, Ordering::SeqCst);
    tokio::time::advance(Duration::from_millis(1)).await;
    let retry = cache.get(&"frank".into()).await;
    assert_eq!(retry, Ok("frank#2".to_string()));

    // The successful retry is now what gets served.
    tokio::time::advance(Duration::from_millis(50)).await;
    assert_eq!(cache.get(&"frank".into()).await, Ok("frank#2".to_string()));
    assert_eq!(upstream.gets.load(Ordering::SeqCst), 2);
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_cancelled_leader_hands_fetch_to_waiter() {
    let coalescer: Arc<Coalescer<&'static str, u32, String>> =
        Arc::new(Coalescer::new(Duration::from_millis(100)));
    let calls = Arc::new(AtomicUsize::new(0));

    let leader = {
        let coalescer = Arc::clone(&coalescer);
        let calls = Arc::clone(&calls);
        tokio::spawn(async move {
            coalescer
                .get_or_fetch("k", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(1)
                })
                .await
        })
    };
    tokio::task::yield_now().await;

    let waiter = {
        let coalescer = Arc::clone(&coalescer);
        let calls = Arc::clone(&calls);
        tokio::spawn(async move {
            coalescer
                .get_or_fetch("k", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(2)
                })
                .await
        })
    };
    tokio::task::yield_now().await;

    leader.abort();
    assert_eq!(waiter.await.unwrap(), Ok(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_cache_config_default_is_100ms() {
    assert_eq!(CacheConfig::default().max_age, Duration::from_millis(100));
}
