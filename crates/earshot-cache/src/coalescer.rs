//! TTL storage with single-flight fetching.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell};
use tokio::time::Instant;

/// The result of one upstream call, shared by everyone who waited on it.
type Flight<V, E> = Arc<OnceCell<Result<V, E>>>;

struct Entry<V> {
    value: V,
    fetched_at: Instant,
}

struct Slot<V, E> {
    entry: Option<Entry<V>>,
    flight: Option<Flight<V, E>>,
}

impl<V, E> Default for Slot<V, E> {
    fn default() -> Self {
        Self { entry: None, flight: None }
    }
}

/// Per-key cache with a maximum age and request coalescing.
///
/// For any key, at most one `fetch` is running at a time. Callers that
/// miss while a fetch is in flight wait for it and receive a clone of its
/// result, success or error. Successful values are kept for `max_age`
/// (inclusive); errors are never kept.
///
/// A `max_age` of zero stores nothing but still coalesces concurrent
/// callers.
///
/// If the caller running the fetch is cancelled, one of the waiters takes
/// over and runs its own `fetch`.
pub struct Coalescer<K, V, E> {
    max_age: Duration,
    slots: Mutex<HashMap<K, Slot<V, E>>>,
}

impl<K, V, E> Coalescer<K, V, E>
where
    K: Clone + Eq + Hash,
    V: Clone,
    E: Clone,
{
    pub fn new(max_age: Duration) -> Self {
        Self { max_age, slots: Mutex::new(HashMap::new()) }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Returns the cached value for `key` if it is fresh, otherwise the
    /// result of the in-flight call for `key`, starting one with `fetch`
    /// if there is none.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let flight = {
            let mut slots = self.slots.lock().await;
            let slot = slots.entry(key.clone()).or_default();
            if let Some(entry) = &slot.entry {
                if entry.fetched_at.elapsed() <= self.max_age {
                    return Ok(entry.value.clone());
                }
            }
            Arc::clone(slot.flight.get_or_insert_with(|| Arc::new(OnceCell::new())))
        };

        let result = flight
            .get_or_init(|| async {
                let result = fetch().await;
                self.settle(&key, &flight, &result).await;
                result
            })
            .await;
        result.clone()
    }

    /// Records the outcome of a finished call and retires its flight.
    async fn settle(&self, key: &K, flight: &Flight<V, E>, result: &Result<V, E>) {
        let mut slots = self.slots.lock().await;
        let Some(slot) = slots.get_mut(key) else {
            return;
        };

        match result {
            Ok(value) if !self.max_age.is_zero() => {
                slot.entry = Some(Entry { value: value.clone(), fetched_at: Instant::now() });
            }
            Ok(_) => {}
            Err(_) => tracing::debug!("upstream fetch failed; not cached"),
        }

        if slot.flight.as_ref().is_some_and(|f| Arc::ptr_eq(f, flight)) {
            slot.flight = None;
        }
        if slot.entry.is_none() && slot.flight.is_none() {
            slots.remove(key);
        }
    }

    /// Number of keys holding a stored value or an in-flight call.
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drops every stored value. In-flight calls are unaffected.
    pub async fn clear(&self) {
        self.slots.lock().await.retain(|_, slot| {
            slot.entry = None;
            slot.flight.is_some()
        });
    }
}
