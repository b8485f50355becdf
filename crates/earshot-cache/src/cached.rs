//! The [`Cached`] lookup decorator.

use std::time::Duration;

use crate::{Coalescer, Lookup};

/// Cache settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a fetched value is served without asking upstream again.
    /// Default: 100ms.
    pub max_age: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_age: Duration::from_millis(100) }
    }
}

/// Wraps a [`Lookup`] so repeated and concurrent calls hit upstream at
/// most once per key per `max_age`.
///
/// `get` and `list` use separate coalescers: a `list` miss never waits
/// on, or holds up, a `get` miss.
pub struct Cached<P: Lookup> {
    inner: P,
    items: Coalescer<P::Key, P::Item, P::Error>,
    all: Coalescer<(), Vec<P::Item>, P::Error>,
}

impl<P: Lookup> Cached<P> {
    pub fn new(inner: P, config: CacheConfig) -> Self {
        Self {
            inner,
            items: Coalescer::new(config.max_age),
            all: Coalescer::new(config.max_age),
        }
    }

    /// The wrapped provider.
    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: Lookup> Lookup for Cached<P> {
    type Key = P::Key;
    type Item = P::Item;
    type Error = P::Error;

    async fn get(&self, key: &Self::Key) -> Result<Self::Item, Self::Error> {
        self.items
            .get_or_fetch(key.clone(), || self.inner.get(key))
            .await
    }

    async fn list(&self) -> Result<Vec<Self::Item>, Self::Error> {
        self.all.get_or_fetch((), || self.inner.list()).await
    }
}
