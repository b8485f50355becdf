//! Request cache for Earshot.
//!
//! Looking up a player means several round trips to the game console, and
//! an overlay page load can ask for the same player many times at once.
//! This crate sits in front of such a provider:
//!
//! - [`Lookup`]: the provider interface (`get` one item, `list` all).
//! - [`Coalescer`]: the primitive: per-key TTL storage plus single-flight
//!   so concurrent misses for one key share one upstream call.
//! - [`Cached`]: a [`Lookup`] decorator built from two coalescers.
//!
//! Errors are handed to every waiter of the call that produced them and
//! are never stored, so a failed fetch does not poison the key.

mod cached;
mod coalescer;

pub use cached::{CacheConfig, Cached};
pub use coalescer::Coalescer;

use std::future::Future;

/// A slow upstream that can fetch one item by key or list all items.
///
/// `Error: Clone` so one upstream failure can be returned to every caller
/// that was waiting on it.
pub trait Lookup: Send + Sync + 'static {
    type Key: Clone + Eq + std::hash::Hash + Send + Sync + 'static;
    type Item: Clone + Send + Sync + 'static;
    type Error: Clone + Send + Sync + 'static;

    fn get(
        &self,
        key: &Self::Key,
    ) -> impl Future<Output = Result<Self::Item, Self::Error>> + Send;

    fn list(
        &self,
    ) -> impl Future<Output = Result<Vec<Self::Item>, Self::Error>> + Send;
}
