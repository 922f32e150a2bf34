//! Abstract interface for the fast counter store backing campaign hot paths.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::error::Error;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

/// Marker trait for counter store errors
pub trait CounterStoreError: Debug + Error + Send + Sync + 'static {}

/// A trait representing an atomic counter store with asynchronous operations.
///
/// Backends must make `incr_by` and `decr_by` single atomic read-modify-write
/// operations; the returned value is the counter immediately after exactly
/// this call, which is what callers use to detect overshoot.
#[async_trait]
pub trait CounterStore: Clone + Send + Sync + 'static {
    /// The error type for counter operations.
    type Error: CounterStoreError;

    /// Atomically subtracts `delta` from a key and returns the new value.
    ///
    /// The value may go negative. Callers that need a floor at zero
    /// compensate with [`CounterStore::incr_by`] when the result overshoots.
    async fn decr_by<K: Into<String> + Send>(&self, key: K, delta: i64)
    -> Result<i64, Self::Error>;

    /// Deletes a key. Deleting an absent key is not an error.
    async fn del<K: Into<String> + Send>(&self, key: K) -> Result<(), Self::Error>;

    /// Gets the current value, or `None` when the key is absent or expired.
    async fn get<K: Into<String> + Send>(&self, key: K) -> Result<Option<i64>, Self::Error>;

    /// Atomically adds `delta` to a key and returns the new value. An absent
    /// key counts from zero.
    async fn incr_by<K: Into<String> + Send>(&self, key: K, delta: i64)
    -> Result<i64, Self::Error>;

    /// Sets a key to `value`, arming an expiry after which the key reads as
    /// absent when `ttl` is given.
    async fn set<K: Into<String> + Send>(
        &self,
        key: K,
        value: i64,
        ttl: Option<Duration>,
    ) -> Result<(), Self::Error>;
}
