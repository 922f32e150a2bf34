//! In-memory (single node) implementation of the counter store for local
//! development and tests.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use promo_counter::CounterStore;
use tokio::sync::Mutex;

#[derive(Clone, Copy, Debug)]
struct Entry {
    value: i64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory atomic counter store with lazy key expiry.
#[derive(Clone, Debug, Default)]
pub struct MemoryCounterStore {
    map: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryCounterStore {
    /// Creates a new `MemoryCounterStore`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn add(&self, key: String, delta: i64) -> i64 {
        let mut map = self.map.lock().await;
        purge_expired(&mut map, &key);

        let entry = map.entry(key).or_insert(Entry {
            value: 0,
            expires_at: None,
        });
        entry.value += delta;
        entry.value
    }
}

fn purge_expired(map: &mut HashMap<String, Entry>, key: &str) {
    if map.get(key).is_some_and(Entry::is_expired) {
        map.remove(key);
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    type Error = Error;

    async fn decr_by<K: Into<String> + Send>(
        &self,
        key: K,
        delta: i64,
    ) -> Result<i64, Self::Error> {
        Ok(self.add(key.into(), -delta).await)
    }

    async fn del<K: Into<String> + Send>(&self, key: K) -> Result<(), Self::Error> {
        self.map.lock().await.remove(&key.into());
        Ok(())
    }

    async fn get<K: Into<String> + Send>(&self, key: K) -> Result<Option<i64>, Self::Error> {
        let key = key.into();
        let mut map = self.map.lock().await;
        purge_expired(&mut map, &key);

        Ok(map.get(&key).map(|entry| entry.value))
    }

    async fn incr_by<K: Into<String> + Send>(
        &self,
        key: K,
        delta: i64,
    ) -> Result<i64, Self::Error> {
        Ok(self.add(key.into(), delta).await)
    }

    async fn set<K: Into<String> + Send>(
        &self,
        key: K,
        value: i64,
        ttl: Option<Duration>,
    ) -> Result<(), Self::Error> {
        let entry = Entry {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.map.lock().await.insert(key.into(), entry);

        Ok(())
    }
}
