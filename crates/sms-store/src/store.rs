//! Backend-agnostic store handle.

use crate::error::StoreError;
use crate::memory::MemoryStore;
use crate::redis_store::{RedisOptions, RedisStore};
use crate::state::{ConnectionMonitor, ConnectionState};
use std::time::Duration;
use tracing::info;

/// Expiring, read-once message store.
pub enum Store {
    /// Process-local storage (lost on restart)
    Memory(MemoryStore),
    /// Redis server
    Redis(RedisStore),
}

impl Store {
    /// In-memory store with the given sweep interval.
    pub fn memory(sweep_interval: Duration) -> Self {
        Store::Memory(MemoryStore::new(sweep_interval))
    }

    /// Connect to Redis. Fails with [`StoreError::Fatal`] if the server is
    /// unreachable or rejects the credentials.
    pub async fn redis(options: RedisOptions) -> Result<Self, StoreError> {
        let store = RedisStore::connect(options).await?;
        info!("Using Redis message store");
        Ok(Store::Redis(store))
    }

    /// Install `body` under `key` for `ttl`, replacing any previous message.
    pub async fn put(&self, key: &str, body: &str, ttl: Duration) -> Result<(), StoreError> {
        match self {
            Store::Memory(s) => s.put(key, body, ttl),
            Store::Redis(s) => s.put(key, body, ttl).await,
        }
    }

    /// Atomically remove and return the live message for `key`.
    pub async fn take_if_present(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self {
            Store::Memory(s) => s.take_if_present(key),
            Store::Redis(s) => s.take_if_present(key).await,
        }
    }

    pub fn monitor(&self) -> &ConnectionMonitor {
        match self {
            Store::Memory(s) => s.monitor(),
            Store::Redis(s) => s.monitor(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.monitor().state()
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Store::Memory(_) => "memory",
            Store::Redis(_) => "redis",
        }
    }

    pub async fn disconnect(&self) {
        match self {
            Store::Memory(s) => s.disconnect(),
            Store::Redis(s) => s.disconnect().await,
        }
    }
}
