//! In-process message store.
//!
//! Entries live in a sharded map. Expiry is checked on every access, so
//! correctness never depends on the background sweep; the sweep only
//! reclaims memory held by entries nobody came back for.

use crate::entry::Entry;
use crate::error::StoreError;
use crate::state::{ConnectionMonitor, ConnectionState};
use dashmap::DashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

struct Shared {
    entries: DashMap<String, Entry>,
    monitor: ConnectionMonitor,
}

/// In-memory expiring store.
pub struct MemoryStore {
    shared: Arc<Shared>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryStore {
    /// Create a store and spawn its sweep task. Must be called inside a Tokio runtime.
    pub fn new(sweep_interval: Duration) -> Self {
        let shared = Arc::new(Shared {
            entries: DashMap::new(),
            monitor: ConnectionMonitor::new(ConnectionState::Ready),
        });

        let sweeper = tokio::spawn(sweep_loop(Arc::downgrade(&shared), sweep_interval));

        info!(?sweep_interval, "In-memory message store initialized");

        Self {
            shared,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// Install `body` under `key`, replacing any previous entry.
    #[instrument(skip(self, body), fields(len = body.len()))]
    pub fn put(&self, key: &str, body: &str, ttl: Duration) -> Result<(), StoreError> {
        self.shared.monitor.ensure_ready()?;
        self.shared.entries.insert(key.to_string(), Entry::new(body, ttl));
        debug!("Stored message");
        Ok(())
    }

    /// Remove and return the live entry for `key`, if any.
    #[instrument(skip(self))]
    pub fn take_if_present(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.shared.monitor.ensure_ready()?;

        // The predicate runs under the shard's write lock, so at most one
        // caller can remove a given entry.
        if let Some((_, entry)) = self.shared.entries.remove_if(key, |_, e| !e.is_expired()) {
            debug!("Took message");
            return Ok(Some(entry.body));
        }

        if self.shared.entries.remove_if(key, |_, e| e.is_expired()).is_some() {
            debug!("Dropped expired message");
        }
        Ok(None)
    }

    /// Number of unexpired entries.
    pub fn len(&self) -> usize {
        self.shared.entries.iter().filter(|e| !e.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every expired entry now. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        sweep_expired(&self.shared.entries)
    }

    pub fn monitor(&self) -> &ConnectionMonitor {
        &self.shared.monitor
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.monitor.state()
    }

    /// Stop the sweeper and drop all entries. Later calls fail with `Closed`.
    pub fn disconnect(&self) {
        self.shared.monitor.transition(ConnectionState::Closed);
        if let Some(handle) = self.sweeper.lock().ok().and_then(|mut s| s.take()) {
            handle.abort();
        }
        self.shared.entries.clear();
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().ok().and_then(Option::take) {
            handle.abort();
        }
    }
}

fn sweep_expired(entries: &DashMap<String, Entry>) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired());
    before.saturating_sub(entries.len())
}

async fn sweep_loop(shared: Weak<Shared>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let Some(shared) = shared.upgrade() else {
            break;
        };
        if shared.monitor.state().is_terminal() {
            break;
        }

        let removed = sweep_expired(&shared.entries);
        if removed > 0 {
            debug!("Swept {} expired messages", removed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;

    const TTL: Duration = Duration::from_secs(300);
    const SWEEP: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_put_then_take() {
        let store = MemoryStore::new(SWEEP);

        store.put("13800138000", "hello", TTL).unwrap();

        assert_eq!(store.take_if_present("13800138000").unwrap(), Some("hello".into()));
        assert_eq!(store.take_if_present("13800138000").unwrap(), None);
    }

    #[tokio::test]
    async fn test_take_missing_key() {
        let store = MemoryStore::new(SWEEP);
        assert_eq!(store.take_if_present("00000000000").unwrap(), None);
    }

    #[tokio::test]
    async fn test_overwrite_keeps_last_body() {
        let store = MemoryStore::new(SWEEP);

        store.put("13800138000", "first", TTL).unwrap();
        store.put("13800138000", "second", TTL).unwrap();

        assert_eq!(store.take_if_present("13800138000").unwrap(), Some("second".into()));
        assert_eq!(store.take_if_present("13800138000").unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = MemoryStore::new(SWEEP);

        store.put("111", "a", TTL).unwrap();
        store.put("222", "b", TTL).unwrap();

        assert_eq!(store.take_if_present("222").unwrap(), Some("b".into()));
        assert_eq!(store.take_if_present("111").unwrap(), Some("a".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_absent_before_sweep() {
        // Sweep far in the future so only the read-time check can hide the entry
        let store = MemoryStore::new(Duration::from_secs(3600));

        store.put("13800138000", "code", Duration::from_secs(5)).unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(store.take_if_present("13800138000").unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_alive_just_before_expiry() {
        let store = MemoryStore::new(SWEEP);

        store.put("13800138000", "code", Duration::from_secs(5)).unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;

        assert_eq!(store.take_if_present("13800138000").unwrap(), Some("code".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_resets_expiry() {
        let store = MemoryStore::new(Duration::from_secs(3600));

        store.put("13800138000", "first", Duration::from_secs(10)).unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        store.put("13800138000", "second", Duration::from_secs(10)).unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;

        assert_eq!(store.take_if_present("13800138000").unwrap(), Some("second".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_reclaims_entries() {
        let store = MemoryStore::new(SWEEP);

        store.put("111", "a", Duration::from_secs(5)).unwrap();
        store.put("222", "b", Duration::from_secs(600)).unwrap();
        assert_eq!(store.shared.entries.len(), 2);

        // Let the sweeper run past its first real tick
        tokio::time::sleep(SWEEP + Duration::from_secs(1)).await;

        assert_eq!(store.shared.entries.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_sweep() {
        let store = MemoryStore::new(Duration::from_secs(3600));

        store.put("111", "a", Duration::from_secs(1)).unwrap();
        store.put("222", "b", Duration::from_secs(1)).unwrap();
        store.put("333", "c", TTL).unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(store.sweep(), 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_takes_deliver_once() {
        let store = Arc::new(MemoryStore::new(SWEEP));

        for round in 0..50 {
            let body = format!("code {}", round);
            store.put("13800138000", &body, TTL).unwrap();

            let takes = (0..16).map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.take_if_present("13800138000").unwrap() })
            });

            let results: Vec<Option<String>> = join_all(takes)
                .await
                .into_iter()
                .map(|r| r.unwrap())
                .collect();

            let delivered: Vec<_> = results.iter().flatten().collect();
            assert_eq!(delivered.len(), 1, "round {}", round);
            assert_eq!(delivered[0], &body);
        }
    }

    #[tokio::test]
    async fn test_disconnect_closes_store() {
        let store = MemoryStore::new(SWEEP);
        store.put("13800138000", "hello", TTL).unwrap();

        store.disconnect();

        assert_eq!(store.state(), ConnectionState::Closed);
        assert_eq!(store.put("13800138000", "again", TTL), Err(StoreError::Closed));
        assert_eq!(store.take_if_present("13800138000"), Err(StoreError::Closed));
    }
}
