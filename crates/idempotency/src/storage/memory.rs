//! In-process [`Storage`] backend: a mutex-guarded map with a background
//! sweep for expiry. Suitable for a single instance or for tests; does not
//! coordinate across processes.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::record::Record;

use super::{ClaimOutcome, Storage};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Entry {
    record: Record,
    expires_at: Instant,
}

struct Inner {
    entries: Mutex<HashMap<String, Entry>>,
}

/// In-memory idempotency storage with a background TTL sweeper.
///
/// The sweeper is spawned on construction and aborted on drop; it exists
/// to bound memory for long-lived processes rather than to enforce
/// correctness, since every read path also checks expiry defensively.
pub struct InMemoryStorage {
    inner: Arc<Inner>,
    sweeper: JoinHandle<()>,
}

impl InMemoryStorage {
    /// Create an empty store and start its background sweeper.
    #[must_use]
    pub fn new() -> Self {
        let inner = Arc::new(Inner { entries: Mutex::new(HashMap::new()) });
        let sweep_inner = Arc::clone(&inner);
        let sweeper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                sweep(&sweep_inner);
            }
        });
        Self { inner, sweeper }
    }

    /// Number of live (unexpired) entries, for tests and diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner.entries.lock().unwrap().values().filter(|e| e.expires_at > now).count()
    }

    /// True when no live entries remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn sweep(inner: &Inner) {
    let now = Instant::now();
    inner.entries.lock().unwrap().retain(|_, entry| entry.expires_at > now);
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InMemoryStorage {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn load(&self, key: &str) -> Result<Option<Record>> {
        let now = Instant::now();
        let entries = self.inner.entries.lock().unwrap();
        Ok(entries.get(key).filter(|e| e.expires_at > now).map(|e| e.record.clone()))
    }

    async fn claim(&self, key: &str, ttl: Duration) -> Result<ClaimOutcome> {
        let now = Instant::now();
        let mut entries = self.inner.entries.lock().unwrap();
        if let Some(entry) = entries.get(key) {
            if entry.expires_at > now {
                return Ok(ClaimOutcome::Existing(entry.record.clone()));
            }
        }
        let record = Record::claimed(key);
        entries.insert(key.to_string(), Entry { record: record.clone(), expires_at: now + ttl });
        Ok(ClaimOutcome::Claimed(record))
    }

    async fn save_result(&self, key: &str, result: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut entries = self.inner.entries.lock().unwrap();
        let record = entries.get(key).map(|e| e.record.clone()).unwrap_or_else(|| Record::claimed(key));
        let record = record.completed(result);
        entries.insert(key.to_string(), Entry { record, expires_at: Instant::now() + ttl });
        Ok(())
    }

    async fn save_error(&self, key: &str, message: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.inner.entries.lock().unwrap();
        let record = entries.get(key).map(|e| e.record.clone()).unwrap_or_else(|| Record::claimed(key));
        let record = record.failed(message);
        entries.insert(key.to_string(), Entry { record, expires_at: Instant::now() + ttl });
        Ok(())
    }

    async fn release(&self, key: &str) -> Result<()> {
        self.inner.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // tests favor unwrap over explicit error handling
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_claim_wins_second_sees_existing() {
        let storage = InMemoryStorage::new();
        let ttl = Duration::from_secs(60);
        let first = storage.claim("k1", ttl).await.unwrap();
        assert!(matches!(first, ClaimOutcome::Claimed(_)));
        let second = storage.claim("k1", ttl).await.unwrap();
        assert!(matches!(second, ClaimOutcome::Existing(_)));
    }

    #[tokio::test]
    async fn expired_entry_can_be_reclaimed() {
        let storage = InMemoryStorage::new();
        storage.claim("k1", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let outcome = storage.claim("k1", Duration::from_secs(60)).await.unwrap();
        assert!(matches!(outcome, ClaimOutcome::Claimed(_)));
    }

    #[tokio::test]
    async fn save_result_then_load_returns_completed() {
        let storage = InMemoryStorage::new();
        let ttl = Duration::from_secs(60);
        storage.claim("k1", ttl).await.unwrap();
        storage.save_result("k1", b"ok".to_vec(), ttl).await.unwrap();
        let loaded = storage.load("k1").await.unwrap().unwrap();
        assert_eq!(loaded.result.as_deref(), Some(&b"ok"[..]));
    }

    #[tokio::test]
    async fn release_allows_immediate_reclaim() {
        let storage = InMemoryStorage::new();
        let ttl = Duration::from_secs(60);
        storage.claim("k1", ttl).await.unwrap();
        storage.release("k1").await.unwrap();
        let outcome = storage.claim("k1", ttl).await.unwrap();
        assert!(matches!(outcome, ClaimOutcome::Claimed(_)));
    }
}
