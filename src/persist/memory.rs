//! In-process persistent store.
//!
//! Keeps records in a map and memory entries per conversation. Supports
//! failure injection so callers can exercise partial and failed flushes.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::cache::key::CacheKey;
use crate::cache::record::{MemoryEntry, Payload, PendingWrite, WriteBody};
use crate::persist::{PersistOutcome, PersistentStore, StoreError};

#[derive(Debug, Default, Clone)]
pub struct MemoryStoreStats {
    pub persist_calls: u64,
    pub writes_persisted: u64,
    pub writes_failed: u64,
}

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<CacheKey, Payload>,
    memories: HashMap<String, Vec<MemoryEntry>>,
    batches: Vec<Vec<Uuid>>,
    fail_ids: HashSet<Uuid>,
    fail_keys: HashSet<CacheKey>,
    fail_all: bool,
    latency: Option<Duration>,
    stats: MemoryStoreStats,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every subsequent batch with [`StoreError::Unavailable`].
    pub async fn set_fail_all(&self, fail: bool) {
        self.inner.lock().await.fail_all = fail;
    }

    /// Report these writes as failed when they are persisted.
    pub async fn fail_ids(&self, ids: impl IntoIterator<Item = Uuid>) {
        self.inner.lock().await.fail_ids.extend(ids);
    }

    /// Report every write for these keys as failed.
    pub async fn fail_keys(&self, keys: impl IntoIterator<Item = CacheKey>) {
        self.inner.lock().await.fail_keys.extend(keys);
    }

    /// Sleep this long inside every persist call.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.inner.lock().await.latency = latency;
    }

    /// IDs of every batch received, in arrival order.
    pub async fn batches(&self) -> Vec<Vec<Uuid>> {
        self.inner.lock().await.batches.clone()
    }

    pub async fn memories(&self, conversation_id: &str) -> Vec<MemoryEntry> {
        self.inner
            .lock()
            .await
            .memories
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn stats(&self) -> MemoryStoreStats {
        self.inner.lock().await.stats.clone()
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn load(&self, key: &CacheKey) -> Result<Option<Payload>, StoreError> {
        let inner = self.inner.lock().await;
        let mut payload = inner.records.get(key).cloned();
        if let Some(Payload::Conversation(conv)) = payload.as_mut() {
            if let Some(history) = inner.memories.get(&conv.id) {
                conv.history = history.clone();
            }
        }
        Ok(payload)
    }

    async fn persist(&self, batch: &[PendingWrite]) -> Result<PersistOutcome, StoreError> {
        let latency = self.inner.lock().await.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.inner.lock().await;
        inner.stats.persist_calls += 1;
        inner.batches.push(batch.iter().map(|w| w.id).collect());

        if inner.fail_all {
            inner.stats.writes_failed += batch.len() as u64;
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }

        let mut outcome = PersistOutcome::default();
        for write in batch {
            if inner.fail_ids.contains(&write.id) || inner.fail_keys.contains(&write.key) {
                outcome.failed.push(write.id);
                continue;
            }
            match &write.body {
                WriteBody::Record(payload) => {
                    inner.records.insert(write.key.clone(), payload.clone());
                }
                WriteBody::Memory(entry) => {
                    let mut entry = entry.clone();
                    entry.applied = true;
                    inner
                        .memories
                        .entry(entry.conversation_id.clone())
                        .or_default()
                        .push(entry);
                }
            }
            outcome.succeeded.push(write.id);
        }

        inner.stats.writes_persisted += outcome.succeeded.len() as u64;
        inner.stats.writes_failed += outcome.failed.len() as u64;

        debug!(
            batch = batch.len(),
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "Persisted batch"
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::record::{ConversationRecord, ProjectRecord};

    #[tokio::test]
    async fn test_persist_then_load() {
        let store = MemoryStore::new();
        let payload = Payload::Project(ProjectRecord::new("p1"));
        let write = PendingWrite::record(payload.clone());

        let outcome = store.persist(&[write]).await.unwrap();
        assert!(outcome.is_complete());

        let loaded = store.load(&CacheKey::project("p1")).await.unwrap();
        assert_eq!(loaded, Some(payload));
    }

    #[tokio::test]
    async fn test_load_merges_persisted_memories() {
        let store = MemoryStore::new();
        let conv = Payload::Conversation(ConversationRecord::new("c1", None));
        let memory = PendingWrite::memory(MemoryEntry::new("c1", "user", "hello"));
        store
            .persist(&[PendingWrite::record(conv), memory])
            .await
            .unwrap();

        let loaded = store.load(&CacheKey::conversation("c1")).await.unwrap();
        let binding = loaded.unwrap();
        let history = &binding.as_conversation().unwrap().history;
        assert_eq!(history.len(), 1);
        assert!(history[0].applied);
    }

    #[tokio::test]
    async fn test_partial_failure() {
        let store = MemoryStore::new();
        let a = PendingWrite::record(Payload::Project(ProjectRecord::new("a")));
        let b = PendingWrite::record(Payload::Project(ProjectRecord::new("b")));
        store.fail_ids([b.id]).await;

        let outcome = store.persist(&[a.clone(), b.clone()]).await.unwrap();
        assert_eq!(outcome.succeeded, vec![a.id]);
        assert_eq!(outcome.failed, vec![b.id]);
        assert!(store.load(&CacheKey::project("b")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fail_all() {
        let store = MemoryStore::new();
        store.set_fail_all(true).await;
        let write = PendingWrite::record(Payload::Project(ProjectRecord::new("a")));
        assert!(store.persist(&[write]).await.is_err());
        assert_eq!(store.stats().await.persist_calls, 1);
    }
}
