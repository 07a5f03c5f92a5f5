//! Cache engine: the composition root for the namespaced cache.
//!
//! The engine is the only component callers see. It:
//! - Serves lookups from the namespace maps and counts hits/misses
//! - Touches the access tracker on every hit and insert
//! - Runs a batch eviction round when the entry count passes the ceiling
//! - Routes writes through the write batcher and flushes due batches
//!
//! Lock order is entries → tracker. The batcher lock is never held together
//! with either, and is released before the persist call. A dequeued batch is
//! persisted on its own task, so cancelling the caller that triggered the
//! flush never loses it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::batcher::{FlushOutcome, FlushReport, FlushSummary, WriteBatcher};
use crate::cache::key::{CacheKey, Namespace};
use crate::cache::record::{
    AgentContext, ConversationRecord, MemoryEntry, Payload, PendingWrite, ProjectRecord,
    WriteBody,
};
use crate::cache::stats::{CacheCounters, CacheStats, NamespaceCounts};
use crate::cache::store::NamespacedStore;
use crate::cache::tracker::AccessTracker;
use crate::cache::CacheError;
use crate::config::CacheConfig;
use crate::persist::PersistentStore;

/// Lower bound on the background flusher's tick.
const MIN_FLUSH_TICK: Duration = Duration::from_millis(10);

/// What a clear operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    Namespace(Namespace),
    /// Every namespace, the recency structures and the counters.
    All,
}

pub struct CacheEngine {
    /// Cached entries, one map per namespace.
    entries: Arc<RwLock<NamespacedStore>>,

    /// Recency order over every cached key.
    tracker: Mutex<AccessTracker<CacheKey>>,

    /// Writes waiting for a flush.
    batcher: Mutex<WriteBatcher>,

    /// Where flushed batches go.
    persistence: Arc<dyn PersistentStore>,

    /// Hit/miss, flush and eviction counters.
    counters: Arc<CacheCounters>,

    /// Cache configuration.
    config: CacheConfig,
}

impl CacheEngine {
    /// Create an engine over the given persistent store.
    ///
    /// Fails if the configuration cannot be run with; a failed engine is
    /// never handed out.
    pub fn new(
        config: CacheConfig,
        persistence: Arc<dyn PersistentStore>,
    ) -> Result<Self, CacheError> {
        config.validate()?;

        if config.is_unbounded() {
            warn!("max_cache_size is 0, eviction disabled (unbounded mode)");
        }

        let batcher = WriteBatcher::new(config.batch_size, config.flush_interval());

        Ok(Self {
            entries: Arc::new(RwLock::new(NamespacedStore::new())),
            tracker: Mutex::new(AccessTracker::new()),
            batcher: Mutex::new(batcher),
            persistence,
            counters: Arc::new(CacheCounters::default()),
            config,
        })
    }

    // ─── Reads ─────────────────────────────────────────────────────────────

    async fn lookup(&self, key: &CacheKey) -> Option<Payload> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) => {
                // Still under the read lock, so the entry cannot be evicted
                // between the lookup and the touch.
                self.tracker.lock().await.touch(key);
                self.counters.record_hit();
                Some(entry.payload.clone())
            }
            None => {
                self.counters.record_miss();
                None
            }
        }
    }

    pub async fn get_conversation(&self, id: &str) -> Option<ConversationRecord> {
        self.lookup(&CacheKey::conversation(id))
            .await
            .and_then(Payload::into_conversation)
    }

    pub async fn get_project(&self, id: &str) -> Option<ProjectRecord> {
        self.lookup(&CacheKey::project(id))
            .await
            .and_then(Payload::into_project)
    }

    /// Agent contexts are derived data: a miss yields an empty context
    /// instead of `None`. The empty context is not inserted.
    pub async fn get_agent_context(&self, agent_id: &str, project_id: &str) -> AgentContext {
        self.lookup(&CacheKey::agent_context(agent_id, project_id))
            .await
            .and_then(Payload::into_agent_context)
            .unwrap_or_else(|| AgentContext::empty(agent_id, project_id))
    }

    /// Whether an entry is cached whose applied marker is set.
    /// Does not count as an access.
    pub async fn is_applied(&self, key: &CacheKey) -> Option<bool> {
        self.entries.read().await.get(key).map(|e| e.applied)
    }

    // ─── Writes ────────────────────────────────────────────────────────────

    pub async fn cache_conversation(&self, record: ConversationRecord) {
        self.insert(Payload::Conversation(record)).await;
    }

    pub async fn cache_project(&self, record: ProjectRecord) {
        self.insert(Payload::Project(record)).await;
    }

    pub async fn cache_agent_context(&self, context: AgentContext) {
        self.insert(Payload::AgentContext(context)).await;
    }

    async fn insert(&self, payload: Payload) {
        let key = payload.key();
        {
            let mut entries = self.entries.write().await;
            let mut tracker = self.tracker.lock().await;
            entries.put(key.clone(), payload.clone());
            tracker.touch(&key);
            self.evict_if_needed(&mut entries, &mut tracker);
        }

        if self.config.write_behind {
            self.enqueue(vec![PendingWrite::record(payload)]).await;
        }
    }

    /// Queue a record for persistence without caching it.
    pub async fn enqueue_write(&self, payload: Payload) -> Vec<FlushReport> {
        self.enqueue(vec![PendingWrite::record(payload)]).await
    }

    /// Queue memory entries for persistence and append each one to its
    /// conversation's history if that conversation is cached, so readers see
    /// it before the batch flushes.
    pub async fn batch_add_memory(&self, memories: Vec<MemoryEntry>) -> Vec<FlushReport> {
        {
            let mut entries = self.entries.write().await;
            for memory in &memories {
                let key = CacheKey::conversation(&memory.conversation_id);
                if let Some(conv) = entries
                    .get_mut(&key)
                    .and_then(|e| e.payload.as_conversation_mut())
                {
                    conv.history.push(memory.clone());
                }
            }
        }

        self.enqueue(memories.into_iter().map(PendingWrite::memory).collect())
            .await
    }

    // ─── Eviction ──────────────────────────────────────────────────────────

    /// Run one eviction round if the entry count exceeds the ceiling.
    ///
    /// Removes `max(1, floor(max_cache_size * 0.10))` least-recently-used
    /// entries across all namespaces. Returns the number evicted.
    fn evict_if_needed(
        &self,
        entries: &mut NamespacedStore,
        tracker: &mut AccessTracker<CacheKey>,
    ) -> usize {
        if self.config.is_unbounded() || entries.total_count() <= self.config.max_cache_size {
            return 0;
        }

        let victims = tracker.oldest(self.config.eviction_count());
        let mut evicted = 0;
        for key in victims {
            let idle_ms = tracker
                .last_access(&key)
                .map(|at| at.elapsed().as_millis() as u64)
                .unwrap_or_default();
            let removed = entries.delete(&key);
            tracker.remove(&key);
            if removed {
                evicted += 1;
                debug!(key = %key, idle_ms, "Evicted entry");
            }
        }

        self.counters.record_evictions(evicted);
        info!(
            evicted,
            remaining = entries.total_count(),
            max_cache_size = self.config.max_cache_size,
            "Eviction round complete"
        );
        evicted
    }

    /// Remove a single entry. Returns whether it was cached.
    pub async fn evict(&self, key: &CacheKey) -> bool {
        let mut entries = self.entries.write().await;
        let mut tracker = self.tracker.lock().await;
        tracker.remove(key);
        entries.delete(key)
    }

    pub async fn clear(&self, scope: ClearScope) -> usize {
        let mut entries = self.entries.write().await;
        let mut tracker = self.tracker.lock().await;

        let removed = match scope {
            ClearScope::Namespace(namespace) => {
                let keys = entries.clear(namespace);
                for key in &keys {
                    tracker.remove(key);
                }
                keys.len()
            }
            ClearScope::All => {
                let total = entries.total_count();
                for namespace in Namespace::ALL {
                    entries.clear(namespace);
                }
                tracker.clear();
                self.counters.reset();
                total
            }
        };

        info!(scope = ?scope, removed, "Cleared cache");
        removed
    }

    /// Drop every conversation belonging to `project_id` and every agent
    /// context keyed with it. Returns the number of entries removed.
    pub async fn clear_for_project(&self, project_id: &str) -> usize {
        let mut entries = self.entries.write().await;
        let mut tracker = self.tracker.lock().await;

        let mut removed = entries.remove_where(Namespace::Conversation, |_, entry| {
            entry
                .payload
                .as_conversation()
                .and_then(|c| c.project_id.as_deref())
                == Some(project_id)
        });
        removed.extend(
            entries.remove_where(Namespace::AgentContext, |key, _| {
                key.project_id() == Some(project_id)
            }),
        );

        for key in &removed {
            tracker.remove(key);
        }

        info!(project_id, removed = removed.len(), "Cleared project entries");
        removed.len()
    }

    // ─── Flushing ──────────────────────────────────────────────────────────

    async fn enqueue(&self, writes: Vec<PendingWrite>) -> Vec<FlushReport> {
        if writes.is_empty() {
            return Vec::new();
        }
        self.batcher.lock().await.enqueue(writes);
        self.flush_due().await
    }

    /// Flush for as long as the batcher reports a flush is due.
    pub async fn flush_due(&self) -> Vec<FlushReport> {
        let mut reports = Vec::new();
        loop {
            let batch = {
                let mut batcher = self.batcher.lock().await;
                if !batcher.flush_due() {
                    break;
                }
                batcher.take_batch()
            };
            reports.push(self.persist_batch(batch).await);
        }
        reports
    }

    /// Flush one batch now, whether or not a threshold was reached.
    pub async fn flush(&self) -> FlushReport {
        let batch = self.batcher.lock().await.take_batch();
        self.persist_batch(batch).await
    }

    /// Flush until the queue is empty or `max_flush_rounds` is reached.
    pub async fn force_flush_all(&self) -> FlushSummary {
        let mut summary = FlushSummary::default();

        while summary.rounds < self.config.max_flush_rounds {
            let report = self.flush().await;
            if report.outcome == FlushOutcome::Empty {
                break;
            }
            summary.rounds += 1;
            summary.persisted += report.persisted;
            summary.failed += report.failed;
        }

        summary.remaining = self.batcher.lock().await.pending_count();
        info!(
            rounds = summary.rounds,
            persisted = summary.persisted,
            failed = summary.failed,
            remaining = summary.remaining,
            "Force flush complete"
        );
        summary
    }

    async fn persist_batch(&self, batch: Vec<PendingWrite>) -> FlushReport {
        if batch.is_empty() {
            return FlushReport::empty();
        }
        let attempted = batch.len();
        let flush = BatchFlush {
            entries: Arc::clone(&self.entries),
            counters: Arc::clone(&self.counters),
            persistence: Arc::clone(&self.persistence),
            deadline: self.config.flush_timeout(),
        };

        match tokio::spawn(flush.run(batch)).await {
            Ok(report) => report,
            Err(e) => {
                self.counters.record_failed_flush(attempted);
                warn!(attempted, error = %e, "Flush task failed, dropping writes");
                FlushReport {
                    attempted,
                    persisted: 0,
                    failed: attempted,
                    outcome: FlushOutcome::Failed(e.to_string()),
                }
            }
        }
    }

    /// Spawn a task that flushes on the time threshold even when no new
    /// writes arrive. Stops when `shutdown` flips to true.
    pub fn spawn_flusher(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let engine = self;
        let tick = (engine.config.flush_interval() / 2).max(MIN_FLUSH_TICK);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        engine.flush_due().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Background flusher stopped");
        })
    }

    // ─── Stats ─────────────────────────────────────────────────────────────

    pub async fn stats(&self) -> CacheStats {
        let per_namespace = {
            let entries = self.entries.read().await;
            NamespaceCounts {
                conversation: entries.count(Namespace::Conversation),
                project: entries.count(Namespace::Project),
                agent_context: entries.count(Namespace::AgentContext),
            }
        };
        let pending = self.batcher.lock().await.pending_count();
        self.counters.snapshot(per_namespace, pending)
    }

    pub async fn pending_writes(&self) -> usize {
        self.batcher.lock().await.pending_count()
    }

    /// Tracked token count; equals the entry count between operations.
    pub async fn tracked_len(&self) -> usize {
        let _entries = self.entries.read().await;
        self.tracker.lock().await.len()
    }

    /// Entry count and tracked token count read under one lock.
    pub async fn consistency_check(&self) -> (usize, usize) {
        let entries = self.entries.read().await;
        let tracker = self.tracker.lock().await;
        (entries.total_count(), tracker.len())
    }

    pub async fn contains(&self, key: &CacheKey) -> bool {
        self.entries.read().await.contains(key)
    }
}

/// Thread-safe handle to the cache.
pub type SharedCache = Arc<CacheEngine>;

/// Everything a detached flush task needs: the persist call plus the
/// bookkeeping that follows it.
struct BatchFlush {
    entries: Arc<RwLock<NamespacedStore>>,
    counters: Arc<CacheCounters>,
    persistence: Arc<dyn PersistentStore>,
    deadline: Duration,
}

impl BatchFlush {
    async fn run(self, batch: Vec<PendingWrite>) -> FlushReport {
        let attempted = batch.len();
        let result = tokio::time::timeout(self.deadline, self.persistence.persist(&batch)).await;

        let report = match result {
            Ok(Ok(outcome)) => {
                self.counters.record_batch();
                self.mark_applied(&batch, &outcome.succeeded).await;

                let failed = attempted.saturating_sub(outcome.succeeded.len());
                let complete = outcome.is_complete() && failed == 0;
                if !complete {
                    self.counters.record_failed_flush(failed);
                    warn!(attempted, failed, "Batch partially persisted, dropping failed writes");
                }
                FlushReport {
                    attempted,
                    persisted: outcome.succeeded.len(),
                    failed,
                    outcome: if complete {
                        FlushOutcome::Complete
                    } else {
                        FlushOutcome::Partial
                    },
                }
            }
            Ok(Err(e)) => {
                self.counters.record_failed_flush(attempted);
                warn!(attempted, error = %e, "Batch persist failed, dropping writes");
                FlushReport {
                    attempted,
                    persisted: 0,
                    failed: attempted,
                    outcome: FlushOutcome::Failed(e.to_string()),
                }
            }
            Err(_) => {
                self.counters.record_failed_flush(attempted);
                warn!(
                    attempted,
                    timeout_ms = self.deadline.as_millis() as u64,
                    "Batch persist timed out, dropping writes"
                );
                FlushReport {
                    attempted,
                    persisted: 0,
                    failed: attempted,
                    outcome: FlushOutcome::TimedOut,
                }
            }
        };

        debug!(
            attempted,
            persisted = report.persisted,
            failed = report.failed,
            oldest_age_ms = batch[0].enqueued_at.elapsed().as_millis() as u64,
            "Flush complete"
        );
        report
    }

    /// Set the applied marker on cached views of persisted writes. A record
    /// only counts if the cached payload is still the one that was persisted.
    async fn mark_applied(&self, batch: &[PendingWrite], succeeded: &[Uuid]) {
        if succeeded.is_empty() {
            return;
        }
        let mut entries = self.entries.write().await;
        for write in batch.iter().filter(|w| succeeded.contains(&w.id)) {
            let Some(entry) = entries.get_mut(&write.key) else {
                continue;
            };
            match &write.body {
                WriteBody::Record(payload) => {
                    if entry.payload == *payload {
                        entry.applied = true;
                    }
                }
                WriteBody::Memory(memory) => {
                    if let Some(conv) = entry.payload.as_conversation_mut() {
                        if let Some(item) = conv.history.iter_mut().find(|m| m.id == memory.id) {
                            item.applied = true;
                        }
                    }
                }
            }
        }
    }
}
