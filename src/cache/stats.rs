//! Hit/miss instrumentation and the stats snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::cache::key::Namespace;

/// Monotonic counters owned by the engine. Reset only by a full clear.
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    batches_flushed: AtomicU64,
    failed_flushes: AtomicU64,
    evictions: AtomicU64,
    dropped_writes: AtomicU64,
}

impl CacheCounters {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch(&self) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
    }

    /// A batch that was rejected in whole or in part.
    pub fn record_failed_flush(&self, dropped: usize) {
        self.failed_flushes.fetch_add(1, Ordering::Relaxed);
        self.dropped_writes.fetch_add(dropped as u64, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, n: usize) {
        self.evictions.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.batches_flushed,
            &self.failed_flushes,
            &self.evictions,
            &self.dropped_writes,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(
        &self,
        per_namespace: NamespaceCounts,
        pending_writes: usize,
    ) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheStats {
            hits,
            misses,
            hit_rate: hit_rate(hits, misses),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            failed_flushes: self.failed_flushes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            dropped_writes: self.dropped_writes.load(Ordering::Relaxed),
            pending_writes,
            total_size: per_namespace.total(),
            per_namespace,
        }
    }
}

/// `hits / (hits + misses)`, or 0.0 before any request.
pub fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        return 0.0;
    }
    hits as f64 / total as f64
}

/// Entry count per namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NamespaceCounts {
    pub conversation: usize,
    pub project: usize,
    pub agent_context: usize,
}

impl NamespaceCounts {
    pub fn get(&self, namespace: Namespace) -> usize {
        match namespace {
            Namespace::Conversation => self.conversation,
            Namespace::Project => self.project,
            Namespace::AgentContext => self.agent_context,
        }
    }

    pub fn total(&self) -> usize {
        self.conversation + self.project + self.agent_context
    }
}

/// Point-in-time view of the cache for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub batches_flushed: u64,
    pub failed_flushes: u64,
    pub evictions: u64,
    pub dropped_writes: u64,
    pub pending_writes: usize,
    pub per_namespace: NamespaceCounts,
    pub total_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        assert_eq!(hit_rate(0, 0), 0.0);
        assert_eq!(hit_rate(3, 1), 0.75);
        assert_eq!(hit_rate(0, 4), 0.0);
    }

    #[test]
    fn test_reset_zeroes_counters() {
        let counters = CacheCounters::default();
        counters.record_hit();
        counters.record_miss();
        counters.record_failed_flush(3);

        let stats = counters.snapshot(NamespaceCounts::default(), 0);
        assert_eq!(stats.dropped_writes, 3);

        counters.reset();
        let stats = counters.snapshot(NamespaceCounts::default(), 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.failed_flushes, 0);
        assert_eq!(stats.dropped_writes, 0);
    }
}
