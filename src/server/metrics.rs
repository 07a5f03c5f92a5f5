//! Prometheus export of the cache stats snapshot.
//!
//! Values are copied from [`CacheStats`] at scrape time. Counters reset on a
//! full clear, so every series is a gauge.

use prometheus::{Encoder, Gauge, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::cache::key::Namespace;
use crate::cache::stats::CacheStats;

pub struct CacheMetrics {
    registry: Registry,
    hits: IntGauge,
    misses: IntGauge,
    hit_rate: Gauge,
    batches_flushed: IntGauge,
    failed_flushes: IntGauge,
    evictions: IntGauge,
    dropped_writes: IntGauge,
    pending_writes: IntGauge,
    entries: IntGaugeVec,
}

impl CacheMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("persona_cache".to_string()), None)?;

        let hits = IntGauge::new("hits", "Cache hits since the last full clear")?;
        let misses = IntGauge::new("misses", "Cache misses since the last full clear")?;
        let hit_rate = Gauge::new("hit_rate", "hits / (hits + misses)")?;
        let batches_flushed = IntGauge::new("batches_flushed", "Batches accepted by the store")?;
        let failed_flushes = IntGauge::new(
            "failed_flushes",
            "Batches rejected in whole or in part, or timed out",
        )?;
        let evictions = IntGauge::new("evictions", "Entries removed by LRU eviction")?;
        let dropped_writes =
            IntGauge::new("dropped_writes", "Pending writes dropped after a failed flush")?;
        let pending_writes = IntGauge::new("pending_writes", "Writes waiting for a flush")?;
        let entries = IntGaugeVec::new(
            Opts::new("entries", "Cached entries per namespace"),
            &["namespace"],
        )?;

        registry.register(Box::new(hits.clone()))?;
        registry.register(Box::new(misses.clone()))?;
        registry.register(Box::new(hit_rate.clone()))?;
        registry.register(Box::new(batches_flushed.clone()))?;
        registry.register(Box::new(failed_flushes.clone()))?;
        registry.register(Box::new(evictions.clone()))?;
        registry.register(Box::new(dropped_writes.clone()))?;
        registry.register(Box::new(pending_writes.clone()))?;
        registry.register(Box::new(entries.clone()))?;

        Ok(Self {
            registry,
            hits,
            misses,
            hit_rate,
            batches_flushed,
            failed_flushes,
            evictions,
            dropped_writes,
            pending_writes,
            entries,
        })
    }

    pub fn update(&self, stats: &CacheStats) {
        self.hits.set(stats.hits as i64);
        self.misses.set(stats.misses as i64);
        self.hit_rate.set(stats.hit_rate);
        self.batches_flushed.set(stats.batches_flushed as i64);
        self.failed_flushes.set(stats.failed_flushes as i64);
        self.evictions.set(stats.evictions as i64);
        self.dropped_writes.set(stats.dropped_writes as i64);
        self.pending_writes.set(stats.pending_writes as i64);
        for namespace in Namespace::ALL {
            self.entries
                .with_label_values(&[namespace.as_str()])
                .set(stats.per_namespace.get(namespace) as i64);
        }
    }

    /// Render in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
