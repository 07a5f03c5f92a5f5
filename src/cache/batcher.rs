//! Write batcher: amortizes persistence by grouping pending writes.
//!
//! Writes queue in FIFO order. A flush is due once the queue holds
//! `batch_size` writes, or once `flush_interval` has passed since the last
//! flush while anything is queued. The batcher only decides and dequeues;
//! the engine performs the persist call.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::cache::record::PendingWrite;

pub struct WriteBatcher {
    /// Pending writes, oldest first.
    queue: VecDeque<PendingWrite>,

    batch_size: usize,

    flush_interval: Duration,

    /// Reset by every dequeued batch, whatever its outcome.
    last_flush: Instant,
}

impl WriteBatcher {
    /// `batch_size` must be non-zero; the engine validates this at construction.
    pub fn new(batch_size: usize, flush_interval: Duration) -> Self {
        Self {
            queue: VecDeque::new(),
            batch_size,
            flush_interval,
            last_flush: Instant::now(),
        }
    }

    /// Append writes to the back of the queue. Returns the new depth.
    pub fn enqueue(&mut self, writes: impl IntoIterator<Item = PendingWrite>) -> usize {
        self.queue.extend(writes);
        self.queue.len()
    }

    pub fn size_threshold_reached(&self) -> bool {
        self.queue.len() >= self.batch_size
    }

    pub fn interval_elapsed(&self) -> bool {
        self.last_flush.elapsed() > self.flush_interval
    }

    /// Whether a flush should run now.
    pub fn flush_due(&self) -> bool {
        !self.queue.is_empty() && (self.size_threshold_reached() || self.interval_elapsed())
    }

    /// Dequeue up to `batch_size` writes and restart the flush timer.
    pub fn take_batch(&mut self) -> Vec<PendingWrite> {
        let n = self.batch_size.min(self.queue.len());
        let batch: Vec<PendingWrite> = self.queue.drain(..n).collect();
        self.last_flush = Instant::now();

        if !batch.is_empty() {
            debug!(
                batch = batch.len(),
                remaining = self.queue.len(),
                "Dequeued write batch"
            );
        }
        batch
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }
}

/// How a single flush ended.
#[derive(Debug, Clone, PartialEq)]
pub enum FlushOutcome {
    /// Nothing was queued.
    Empty,
    /// Every write was persisted.
    Complete,
    /// The store accepted some writes and rejected others.
    Partial,
    /// The store rejected the whole batch.
    Failed(String),
    /// The persist call missed its deadline.
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct FlushReport {
    pub attempted: usize,
    pub persisted: usize,
    /// Dropped without retry.
    pub failed: usize,
    pub outcome: FlushOutcome,
}

impl FlushReport {
    pub fn empty() -> Self {
        Self {
            attempted: 0,
            persisted: 0,
            failed: 0,
            outcome: FlushOutcome::Empty,
        }
    }
}

/// Totals across the rounds of a force-flush.
#[derive(Debug, Clone, Default)]
pub struct FlushSummary {
    pub rounds: usize,
    pub persisted: usize,
    pub failed: usize,
    /// Writes still queued when the round limit was hit.
    pub remaining: usize,
}
