//! Namespaced cache management.
//!
//! This module contains the core cache data structures and algorithms:
//! - [`key`]: Namespace and CacheKey definitions
//! - [`record`]: Cached payloads, entries and pending writes
//! - [`store`]: One map per namespace
//! - [`tracker`]: LRU recency ordering
//! - [`batcher`]: Size-or-time write batching
//! - [`stats`]: Hit/miss counters and snapshots
//! - [`engine`]: Composition root with eviction and flushing

pub mod batcher;
pub mod engine;
pub mod key;
pub mod record;
pub mod stats;
pub mod store;
pub mod tracker;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Invalid cache configuration: {0}")]
    Configuration(String),
}

pub use engine::{CacheEngine, ClearScope};
pub use key::{CacheKey, Namespace};
pub use record::{AgentContext, ConversationRecord, MemoryEntry, Payload, ProjectRecord};
pub use stats::CacheStats;
