//! The persistent store contract consumed by the cache.
//!
//! - [`memory`]: In-process store used by the service binary and tests

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::cache::key::CacheKey;
use crate::cache::record::{Payload, PendingWrite};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Per-write result of a persist call. Batches are not atomic: any subset
/// may fail.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PersistOutcome {
    pub succeeded: Vec<Uuid>,
    pub failed: Vec<Uuid>,
}

impl PersistOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Durable storage behind the cache.
///
/// The cache never calls `load` itself on a miss; callers do, then cache the
/// result. `persist` receives one flushed batch at a time.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    async fn load(&self, key: &CacheKey) -> Result<Option<Payload>, StoreError>;

    async fn persist(&self, batch: &[PendingWrite]) -> Result<PersistOutcome, StoreError>;
}
