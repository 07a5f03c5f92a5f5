//! Runtime configuration for persona-cache.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! All cache knobs (capacity, batching thresholds, flush deadlines) live here.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::cache::CacheError;

/// Fraction of `max_cache_size` removed per eviction round.
pub const EVICTION_FRACTION: f64 = 0.10;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "persona-cache", about = "Namespaced LRU cache with batched write-behind")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address for the stats/metrics surface.
    #[arg(long)]
    pub listen: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,

    /// Cache configuration.
    pub cache: CacheConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8080").
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Cache sizing and write-path settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entries across all namespaces combined (0 = unbounded).
    pub max_cache_size: usize,

    /// Pending writes per flush; reaching this depth triggers a flush.
    pub batch_size: usize,

    /// Maximum time between flushes while writes are pending, in milliseconds.
    pub flush_interval_ms: u64,

    /// Deadline for a single persist call, in milliseconds.
    pub flush_timeout_ms: u64,

    /// Upper bound on flush rounds performed by a force-flush.
    pub max_flush_rounds: usize,

    /// Enqueue every cached record into the write batcher.
    pub write_behind: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_size: 10_000,
            batch_size: 100,
            flush_interval_ms: 5_000,
            flush_timeout_ms: 2_000,
            max_flush_rounds: 1_000,
            write_behind: true,
        }
    }
}

impl CacheConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    /// Whether eviction is disabled.
    pub fn is_unbounded(&self) -> bool {
        self.max_cache_size == 0
    }

    /// Number of entries removed by one eviction round.
    ///
    /// ```text
    /// evict_count = max(1, floor(max_cache_size * 0.10))
    /// ```
    pub fn eviction_count(&self) -> usize {
        ((self.max_cache_size as f64 * EVICTION_FRACTION).floor() as usize).max(1)
    }

    /// Reject settings the cache cannot run with.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.batch_size == 0 {
            return Err(CacheError::Configuration(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        if self.flush_timeout_ms == 0 {
            return Err(CacheError::Configuration(
                "flush_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_flush_rounds == 0 {
            return Err(CacheError::Configuration(
                "max_flush_rounds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }
}
