//! persona-cache service binary.
//!
//! Runs the cache over an in-process store and exposes its stats, metrics
//! and admin operations over HTTP. On Ctrl-C the background flusher stops
//! and every pending write is flushed before exit.

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use persona_cache::cache::CacheEngine;
use persona_cache::config::{Cli, Config};
use persona_cache::persist::memory::MemoryStore;
use persona_cache::server::api::{build_router, AppState};
use persona_cache::server::metrics::CacheMetrics;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "persona_cache=debug,tower_http=debug"
    } else {
        "persona_cache=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("persona-cache v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }

    info!(
        max_cache_size = config.cache.max_cache_size,
        batch_size = config.cache.batch_size,
        flush_interval_ms = config.cache.flush_interval_ms,
        flush_timeout_ms = config.cache.flush_timeout_ms,
        write_behind = config.cache.write_behind,
        "Configuration loaded"
    );

    // Build the cache. An invalid configuration stops startup here.
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(CacheEngine::new(config.cache.clone(), store)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let flusher = cache.clone().spawn_flusher(shutdown_rx);

    // Build application state.
    let state = Arc::new(AppState {
        cache: cache.clone(),
        metrics: CacheMetrics::new()
            .map_err(|e| anyhow::anyhow!("metrics registry: {e}"))?,
        start_time: Instant::now(),
    });

    let app = build_router(state);

    // Start the server.
    let listen_addr = config.server.listen.clone();
    info!(addr = %listen_addr, "Starting server");

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    // Stop the background flusher, then drain the queue.
    let _ = shutdown_tx.send(true);
    flusher.await?;

    let summary = cache.force_flush_all().await;
    info!(
        persisted = summary.persisted,
        failed = summary.failed,
        remaining = summary.remaining,
        "Shutdown complete"
    );

    Ok(())
}
