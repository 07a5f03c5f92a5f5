//! HTTP surface for monitoring and administering the cache.
//!
//! - GET /health
//! - GET /v1/cache/stats
//! - GET /metrics
//! - POST /v1/cache/flush
//! - DELETE /v1/cache/namespaces/{namespace}
//! - DELETE /v1/cache/projects/{project_id}

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::cache::engine::{ClearScope, SharedCache};
use crate::cache::key::Namespace;
use crate::cache::stats::CacheStats;
use crate::server::metrics::CacheMetrics;

/// Application state shared across handlers.
pub struct AppState {
    pub cache: SharedCache,
    pub metrics: CacheMetrics,
    pub start_time: Instant,
}

/// Build the axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/v1/cache/stats", get(cache_stats))
        .route("/v1/cache/flush", post(flush))
        .route("/v1/cache/namespaces/{namespace}", delete(clear_namespace))
        .route("/v1/cache/projects/{project_id}", delete(clear_project))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

// ─── Response Types ────────────────────────────────────────────────────────

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub cache: CacheStats,
}

#[derive(Debug, Serialize)]
pub struct FlushResponse {
    pub rounds: usize,
    pub persisted: usize,
    pub failed: usize,
    pub remaining: usize,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub removed: usize,
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        cache: state.cache.stats().await,
    })
}

async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<CacheStats> {
    Json(state.cache.stats().await)
}

async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, StatusCode> {
    let stats = state.cache.stats().await;
    state.metrics.update(&stats);

    let body = state.metrics.render().map_err(|e| {
        error!(error = %e, "Failed to render metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body))
}

async fn flush(State(state): State<Arc<AppState>>) -> Json<FlushResponse> {
    let summary = state.cache.force_flush_all().await;
    Json(FlushResponse {
        rounds: summary.rounds,
        persisted: summary.persisted,
        failed: summary.failed,
        remaining: summary.remaining,
    })
}

async fn clear_namespace(
    State(state): State<Arc<AppState>>,
    Path(namespace): Path<String>,
) -> Result<Json<ClearResponse>, StatusCode> {
    let scope = match namespace.as_str() {
        "all" => ClearScope::All,
        name => Namespace::ALL
            .into_iter()
            .find(|ns| ns.as_str() == name)
            .map(ClearScope::Namespace)
            .ok_or(StatusCode::NOT_FOUND)?,
    };

    let removed = state.cache.clear(scope).await;
    info!(namespace = %namespace, removed, "Namespace cleared via API");
    Ok(Json(ClearResponse { removed }))
}

async fn clear_project(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> Json<ClearResponse> {
    let removed = state.cache.clear_for_project(&project_id).await;
    Json(ClearResponse { removed })
}
