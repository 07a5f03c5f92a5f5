//! Integration tests for concurrent use, the background flusher and the HTTP surface.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use tokio::sync::watch;
use tower::ServiceExt;

use persona_cache::cache::{
    AgentContext, CacheEngine, ConversationRecord, MemoryEntry, Payload, ProjectRecord,
};
use persona_cache::config::CacheConfig;
use persona_cache::persist::memory::MemoryStore;
use persona_cache::server::api::{build_router, AppState};
use persona_cache::server::metrics::CacheMetrics;

fn shared(config: CacheConfig) -> (Arc<CacheEngine>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(CacheEngine::new(config, store.clone()).unwrap());
    (engine, store)
}

fn app(engine: Arc<CacheEngine>) -> axum::Router {
    build_router(Arc::new(AppState {
        cache: engine,
        metrics: CacheMetrics::new().unwrap(),
        start_time: Instant::now(),
    }))
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_keep_invariants() {
    let max = 50;
    let (engine, store) = shared(CacheConfig {
        max_cache_size: max,
        batch_size: 16,
        ..Default::default()
    });

    let mut handles = Vec::new();
    for worker in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..200 {
                let id = format!("c{}", (worker * 31 + i) % 80);
                engine
                    .cache_conversation(ConversationRecord::new(&id, Some(format!("p{}", i % 4))))
                    .await;
                engine.get_conversation(&id).await;
                engine.get_project(&format!("p{}", i % 4)).await;
                if i % 10 == 0 {
                    engine
                        .batch_add_memory(vec![MemoryEntry::new(&id, "user", "ping")])
                        .await;
                }
                if i % 50 == 0 {
                    engine.clear_for_project(&format!("p{}", worker % 4)).await;
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let (entries, tracked) = engine.consistency_check().await;
    assert_eq!(entries, tracked);
    assert!(entries <= max + 1);

    let summary = engine.force_flush_all().await;
    assert_eq!(summary.remaining, 0);

    // 8 workers x 200 records + 8 x 20 memories, none lost or duplicated.
    let persisted = store.stats().await.writes_persisted;
    assert_eq!(persisted, 8 * 200 + 8 * 20);
}

#[tokio::test(start_paused = true)]
async fn test_background_flusher_honours_interval() {
    let (engine, store) = shared(CacheConfig {
        write_behind: false,
        ..Default::default()
    });
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let flusher = engine.clone().spawn_flusher(shutdown_rx);

    for i in 0..3 {
        engine
            .enqueue_write(Payload::Project(ProjectRecord::new(format!("p{i}"))))
            .await;
    }

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(store.batches().await.is_empty());

    tokio::time::sleep(Duration::from_secs(4)).await;
    let batches = store.batches().await;
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 3);

    shutdown_tx.send(true).unwrap();
    flusher.await.unwrap();
}

#[tokio::test]
async fn test_stats_route() {
    let (engine, _) = shared(CacheConfig::default());
    engine.cache_project(ProjectRecord::new("p1")).await;
    engine.get_project("p1").await;
    engine.get_project("p2").await;

    let response = app(engine)
        .oneshot(Request::builder().uri("/v1/cache/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["hits"], 1);
    assert_eq!(json["misses"], 1);
    assert_eq!(json["hit_rate"], 0.5);
    assert_eq!(json["per_namespace"]["project"], 1);
    assert_eq!(json["pending_writes"], 1);
}

#[tokio::test]
async fn test_metrics_route() {
    let (engine, _) = shared(CacheConfig::default());
    engine
        .cache_conversation(ConversationRecord::new("c1", None))
        .await;

    let response = app(engine)
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains(r#"persona_cache_entries{namespace="conversation"} 1"#));
    assert!(text.contains("persona_cache_pending_writes 1"));
}

#[tokio::test]
async fn test_flush_route_drains_queue() {
    let (engine, store) = shared(CacheConfig::default());
    engine.cache_project(ProjectRecord::new("p1")).await;
    engine.cache_project(ProjectRecord::new("p2")).await;

    let response = app(engine.clone())
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/v1/cache/flush")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["persisted"], 2);
    assert_eq!(json["remaining"], 0);
    assert_eq!(store.batches().await.len(), 1);
}

#[tokio::test]
async fn test_clear_routes() {
    let (engine, _) = shared(CacheConfig::default());
    engine
        .cache_agent_context(AgentContext::empty("a1", "p1"))
        .await;
    engine
        .cache_agent_context(AgentContext::empty("a1", "p2"))
        .await;
    engine.cache_project(ProjectRecord::new("p1")).await;

    let response = app(engine.clone())
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri("/v1/cache/projects/p1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_json(response).await["removed"], 1);

    let response = app(engine.clone())
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri("/v1/cache/namespaces/project")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_json(response).await["removed"], 1);

    let response = app(engine.clone())
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri("/v1/cache/namespaces/bogus")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert_eq!(engine.stats().await.total_size, 1);
}
