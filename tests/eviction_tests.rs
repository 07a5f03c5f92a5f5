//! Integration tests for LRU eviction.

use std::sync::Arc;

use persona_cache::cache::{
    AgentContext, CacheEngine, CacheKey, ConversationRecord, ProjectRecord,
};
use persona_cache::config::CacheConfig;
use persona_cache::persist::memory::MemoryStore;

fn bounded(max_cache_size: usize) -> CacheEngine {
    let config = CacheConfig {
        max_cache_size,
        write_behind: false,
        ..Default::default()
    };
    CacheEngine::new(config, Arc::new(MemoryStore::new())).unwrap()
}

fn conv(id: &str) -> ConversationRecord {
    ConversationRecord::new(id, None)
}

#[tokio::test]
async fn test_eleventh_insert_evicts_oldest() {
    let engine = bounded(10);

    for i in 0..10 {
        engine.cache_conversation(conv(&format!("c{i}"))).await;
    }
    assert_eq!(engine.stats().await.total_size, 10);

    engine.cache_conversation(conv("c10")).await;

    let stats = engine.stats().await;
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.total_size, 10);
    assert!(!engine.contains(&CacheKey::conversation("c0")).await);
    for i in 1..=10 {
        assert!(engine.contains(&CacheKey::conversation(format!("c{i}"))).await);
    }
}

#[tokio::test]
async fn test_reaccess_protects_entry() {
    let engine = bounded(3);

    engine.cache_conversation(conv("A")).await;
    engine.cache_conversation(conv("B")).await;
    engine.cache_conversation(conv("C")).await;
    assert!(engine.get_conversation("A").await.is_some());

    // Fourth entry triggers an eviction round of max(1, floor(0.3)) = 1.
    engine.cache_conversation(conv("D")).await;

    assert!(engine.contains(&CacheKey::conversation("A")).await);
    assert!(!engine.contains(&CacheKey::conversation("B")).await);
    assert!(engine.contains(&CacheKey::conversation("C")).await);
    assert!(engine.contains(&CacheKey::conversation("D")).await);
}

#[tokio::test]
async fn test_batch_eviction_removes_ten_percent() {
    let engine = bounded(100);

    for i in 0..101 {
        engine.cache_conversation(conv(&format!("c{i}"))).await;
    }

    let stats = engine.stats().await;
    assert_eq!(stats.evictions, 10);
    assert_eq!(stats.total_size, 91);
    for i in 0..10 {
        assert!(!engine.contains(&CacheKey::conversation(format!("c{i}"))).await);
    }
    assert!(engine.contains(&CacheKey::conversation("c10")).await);
}

#[tokio::test]
async fn test_eviction_spans_namespaces() {
    let engine = bounded(3);

    engine.cache_project(ProjectRecord::new("p1")).await;
    engine.cache_conversation(conv("c1")).await;
    engine
        .cache_agent_context(AgentContext::empty("a1", "p1"))
        .await;
    engine.cache_conversation(conv("c2")).await;

    // The project was the oldest entry overall.
    assert!(!engine.contains(&CacheKey::project("p1")).await);
    assert_eq!(engine.stats().await.per_namespace.project, 0);
    assert_eq!(engine.consistency_check().await, (3, 3));
}

#[tokio::test]
async fn test_size_bound_and_tracker_invariant_hold() {
    let max = 20;
    let engine = bounded(max);

    for i in 0..500usize {
        match i % 3 {
            0 => engine.cache_conversation(conv(&format!("c{}", i % 37))).await,
            1 => engine.cache_project(ProjectRecord::new(format!("p{}", i % 11))).await,
            _ => {
                engine
                    .cache_agent_context(AgentContext::empty(
                        format!("a{}", i % 5),
                        format!("p{}", i % 7),
                    ))
                    .await
            }
        }
        if i % 4 == 0 {
            engine.get_conversation(&format!("c{}", i % 13)).await;
        }

        let (entries, tracked) = engine.consistency_check().await;
        assert_eq!(entries, tracked);
        assert!(entries <= max + 1, "size {entries} exceeds bound");
    }
}

#[tokio::test]
async fn test_overwrite_does_not_grow_cache() {
    let engine = bounded(2);

    engine.cache_conversation(conv("c1")).await;
    engine.cache_conversation(conv("c2")).await;
    engine.cache_conversation(conv("c1")).await;

    let stats = engine.stats().await;
    assert_eq!(stats.total_size, 2);
    assert_eq!(stats.evictions, 0);
}
