//! persona-cache: namespaced LRU cache with batched write-behind.
//!
//! Sits between request handlers and a persistent store, caching
//! conversation, project and agent-context records:
//!   lookup → hit (touch recency) | miss (caller loads and caches)
//!   cache  → insert → evict 10% of capacity when over the ceiling
//!          → enqueue write → flush on batch size or interval

pub mod cache;
pub mod config;
pub mod persist;
pub mod server;
