//! HTTP server exposing cache stats and admin operations.
//!
//! - [`api`]: Routes and handlers
//! - [`metrics`]: Prometheus registry fed from the stats snapshot

pub mod api;
pub mod metrics;
