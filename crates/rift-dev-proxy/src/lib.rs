//! Rift dev proxy: a development reverse proxy that keeps retrying requests
//! and WebSocket upgrades while the upstream is unreachable.

pub mod config;
pub mod engine;
pub mod metrics;
pub mod proxy;
pub mod retry;
