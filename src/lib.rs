//! ArbScan Backend Library
//!
//! Real-time cross-venue crypto arbitrage opportunity detector:
//! - `connectors` — per-venue REST feed adapters
//! - `snapshot` — fused in-memory market view
//! - `fx` — USD/KRW resolver with source fallback chain
//! - `allocator` — premium-tier capital allocation curve
//! - `wallet` — deposit/withdraw state oracle
//! - `engine` — opportunity detectors + alert tracking
//! - `hub` — WebSocket fan-out and last-good HTTP snapshot
//! - `scheduler` — tick driver with jitter and backoff
//! - `api` — axum HTTP/WS surface

pub mod allocator;
pub mod api;
pub mod config;
pub mod connectors;
pub mod engine;
pub mod fx;
pub mod hub;
pub mod models;
pub mod scheduler;
pub mod snapshot;
pub mod wallet;
