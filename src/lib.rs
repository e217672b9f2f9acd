// src/lib.rs
// Public library surface for the server, the CLI and integration tests.

pub mod analyze;
pub mod api;
pub mod config;
pub mod engine;
pub mod export;
pub mod ingest;
pub mod metrics;
pub mod sector;
pub mod watchlist;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::engine::{MarketPulse, TickerSentiment};
