// src/ingest/mod.rs
//! Upstream ingestion: windowed price history and the cursor-paged message stream.
//! The two fetchers share only the HTTP client, auth and host configuration.

pub mod http;
pub mod prices;
pub mod stream;
pub mod types;

pub use http::{FetchError, NoProgress, Pacer, Progress, UpstreamClient};
pub use prices::{PriceHistory, PriceOutcome, WindowedPriceFetcher};
pub use stream::{CursorStreamIngester, StopReason, StreamBatch, StreamCursor};
pub use types::{normalize_ticker, PredictionSignal, PricePoint, StreamMessage};
