//! Ticker pulse service: binary entrypoint.
//! Boots the Axum HTTP server with the market data routes and `/metrics`.

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ticker_pulse::analyze::build_classifier;
use ticker_pulse::api::{create_router, AppState};
use ticker_pulse::config::{ClassifierConfig, UpstreamConfig};
use ticker_pulse::engine::MarketPulse;
use ticker_pulse::metrics::Metrics;
use ticker_pulse::watchlist::Watchlist;

/// Compact logs; `RUST_LOG` overrides the default filter. A no-op if the
/// runtime already installed a subscriber.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ticker_pulse=info,warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let upstream = UpstreamConfig::load_default()?;
    tracing::info!(config = ?upstream, "upstream config loaded");

    let classifier = build_classifier(&ClassifierConfig::load_default());
    let pulse = MarketPulse::from_config(&upstream, classifier)?;
    let watchlist = Watchlist::load(Watchlist::default_path())?;

    let metrics = Metrics::init()?;
    let router = create_router(AppState::new(pulse, watchlist)).merge(metrics.router());

    Ok(router.into())
}
