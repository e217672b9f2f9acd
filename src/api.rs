use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::analyze::SentimentSummary;
use crate::engine::{
    MarketPulse, TickerSentiment, DEFAULT_PRICE_HORIZON_DAYS, DEFAULT_SENTIMENT_CUTOFF_DAYS,
    DEFAULT_SENTIMENT_MAX_PAGES,
};
use crate::export::{tally_signals, SignalTally};
use crate::ingest::prices::PriceHistory;
use crate::ingest::stream::StreamBatch;
use crate::ingest::types::normalize_ticker;
use crate::sector::{diversification_candidates, sector_for};
use crate::watchlist::Watchlist;

/// Per-request upstream credential; falls back to the configured token.
pub const TOKEN_HEADER: &str = "x-upstream-token";

const MAX_DAYS: u32 = 3650;
const MAX_PAGES: u32 = 500;

#[derive(Clone)]
pub struct AppState {
    pub pulse: MarketPulse,
    pub watchlist: Arc<Mutex<Watchlist>>,
}

impl AppState {
    pub fn new(pulse: MarketPulse, watchlist: Watchlist) -> Self {
        Self {
            pulse,
            watchlist: Arc::new(Mutex::new(watchlist)),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/prices/{ticker}", get(prices))
        .route("/sentiment/{ticker}", get(sentiment))
        .route("/stream/{ticker}", get(stream))
        .route("/sector/{ticker}", get(sector))
        .route("/diversify/{ticker}", get(diversify))
        .route("/watchlist", get(watchlist_list))
        .route(
            "/watchlist/{ticker}",
            post(watchlist_add).delete(watchlist_remove),
        )
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

// --- errors ---

#[derive(Debug)]
pub enum ApiError {
    /// 400 - invalid ticker or query
    BadRequest(String),
    /// 404 - nothing to act on
    NotFound(String),
    /// 500 - local I/O failure
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, "bad_request", m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", m),
        };
        (status, Json(ErrorBody { error, message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{err:#}"))
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn ticker_param(raw: &str) -> Result<String, ApiError> {
    normalize_ticker(raw).ok_or_else(|| ApiError::BadRequest(format!("invalid ticker {raw:?}")))
}

fn days_param(v: Option<u32>, default: u32) -> Result<u32, ApiError> {
    match v.unwrap_or(default) {
        d @ 1..=MAX_DAYS => Ok(d),
        d => Err(ApiError::BadRequest(format!(
            "days must be between 1 and {MAX_DAYS}, got {d}"
        ))),
    }
}

fn token_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

// --- handlers ---

#[derive(Deserialize)]
struct DaysQuery {
    #[serde(default)]
    days: Option<u32>,
    #[serde(default)]
    max_pages: Option<u32>,
}

#[derive(Serialize)]
struct PricesOut {
    ticker: String,
    sector: &'static str,
    days: u32,
    #[serde(flatten)]
    history: PriceHistory,
}

async fn prices(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(q): Query<DaysQuery>,
    headers: HeaderMap,
) -> ApiResult<PricesOut> {
    let ticker = ticker_param(&ticker)?;
    let days = days_param(q.days, DEFAULT_PRICE_HORIZON_DAYS)?;
    let history = state
        .pulse
        .price_history(&ticker, days, token_header(&headers))
        .await;
    Ok(Json(PricesOut {
        sector: sector_for(&ticker),
        ticker,
        days,
        history,
    }))
}

async fn sentiment(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(q): Query<DaysQuery>,
    headers: HeaderMap,
) -> ApiResult<TickerSentiment> {
    let ticker = ticker_param(&ticker)?;
    let days = days_param(q.days, DEFAULT_SENTIMENT_CUTOFF_DAYS)?;
    let max_pages = q
        .max_pages
        .unwrap_or(DEFAULT_SENTIMENT_MAX_PAGES)
        .min(MAX_PAGES);
    let mut out = state
        .pulse
        .sentiment(&ticker, days, max_pages, token_header(&headers))
        .await;
    // Per-message detail belongs to /stream.
    out.scored.clear();
    Ok(Json(out))
}

#[derive(Serialize)]
struct StreamOut {
    ticker: String,
    days: u32,
    signals: SignalTally,
    #[serde(flatten)]
    batch: StreamBatch,
}

async fn stream(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(q): Query<DaysQuery>,
    headers: HeaderMap,
) -> ApiResult<StreamOut> {
    let ticker = ticker_param(&ticker)?;
    let days = days_param(q.days, DEFAULT_SENTIMENT_CUTOFF_DAYS)?;
    let max_pages = q
        .max_pages
        .unwrap_or(DEFAULT_SENTIMENT_MAX_PAGES)
        .min(MAX_PAGES);
    let batch = state
        .pulse
        .stream_messages(&ticker, days, max_pages, token_header(&headers))
        .await;
    Ok(Json(StreamOut {
        ticker,
        days,
        signals: tally_signals(&batch.messages),
        batch,
    }))
}

#[derive(Serialize)]
struct SectorOut {
    ticker: String,
    sector: &'static str,
}

async fn sector(Path(ticker): Path<String>) -> ApiResult<SectorOut> {
    let ticker = ticker_param(&ticker)?;
    Ok(Json(SectorOut {
        sector: sector_for(&ticker),
        ticker,
    }))
}

#[derive(Serialize)]
struct Candidate {
    ticker: &'static str,
    sector: &'static str,
    /// `None` is "no data".
    summary: Option<SentimentSummary>,
}

#[derive(Serialize)]
struct DiversifyOut {
    ticker: String,
    sector: &'static str,
    candidates: Vec<Candidate>,
}

async fn diversify(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(q): Query<DaysQuery>,
    headers: HeaderMap,
) -> ApiResult<DiversifyOut> {
    let ticker = ticker_param(&ticker)?;
    let days = days_param(q.days, DEFAULT_SENTIMENT_CUTOFF_DAYS)?;
    let max_pages = q
        .max_pages
        .unwrap_or(DEFAULT_SENTIMENT_MAX_PAGES)
        .min(MAX_PAGES);
    let sector = sector_for(&ticker);
    let picks = diversification_candidates(sector, &[ticker.clone()], &mut rand::rng());

    let token = token_header(&headers);
    let mut candidates = Vec::with_capacity(picks.len());
    for pick in picks {
        let s = state.pulse.sentiment(pick, days, max_pages, token).await;
        candidates.push(Candidate {
            ticker: pick,
            sector: sector_for(pick),
            summary: s.summary,
        });
    }

    Ok(Json(DiversifyOut {
        ticker,
        sector,
        candidates,
    }))
}

#[derive(Serialize)]
struct WatchlistOut {
    tickers: Vec<String>,
    changed: bool,
}

fn lock_watchlist(state: &AppState) -> Result<std::sync::MutexGuard<'_, Watchlist>, ApiError> {
    state
        .watchlist
        .lock()
        .map_err(|_| ApiError::Internal("watchlist lock poisoned".into()))
}

async fn watchlist_list(State(state): State<AppState>) -> ApiResult<WatchlistOut> {
    let wl = lock_watchlist(&state)?;
    Ok(Json(WatchlistOut {
        tickers: wl.tickers().to_vec(),
        changed: false,
    }))
}

async fn watchlist_add(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> ApiResult<WatchlistOut> {
    let ticker = ticker_param(&ticker)?;
    let mut wl = lock_watchlist(&state)?;
    // Persist a copy first; memory only moves once the file has.
    let mut next = wl.clone();
    let changed = next.add(&ticker)?;
    if changed {
        next.save()?;
        *wl = next;
    }
    Ok(Json(WatchlistOut {
        tickers: wl.tickers().to_vec(),
        changed,
    }))
}

async fn watchlist_remove(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> ApiResult<WatchlistOut> {
    let ticker = ticker_param(&ticker)?;
    let mut wl = lock_watchlist(&state)?;
    let mut next = wl.clone();
    if !next.remove(&ticker) {
        return Err(ApiError::NotFound(format!("{ticker} is not on the watchlist")));
    }
    next.save()?;
    *wl = next;
    Ok(Json(WatchlistOut {
        tickers: wl.tickers().to_vec(),
        changed: true,
    }))
}
