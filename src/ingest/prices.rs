// src/ingest/prices.rs
//! Daily price history, fetched by walking fixed-size date windows forward.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::ingest::http::{FetchError, Pacer, Progress, UpstreamClient, NO_PROGRESS};
use crate::ingest::types::{lenient_f64, parse_day, PricePoint};

/// Upper bound on the span of one window request.
pub const WINDOW_DAYS: i64 = 30;
/// Rows requested per window; one page is assumed to cover a whole window.
pub const PAGE_LIMIT: u32 = 50;

const ENDPOINT: &str = "prices";
const PERIOD_DAILY: &str = "HS_PERIOD_DAILY";

/// Half-open date range `[start, end)` covered by one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Partition `[end - horizon_days, end)` into consecutive windows of at most
/// [`WINDOW_DAYS`] days.
pub fn plan_windows(end: NaiveDate, horizon_days: u32) -> Vec<DateWindow> {
    let start = end - Duration::days(i64::from(horizon_days));
    let mut out = Vec::new();
    let mut cur = start;
    while cur < end {
        let next = (cur + Duration::days(WINDOW_DAYS)).min(end);
        out.push(DateWindow {
            start: cur,
            end: next,
        });
        cur = next;
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PriceOutcome {
    /// Every window answered.
    Complete,
    /// Some windows failed transiently and contributed nothing.
    Partial { failed_windows: usize },
    /// A window returned 401; the whole series was discarded.
    AuthRejected,
    /// No base URL, token or ticker: nothing was requested.
    NotConfigured,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceHistory {
    /// Ascending by date, unique dates.
    pub points: Vec<PricePoint>,
    pub outcome: PriceOutcome,
    pub windows_requested: usize,
}

impl PriceHistory {
    fn empty(outcome: PriceOutcome, windows_requested: usize) -> Self {
        Self {
            points: Vec::new(),
            outcome,
            windows_requested,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn into_points(self) -> Vec<PricePoint> {
        self.points
    }
}

// --- wire shapes ---

#[derive(Debug, Deserialize)]
struct PriceEnvelope {
    #[serde(default)]
    data: Option<PriceData>,
}

#[derive(Debug, Deserialize)]
struct PriceData {
    /// Decoded per row so one malformed row cannot sink the window.
    #[serde(default)]
    result: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct RawPriceRow {
    #[serde(default)]
    date: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    open: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    high: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    low: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    close: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    volume: Option<f64>,
}

impl RawPriceRow {
    fn into_point(self) -> Option<PricePoint> {
        Some(PricePoint {
            date: parse_day(self.date.as_deref()?)?,
            open: self.open?,
            high: self.high?,
            low: self.low?,
            close: self.close?,
            volume: self.volume,
        })
    }
}

impl PriceEnvelope {
    fn into_points(self) -> Vec<PricePoint> {
        self.data
            .and_then(|d| d.result)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| match serde_json::from_value::<RawPriceRow>(v) {
                Ok(row) => row.into_point(),
                Err(e) => {
                    debug!(error = %e, "malformed price row skipped");
                    None
                }
            })
            .collect()
    }
}

/// Collapse duplicate dates (last write wins) and sort ascending.
pub fn dedup_sorted(rows: Vec<PricePoint>) -> Vec<PricePoint> {
    let mut by_day: BTreeMap<NaiveDate, PricePoint> = BTreeMap::new();
    for row in rows {
        by_day.insert(row.date, row);
    }
    by_day.into_values().collect()
}

pub struct WindowedPriceFetcher {
    client: UpstreamClient,
    base_url: Option<String>,
    pacer: Pacer,
}

impl WindowedPriceFetcher {
    pub fn new(client: UpstreamClient, base_url: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.filter(|u| !u.trim().is_empty()),
            pacer: Pacer::none(),
        }
    }

    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    /// History for `[today - horizon_days, today)` (UTC calendar).
    pub async fn fetch(
        &self,
        ticker: &str,
        horizon_days: u32,
        auth_token: Option<&str>,
    ) -> PriceHistory {
        let today = Utc::now().date_naive();
        self.fetch_until(today, ticker, horizon_days, auth_token, &NO_PROGRESS)
            .await
    }

    /// Same as [`fetch`](Self::fetch) with an explicit end day and progress sink.
    /// Never fails: degrades to an empty or partial series.
    pub async fn fetch_until(
        &self,
        end: NaiveDate,
        ticker: &str,
        horizon_days: u32,
        auth_token: Option<&str>,
        progress: &dyn Progress,
    ) -> PriceHistory {
        let token = auth_token.map(str::trim).filter(|t| !t.is_empty());
        let ticker = ticker.trim();
        let (Some(base), Some(token)) = (self.base_url.as_deref(), token) else {
            return PriceHistory::empty(PriceOutcome::NotConfigured, 0);
        };
        if ticker.is_empty() {
            return PriceHistory::empty(PriceOutcome::NotConfigured, 0);
        }

        let url = format!("{}/{}", base.trim_end_matches('/'), ticker);
        let windows = plan_windows(end, horizon_days);
        let total_days = horizon_days.max(1) as f32;
        let mut rows: Vec<PricePoint> = Vec::new();
        let mut failed = 0usize;

        for (i, w) in windows.iter().enumerate() {
            if i > 0 {
                self.pacer.pause().await;
            }

            let query = [
                ("period", PERIOD_DAILY.to_string()),
                ("start_date", w.start.format("%Y-%m-%d").to_string()),
                ("end_date", w.end.format("%Y-%m-%d").to_string()),
                ("limit", PAGE_LIMIT.to_string()),
                ("page", "1".to_string()),
            ];

            match self
                .client
                .get_json::<PriceEnvelope>(ENDPOINT, &url, &query, token)
                .await
            {
                Ok(body) => rows.extend(body.into_points()),
                Err(FetchError::Auth) => {
                    warn!(ticker, window_start = %w.start, "price fetch aborted: auth rejected");
                    return PriceHistory::empty(PriceOutcome::AuthRejected, i + 1);
                }
                Err(FetchError::Transient(reason)) => {
                    failed += 1;
                    counter!("price_windows_failed_total").increment(1);
                    warn!(ticker, window_start = %w.start, %reason, "price window skipped");
                }
            }

            let done = (w.end - windows[0].start).num_days() as f32;
            progress.report((done / total_days).min(1.0), &format!("prices through {}", w.end));
        }

        let points = dedup_sorted(rows);
        let outcome = if failed == 0 {
            PriceOutcome::Complete
        } else {
            PriceOutcome::Partial {
                failed_windows: failed,
            }
        };
        info!(
            ticker,
            windows = windows.len(),
            failed,
            points = points.len(),
            "price history fetched"
        );

        PriceHistory {
            points,
            outcome,
            windows_requested: windows.len(),
        }
    }
}
