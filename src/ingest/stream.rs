// src/ingest/stream.rs
//! Message stream ingestion: walks the upstream stream backwards in time with
//! opaque cursors and stops as soon as a message older than the cutoff shows up.

use std::collections::VecDeque;

use chrono::{Duration, NaiveDateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::ingest::http::{FetchError, Pacer, Progress, UpstreamClient, NO_PROGRESS};
use crate::ingest::types::{
    lenient_f64, lenient_u64, opaque_token, parse_timestamp, PredictionSignal, StreamMessage,
};

/// Messages requested per page.
pub const PAGE_SIZE: u32 = 20;

const ENDPOINT: &str = "stream";
const CATEGORY_ALL: &str = "STREAM_CATEGORY_ALL";
const DEFAULT_PLATFORM_LABEL: &str = "neutral";

/// Why a stream walk ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// A message older than the cutoff was reached.
    Cutoff,
    /// Empty page or no next cursor.
    Exhausted,
    /// `max_pages` requests were spent.
    PageLimit,
    /// A request failed; everything before it is kept.
    Error { error: FetchError },
    /// No base URL, token or ticker: nothing was requested.
    NotConfigured,
    /// The stream was left alone because nothing could classify it.
    ClassifierUnavailable,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cutoff => "cutoff",
            Self::Exhausted => "exhausted",
            Self::PageLimit => "page_limit",
            Self::Error { .. } => "error",
            Self::NotConfigured => "not_configured",
            Self::ClassifierUnavailable => "classifier_unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamBatch {
    /// Newest first, all at or after the cutoff.
    pub messages: Vec<StreamMessage>,
    pub stop: StopReason,
    pub pages_fetched: u32,
}

// --- wire shapes ---

#[derive(Debug, Deserialize)]
struct StreamEnvelope {
    #[serde(default)]
    data: Option<StreamData>,
}

#[derive(Debug, Deserialize)]
struct StreamData {
    /// Decoded per entry so one malformed message cannot sink the page.
    #[serde(default)]
    stream: Option<Vec<Value>>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    next_cursor: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    stream_id: Option<Value>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    content_original: Option<String>,
    #[serde(default)]
    user: Option<RawUser>,
    #[serde(default)]
    news_feed: Option<RawNewsFeed>,
    #[serde(default)]
    target_price: Option<Vec<RawTarget>>,
    #[serde(default, deserialize_with = "lenient_u64")]
    total_likes: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    total_replies: u64,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawNewsFeed {
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTarget {
    #[serde(default, deserialize_with = "lenient_f64")]
    last_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    target_price: Option<f64>,
}

impl StreamEnvelope {
    fn into_parts(self) -> (Vec<RawMessage>, Option<String>) {
        let Some(data) = self.data else {
            return (Vec::new(), None);
        };
        let next = data
            .pagination
            .as_ref()
            .and_then(|p| opaque_token(p.next_cursor.as_ref()));
        let messages = data
            .stream
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| match serde_json::from_value::<RawMessage>(v) {
                Ok(m) => Some(m),
                Err(e) => {
                    debug!(error = %e, "malformed stream message skipped");
                    None
                }
            })
            .collect();
        (messages, next)
    }
}

impl RawMessage {
    fn into_message(self, created_at: NaiveDateTime) -> StreamMessage {
        let signal = self
            .target_price
            .as_ref()
            .and_then(|t| t.first())
            .map(|t| PredictionSignal::from_quote(t.last_price, t.target_price))
            .unwrap_or_default();

        let content = self
            .content_original
            .filter(|c| !c.is_empty())
            .or(self.content)
            .unwrap_or_default();

        let platform_label = self
            .news_feed
            .and_then(|n| n.label)
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PLATFORM_LABEL.to_string());

        StreamMessage {
            id: opaque_token(self.stream_id.as_ref()).unwrap_or_default(),
            created_at,
            author: self.user.and_then(|u| u.username).unwrap_or_default(),
            content,
            platform_label,
            prediction_signal: signal,
            likes: self.total_likes,
            replies: self.total_replies,
        }
    }
}

enum State {
    Fetching,
    Stopped(StopReason),
}

/// Lazy, finite, non-restartable walk over one ticker's stream.
///
/// Pages are requested only when the buffered messages run out.
pub struct StreamCursor<'a> {
    ingester: &'a CursorStreamIngester,
    progress: &'a dyn Progress,
    url: String,
    token: String,
    cutoff: NaiveDateTime,
    max_pages: u32,
    cursor: Option<String>,
    pages_fetched: u32,
    buffer: VecDeque<StreamMessage>,
    state: State,
}

impl<'a> StreamCursor<'a> {
    /// Next message, newest first. `None` once the walk has stopped and drained.
    pub async fn next(&mut self) -> Option<StreamMessage> {
        loop {
            if let Some(msg) = self.buffer.pop_front() {
                return Some(msg);
            }
            if let State::Stopped(_) = self.state {
                return None;
            }
            self.fetch_page().await;
        }
    }

    /// Why the walk ended, once it has.
    pub fn stop_reason(&self) -> Option<&StopReason> {
        match &self.state {
            State::Stopped(r) => Some(r),
            State::Fetching => None,
        }
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    pub fn cutoff(&self) -> NaiveDateTime {
        self.cutoff
    }

    /// Drain the walk into a batch.
    pub async fn collect(mut self) -> StreamBatch {
        let mut messages = Vec::new();
        while let Some(m) = self.next().await {
            messages.push(m);
        }
        let stop = match self.state {
            State::Stopped(r) => r,
            State::Fetching => StopReason::Exhausted,
        };
        counter!("stream_stops_total", "reason" => stop.as_str()).increment(1);
        info!(
            url = %self.url,
            pages = self.pages_fetched,
            messages = messages.len(),
            stop = stop.as_str(),
            "stream ingestion finished"
        );
        StreamBatch {
            messages,
            stop,
            pages_fetched: self.pages_fetched,
        }
    }

    fn stop(&mut self, reason: StopReason) {
        debug!(reason = reason.as_str(), pages = self.pages_fetched, "stream stopped");
        self.state = State::Stopped(reason);
    }

    async fn fetch_page(&mut self) {
        if self.pages_fetched >= self.max_pages {
            self.stop(StopReason::PageLimit);
            return;
        }
        let ingester = self.ingester;
        if self.pages_fetched > 0 {
            ingester.pacer.pause().await;
        }

        let page_index = self.pages_fetched;
        self.pages_fetched += 1;
        self.progress.report(
            ((page_index + 1) as f32 / self.max_pages as f32).min(0.9),
            &format!("scanning stream (batch {})", page_index + 1),
        );

        let mut query = vec![
            ("category", CATEGORY_ALL.to_string()),
            ("limit", PAGE_SIZE.to_string()),
        ];
        if let Some(c) = &self.cursor {
            query.push(("last_stream_id", c.clone()));
        }

        let body = match ingester
            .client
            .get_json::<StreamEnvelope>(ENDPOINT, &self.url, &query, &self.token)
            .await
        {
            Ok(b) => b,
            Err(error) => {
                warn!(page = page_index + 1, %error, "stream page failed; keeping partial result");
                self.stop(StopReason::Error { error });
                return;
            }
        };
        counter!("stream_pages_total").increment(1);

        let (raw, next_cursor) = body.into_parts();
        if raw.is_empty() {
            self.stop(StopReason::Exhausted);
            return;
        }

        for msg in raw {
            let Some(ts) = msg.created_at.as_deref().and_then(parse_timestamp) else {
                debug!(page = page_index + 1, "message without parseable timestamp skipped");
                continue;
            };
            if ts < self.cutoff {
                // Pages are newest-first: nothing after this one is wanted.
                self.stop(StopReason::Cutoff);
                return;
            }
            self.buffer.push_back(msg.into_message(ts));
        }

        match next_cursor {
            Some(c) => self.cursor = Some(c),
            None => self.stop(StopReason::Exhausted),
        }
    }
}

pub struct CursorStreamIngester {
    client: UpstreamClient,
    base_url: Option<String>,
    pacer: Pacer,
}

impl CursorStreamIngester {
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

    /// All messages posted within the last `cutoff_days`, newest first.
    pub async fn fetch(
        &self,
        ticker: &str,
        cutoff_days: u32,
        auth_token: Option<&str>,
        max_pages: u32,
    ) -> StreamBatch {
        let now = Utc::now().naive_utc();
        self.open_at(now, ticker, cutoff_days, auth_token, max_pages, &NO_PROGRESS)
            .collect()
            .await
    }

    /// Start a lazy walk with `cutoff = now - cutoff_days`. No request is made
    /// until the first message is pulled.
    pub fn open_at<'a>(
        &'a self,
        now: NaiveDateTime,
        ticker: &str,
        cutoff_days: u32,
        auth_token: Option<&str>,
        max_pages: u32,
        progress: &'a dyn Progress,
    ) -> StreamCursor<'a> {
        let token = auth_token.map(str::trim).filter(|t| !t.is_empty());
        let ticker = ticker.trim();
        let cutoff = now - Duration::days(i64::from(cutoff_days));

        let (url, token, state) = match (self.base_url.as_deref(), token) {
            (Some(base), Some(token)) if !ticker.is_empty() => (
                format!("{}/{}", base.trim_end_matches('/'), ticker),
                token.to_string(),
                State::Fetching,
            ),
            _ => (
                String::new(),
                String::new(),
                State::Stopped(StopReason::NotConfigured),
            ),
        };

        StreamCursor {
            ingester: self,
            progress,
            url,
            token,
            cutoff,
            max_pages,
            cursor: None,
            pages_fetched: 0,
            buffer: VecDeque::new(),
            state,
        }
    }
}
