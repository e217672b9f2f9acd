//! # Market pulse
//! Composes the two fetchers and the classifier into the three questions the
//! dashboard asks about a ticker: price history, recent messages, sentiment.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::analyze::{analyze_messages, ClassifierHandle, ScoredMessage, SentimentSummary};
use crate::config::upstream::UpstreamConfig;
use crate::ingest::http::{Pacer, Progress, UpstreamClient, NO_PROGRESS};
use crate::ingest::prices::{PriceHistory, PriceOutcome, WindowedPriceFetcher};
use crate::ingest::stream::{CursorStreamIngester, StopReason, StreamBatch};

pub const DEFAULT_PRICE_HORIZON_DAYS: u32 = 180;
pub const DEFAULT_SENTIMENT_CUTOFF_DAYS: u32 = 1;
pub const DEFAULT_SENTIMENT_MAX_PAGES: u32 = 20;
/// Daily candles barely move within the hour.
pub const PRICE_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
pub const SENTIMENT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// Sentiment for one ticker over a cutoff.
#[derive(Debug, Clone, Serialize)]
pub struct TickerSentiment {
    pub ticker: String,
    pub cutoff: NaiveDateTime,
    pub stop: StopReason,
    pub pages_fetched: u32,
    pub messages_seen: usize,
    pub unclassified: usize,
    /// `None` is "no data".
    pub summary: Option<SentimentSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scored: Vec<ScoredMessage>,
}

/// (ticker, days, max_pages, token). The token is part of the key so one
/// caller's authorized result is never served to another.
type CacheKey = (String, u32, u32, Option<String>);

/// Process-local store of recent results; expired entries are pruned on insert.
struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (Instant, V)>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        if self.ttl.is_zero() {
            return None;
        }
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|(at, _)| at.elapsed() < self.ttl)
            .map(|(_, v)| v.clone())
    }

    fn insert(&self, key: K, value: V) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, (at, _)| at.elapsed() < self.ttl);
        entries.insert(key, (Instant::now(), value));
    }
}

#[derive(Clone)]
pub struct MarketPulse {
    prices: Arc<WindowedPriceFetcher>,
    stream: Arc<CursorStreamIngester>,
    classifier: ClassifierHandle,
    default_token: Option<String>,
    price_cache: Arc<TtlCache<CacheKey, PriceHistory>>,
    sentiment_cache: Arc<TtlCache<CacheKey, TickerSentiment>>,
}

impl MarketPulse {
    pub fn new(
        prices: WindowedPriceFetcher,
        stream: CursorStreamIngester,
        classifier: ClassifierHandle,
        default_token: Option<String>,
    ) -> Self {
        Self {
            prices: Arc::new(prices),
            stream: Arc::new(stream),
            classifier,
            default_token: default_token.filter(|t| !t.trim().is_empty()),
            price_cache: Arc::new(TtlCache::new(PRICE_CACHE_TTL)),
            sentiment_cache: Arc::new(TtlCache::new(SENTIMENT_CACHE_TTL)),
        }
    }

    /// Replace the result cache lifetimes. `Duration::ZERO` disables a cache.
    pub fn with_cache_ttls(mut self, prices: Duration, sentiment: Duration) -> Self {
        self.price_cache = Arc::new(TtlCache::new(prices));
        self.sentiment_cache = Arc::new(TtlCache::new(sentiment));
        self
    }

    /// Both fetchers share one client and the configured pacing.
    pub fn from_config(cfg: &UpstreamConfig, classifier: ClassifierHandle) -> anyhow::Result<Self> {
        Self::with_pacer(cfg, cfg.pacer(), classifier)
    }

    pub fn with_pacer(
        cfg: &UpstreamConfig,
        pacer: Pacer,
        classifier: ClassifierHandle,
    ) -> anyhow::Result<Self> {
        let client = UpstreamClient::new(cfg)?;
        let prices =
            WindowedPriceFetcher::new(client.clone(), cfg.price_url.clone()).with_pacer(pacer);
        let stream = CursorStreamIngester::new(client, cfg.stream_url.clone()).with_pacer(pacer);
        info!(
            prices = prices.is_configured(),
            stream = stream.is_configured(),
            token = cfg.auth_token.is_some(),
            classifier = classifier.name(),
            "market pulse ready"
        );
        Ok(Self::new(prices, stream, classifier, cfg.auth_token.clone()))
    }

    pub fn classifier(&self) -> &ClassifierHandle {
        &self.classifier
    }

    /// Caller token first, then the configured one.
    pub fn resolve_token<'a>(&'a self, token: Option<&'a str>) -> Option<&'a str> {
        token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .or(self.default_token.as_deref())
    }

    fn cache_key(&self, ticker: &str, days: u32, max_pages: u32, token: Option<&str>) -> CacheKey {
        (
            ticker.to_string(),
            days,
            max_pages,
            self.resolve_token(token).map(str::to_string),
        )
    }

    /// Cached for [`PRICE_CACHE_TTL`]; only complete histories are kept.
    pub async fn price_history(
        &self,
        ticker: &str,
        horizon_days: u32,
        token: Option<&str>,
    ) -> PriceHistory {
        let key = self.cache_key(ticker, horizon_days, 0, token);
        if let Some(hit) = self.price_cache.get(&key) {
            debug!(ticker, horizon_days, "price history served from cache");
            return hit;
        }
        let history = self
            .prices
            .fetch(ticker, horizon_days, self.resolve_token(token))
            .await;
        if history.outcome == PriceOutcome::Complete {
            self.price_cache.insert(key, history.clone());
        }
        history
    }

    pub async fn price_history_until(
        &self,
        end: NaiveDate,
        ticker: &str,
        horizon_days: u32,
        token: Option<&str>,
        progress: &dyn Progress,
    ) -> PriceHistory {
        self.prices
            .fetch_until(end, ticker, horizon_days, self.resolve_token(token), progress)
            .await
    }

    pub async fn stream_messages(
        &self,
        ticker: &str,
        cutoff_days: u32,
        max_pages: u32,
        token: Option<&str>,
    ) -> StreamBatch {
        self.stream
            .fetch(ticker, cutoff_days, self.resolve_token(token), max_pages)
            .await
    }

    pub async fn stream_messages_at(
        &self,
        now: NaiveDateTime,
        ticker: &str,
        cutoff_days: u32,
        max_pages: u32,
        token: Option<&str>,
        progress: &dyn Progress,
    ) -> StreamBatch {
        self.stream
            .open_at(now, ticker, cutoff_days, self.resolve_token(token), max_pages, progress)
            .collect()
            .await
    }

    /// Ingest the last `cutoff_days` of messages and classify them.
    /// Cached for [`SENTIMENT_CACHE_TTL`] unless the walk failed or never ran.
    pub async fn sentiment(
        &self,
        ticker: &str,
        cutoff_days: u32,
        max_pages: u32,
        token: Option<&str>,
    ) -> TickerSentiment {
        let key = self.cache_key(ticker, cutoff_days, max_pages, token);
        if let Some(hit) = self.sentiment_cache.get(&key) {
            debug!(ticker, cutoff_days, "sentiment served from cache");
            return hit;
        }
        let now = Utc::now().naive_utc();
        let result = self
            .sentiment_at(now, ticker, cutoff_days, max_pages, token, &NO_PROGRESS)
            .await;
        if matches!(
            result.stop,
            StopReason::Cutoff | StopReason::Exhausted | StopReason::PageLimit
        ) {
            self.sentiment_cache.insert(key, result.clone());
        }
        result
    }

    pub async fn sentiment_at(
        &self,
        now: NaiveDateTime,
        ticker: &str,
        cutoff_days: u32,
        max_pages: u32,
        token: Option<&str>,
        progress: &dyn Progress,
    ) -> TickerSentiment {
        let cutoff = now - chrono::Duration::days(i64::from(cutoff_days));

        // No point spending upstream requests on text nobody can classify.
        if !self.classifier.is_available() {
            return TickerSentiment {
                ticker: ticker.to_string(),
                cutoff,
                stop: StopReason::ClassifierUnavailable,
                pages_fetched: 0,
                messages_seen: 0,
                unclassified: 0,
                summary: None,
                scored: Vec::new(),
            };
        }

        let batch = self
            .stream_messages_at(now, ticker, cutoff_days, max_pages, token, progress)
            .await;
        let messages_seen = batch.messages.len();
        progress.report(0.95, &format!("classifying {messages_seen} messages"));
        let report = analyze_messages(batch.messages, &self.classifier).await;
        progress.report(1.0, "done");

        info!(
            ticker,
            messages = messages_seen,
            classified = report.scored.len(),
            stop = batch.stop.as_str(),
            dominant = report.summary.as_ref().map(|s| s.dominant.as_str()).unwrap_or("none"),
            "sentiment computed"
        );

        TickerSentiment {
            ticker: ticker.to_string(),
            cutoff,
            stop: batch.stop,
            pages_fetched: batch.pages_fetched,
            messages_seen,
            unclassified: report.unclassified,
            summary: report.summary,
            scored: report.scored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline() -> MarketPulse {
        let client = UpstreamClient::with_client(reqwest::Client::new());
        MarketPulse::new(
            WindowedPriceFetcher::new(client.clone(), None),
            CursorStreamIngester::new(client, None),
            ClassifierHandle::Unavailable,
            Some("  ".into()),
        )
    }

    #[test]
    fn caller_token_wins_over_default() {
        let client = UpstreamClient::with_client(reqwest::Client::new());
        let p = MarketPulse::new(
            WindowedPriceFetcher::new(client.clone(), None),
            CursorStreamIngester::new(client, None),
            ClassifierHandle::Unavailable,
            Some("cfg".into()),
        );
        assert_eq!(p.resolve_token(Some("mine")), Some("mine"));
        assert_eq!(p.resolve_token(Some(" ")), Some("cfg"));
        assert_eq!(p.resolve_token(None), Some("cfg"));
        assert_eq!(offline().resolve_token(None), None);
    }

    #[tokio::test]
    async fn no_classifier_means_no_data_and_no_requests() {
        let s = offline().sentiment("BBCA", 1, 20, Some("tok")).await;
        assert!(s.summary.is_none());
        assert_eq!(s.pages_fetched, 0);
        assert_eq!(s.stop, StopReason::ClassifierUnavailable);
        assert_eq!(s.stop.as_str(), "classifier_unavailable");
    }

    #[test]
    fn cache_expires_and_zero_ttl_disables() {
        let c = TtlCache::new(Duration::from_millis(20));
        c.insert("k", 1);
        assert_eq!(c.get(&"k"), Some(1));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(c.get(&"k"), None);

        let off = TtlCache::new(Duration::ZERO);
        off.insert("k", 1);
        assert_eq!(off.get(&"k"), None);
    }
}
