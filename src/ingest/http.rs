// src/ingest/http.rs
//! Plumbing shared by the price and stream fetchers: one reqwest client,
//! bearer auth, status classification, pacing and progress reporting.

use std::time::{Duration, Instant};

use anyhow::Context;
use metrics::{counter, histogram};
use rand::Rng;
use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::upstream::UpstreamConfig;

/// Per-request failure, split the way callers need to react to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchError {
    /// Upstream rejected the credential (HTTP 401).
    #[error("upstream rejected the auth token")]
    Auth,
    /// Network error, other non-200 status or an unreadable body.
    #[error("upstream request failed: {0}")]
    Transient(String),
}

#[derive(Clone)]
pub struct UpstreamClient {
    http: Client,
}

impl UpstreamClient {
    pub fn new(cfg: &UpstreamConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(cfg.user_agent.clone())
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(cfg.request_timeout_secs.max(1)))
            .build()
            .context("building upstream http client")?;
        Ok(Self { http })
    }

    /// Wrap an existing client (tests, custom TLS setups).
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }

    /// GET `url` with `query`, decode a JSON body.
    ///
    /// `endpoint` is a short static name used for metrics and logs only.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        url: &str,
        query: &[(&str, String)],
        token: &str,
    ) -> Result<T, FetchError> {
        let t0 = Instant::now();
        counter!("upstream_requests_total", "endpoint" => endpoint).increment(1);

        let sent = self
            .http
            .get(url)
            .header(header::AUTHORIZATION, bearer(token))
            .query(query)
            .send()
            .await;

        let result = match sent {
            Err(e) => Err(FetchError::Transient(e.to_string())),
            Ok(resp) => match resp.status() {
                StatusCode::UNAUTHORIZED => {
                    counter!("upstream_auth_failures_total", "endpoint" => endpoint).increment(1);
                    Err(FetchError::Auth)
                }
                StatusCode::OK => resp
                    .json::<T>()
                    .await
                    .map_err(|e| FetchError::Transient(format!("malformed body: {e}"))),
                s => Err(FetchError::Transient(format!("HTTP {s}"))),
            },
        };

        histogram!("upstream_request_ms", "endpoint" => endpoint)
            .record(t0.elapsed().as_secs_f64() * 1_000.0);
        tracing::debug!(endpoint, url, ok = result.is_ok(), "upstream GET");
        result
    }
}

/// Tokens pasted from a browser often already carry the scheme.
pub(crate) fn bearer(token: &str) -> String {
    let t = token.trim();
    if t.get(..7).is_some_and(|p| p.eq_ignore_ascii_case("bearer ")) {
        t.to_string()
    } else {
        format!("Bearer {t}")
    }
}

/// Courtesy delay between consecutive upstream requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pacer {
    base: Duration,
    jitter: Duration,
}

impl Pacer {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn fixed(base: Duration) -> Self {
        Self {
            base,
            jitter: Duration::ZERO,
        }
    }

    /// Sleep somewhere in `[base, base + jitter]`.
    pub fn jittered(base: Duration, jitter: Duration) -> Self {
        Self { base, jitter }
    }

    pub fn max_delay(&self) -> Duration {
        self.base + self.jitter
    }

    pub async fn pause(&self) {
        let extra_ms = match self.jitter.as_millis() as u64 {
            0 => 0,
            j => rand::rng().random_range(0..=j),
        };
        let total = self.base + Duration::from_millis(extra_ms);
        if !total.is_zero() {
            tokio::time::sleep(total).await;
        }
    }
}

/// Caller-visible progress. The fraction is advisory and carries no semantics.
pub trait Progress: Send + Sync {
    fn report(&self, fraction: f32, note: &str);
}

impl<F> Progress for F
where
    F: Fn(f32, &str) + Send + Sync,
{
    fn report(&self, fraction: f32, note: &str) {
        self(fraction, note)
    }
}

pub struct NoProgress;

impl Progress for NoProgress {
    fn report(&self, _fraction: f32, _note: &str) {}
}

pub(crate) static NO_PROGRESS: NoProgress = NoProgress;
