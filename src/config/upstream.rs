// src/config/upstream.rs
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::ingest::http::Pacer;

pub const ENV_CONFIG_PATH: &str = "PULSE_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/pulse.toml";

pub const ENV_PRICE_URL: &str = "TARGET_PRICE_URL";
pub const ENV_STREAM_URL: &str = "TARGET_STREAM_URL";
pub const ENV_AUTH_TOKEN: &str = "TARGET_AUTH_TOKEN";
pub const ENV_PACING_MS: &str = "PULSE_PACING_MS";
pub const ENV_JITTER_MS: &str = "PULSE_JITTER_MS";

fn default_pacing_ms() -> u64 {
    50
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    "Mozilla/5.0".to_string()
}

/// Host, credential and pacing settings shared by both fetchers.
#[derive(Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub price_url: Option<String>,
    #[serde(default)]
    pub stream_url: Option<String>,
    /// Fallback token when a caller does not supply one.
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    #[serde(default)]
    pub jitter_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            price_url: None,
            stream_url: None,
            auth_token: None,
            pacing_ms: default_pacing_ms(),
            jitter_ms: 0,
            request_timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

// Keep the token out of logs.
impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("price_url", &self.price_url)
            .field("stream_url", &self.stream_url)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|t| format!("<{} chars>", t.len())),
            )
            .field("pacing_ms", &self.pacing_ms)
            .field("jitter_ms", &self.jitter_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl UpstreamConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: UpstreamConfig = toml::from_str(s).context("parsing upstream config toml")?;
        Ok(cfg.sanitized())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading upstream config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Resolution order:
    /// 1) $PULSE_CONFIG_PATH (must exist)
    /// 2) config/pulse.toml
    /// 3) built-in defaults
    ///
    /// then env overrides (`TARGET_*`, `PULSE_*`) on top.
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default_p.exists() {
                Self::load_from(&default_p)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env_overrides();
        Ok(cfg.sanitized())
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_nonempty(ENV_PRICE_URL) {
            self.price_url = Some(v);
        }
        if let Some(v) = env_nonempty(ENV_STREAM_URL) {
            self.stream_url = Some(v);
        }
        if let Some(v) = env_nonempty(ENV_AUTH_TOKEN) {
            self.auth_token = Some(v);
        }
        if let Some(v) = env_nonempty(ENV_PACING_MS).and_then(|v| v.parse().ok()) {
            self.pacing_ms = v;
        }
        if let Some(v) = env_nonempty(ENV_JITTER_MS).and_then(|v| v.parse().ok()) {
            self.jitter_ms = v;
        }
    }

    pub fn pacer(&self) -> Pacer {
        Pacer::jittered(
            Duration::from_millis(self.pacing_ms),
            Duration::from_millis(self.jitter_ms),
        )
    }

    fn sanitized(mut self) -> Self {
        fn clean(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }
        self.price_url = clean(self.price_url);
        self.stream_url = clean(self.stream_url);
        self.auth_token = clean(self.auth_token);
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = default_timeout_secs();
        }
        self
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
