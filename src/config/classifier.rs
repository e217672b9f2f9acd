// src/config/classifier.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

pub const ENV_CLASSIFIER_CONFIG_PATH: &str = "CLASSIFIER_CONFIG_PATH";
pub const DEFAULT_CLASSIFIER_CONFIG_PATH: &str = "config/classifier.json";

fn default_positive_label() -> String {
    "LABEL_1".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub enabled: bool,
    /// Inference endpoint accepting `{"inputs": "<text>"}`.
    #[serde(default)]
    pub endpoint: String,
    /// Label the model uses for positive polarity.
    #[serde(default = "default_positive_label")]
    pub positive_label: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// "ENV" means: read from CLASSIFIER_API_KEY. Empty means no auth header.
    #[serde(default)]
    pub api_key: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            positive_label: default_positive_label(),
            timeout_secs: default_timeout_secs(),
            api_key: String::new(),
        }
    }
}

impl ClassifierConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut cfg: ClassifierConfig = serde_json::from_str(&data)?;

        if cfg.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.api_key = env::var("CLASSIFIER_API_KEY")
                .map_err(|_| anyhow::anyhow!("Missing CLASSIFIER_API_KEY env var"))?;
        }

        cfg.endpoint = cfg.endpoint.trim().to_string();
        if cfg.enabled && cfg.endpoint.is_empty() {
            anyhow::bail!("classifier enabled but no endpoint configured");
        }
        if cfg.positive_label.trim().is_empty() {
            cfg.positive_label = default_positive_label();
        }
        if cfg.timeout_secs == 0 {
            cfg.timeout_secs = default_timeout_secs();
        }

        Ok(cfg)
    }

    /// `$CLASSIFIER_CONFIG_PATH` or `config/classifier.json`; any failure yields
    /// a disabled config so the app still serves prices and raw messages.
    pub fn load_default() -> Self {
        let path = env::var(ENV_CLASSIFIER_CONFIG_PATH)
            .unwrap_or_else(|_| DEFAULT_CLASSIFIER_CONFIG_PATH.to_string());
        match Self::load_from_file(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(%path, error = %e, "classifier config unavailable; sentiment disabled");
                Self::default()
            }
        }
    }
}
