//! Sentiment classifier capability: trait seam, availability handle, and the
//! concrete clients (HTTP inference server, fixed mock).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::classifier::ClassifierConfig;

/// Hard ceiling imposed by the model on input length, in characters.
pub const MAX_INPUT_CHARS: usize = 512;

/// Raw model output for one text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("classifier is not loaded")]
    Unavailable,
    #[error("classifier request failed: {0}")]
    Request(String),
    #[error("classifier returned no label")]
    EmptyResponse,
}

#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification, ClassifyError>;
    /// Label the model emits for positive polarity.
    fn positive_label(&self) -> &str;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Loaded once per process and shared by every caller.
#[derive(Clone)]
pub enum ClassifierHandle {
    Available(Arc<dyn SentimentClassifier>),
    Unavailable,
}

impl ClassifierHandle {
    pub fn available<C: SentimentClassifier + 'static>(c: C) -> Self {
        Self::Available(Arc::new(c))
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Available(c) => c.name(),
            Self::Unavailable => "unavailable",
        }
    }

    pub fn positive_label(&self) -> Option<&str> {
        match self {
            Self::Available(c) => Some(c.positive_label()),
            Self::Unavailable => None,
        }
    }

    /// Classify `text`, truncated to [`MAX_INPUT_CHARS`].
    pub async fn classify(&self, text: &str) -> Result<Classification, ClassifyError> {
        match self {
            Self::Available(c) => c.classify(truncate_chars(text, MAX_INPUT_CHARS)).await,
            Self::Unavailable => Err(ClassifyError::Unavailable),
        }
    }
}

impl std::fmt::Debug for ClassifierHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ClassifierHandle({})", self.name())
    }
}

/// Prefix of at most `max` characters, cut on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Factory: build a handle according to config and environment variables.
///
/// * If `CLASSIFIER_TEST_MODE=mock`, returns a deterministic mock classifier.
/// * Else if `config.enabled==false`, returns `Unavailable`.
/// * Else builds the HTTP inference client.
pub fn build_classifier(config: &ClassifierConfig) -> ClassifierHandle {
    if std::env::var("CLASSIFIER_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return ClassifierHandle::available(FixedClassifier::new(
            Classification {
                label: config.positive_label.clone(),
                score: 0.9,
            },
            config.positive_label.clone(),
        ));
    }

    if !config.enabled {
        return ClassifierHandle::Unavailable;
    }

    match HttpClassifier::from_config(config) {
        Ok(c) => ClassifierHandle::available(c),
        Err(e) => {
            tracing::warn!(error = %e, "classifier client could not be built");
            ClassifierHandle::Unavailable
        }
    }
}

// ------------------------------------------------------------
// HTTP inference server (text-classification pipeline behind a POST)
// ------------------------------------------------------------

pub struct HttpClassifier {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    positive_label: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Nested(Vec<Vec<Classification>>),
    Flat(Vec<Classification>),
    Single(Classification),
}

impl InferenceResponse {
    /// Highest-scoring label, whichever shape the server used.
    fn top(self) -> Option<Classification> {
        let all: Vec<Classification> = match self {
            Self::Nested(v) => v.into_iter().flatten().collect(),
            Self::Flat(v) => v,
            Self::Single(c) => vec![c],
        };
        all.into_iter()
            .filter(|c| c.score.is_finite())
            .max_by(|a, b| a.score.total_cmp(&b.score))
    }
}

impl HttpClassifier {
    pub fn from_config(cfg: &ClassifierConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: cfg.endpoint.clone(),
            api_key: cfg.api_key.clone(),
            positive_label: cfg.positive_label.clone(),
        })
    }
}

#[async_trait]
impl SentimentClassifier for HttpClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, ClassifyError> {
        #[derive(Serialize)]
        struct Req<'a> {
            inputs: &'a str,
        }

        let mut req = self.http.post(&self.endpoint).json(&Req { inputs: text });
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| ClassifyError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ClassifyError::Request(format!("HTTP {}", resp.status())));
        }
        let body: InferenceResponse = resp
            .json()
            .await
            .map_err(|e| ClassifyError::Request(format!("malformed body: {e}")))?;
        body.top().ok_or(ClassifyError::EmptyResponse)
    }

    fn positive_label(&self) -> &str {
        &self.positive_label
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Returns the same classification for every input; local runs and tests.
#[derive(Clone)]
pub struct FixedClassifier {
    pub fixed: Classification,
    positive_label: String,
}

impl FixedClassifier {
    pub fn new(fixed: Classification, positive_label: impl Into<String>) -> Self {
        Self {
            fixed,
            positive_label: positive_label.into(),
        }
    }
}

#[async_trait]
impl SentimentClassifier for FixedClassifier {
    async fn classify(&self, _text: &str) -> Result<Classification, ClassifyError> {
        Ok(self.fixed.clone())
    }

    fn positive_label(&self) -> &str {
        &self.positive_label
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "é".repeat(600);
        let t = truncate_chars(&s, MAX_INPUT_CHARS);
        assert_eq!(t.chars().count(), 512);
        assert_eq!(truncate_chars("short", 512), "short");
    }

    #[test]
    fn inference_shapes_pick_top_label() {
        let nested: InferenceResponse = serde_json::from_str(
            r#"[[{"label":"LABEL_0","score":0.2},{"label":"LABEL_1","score":0.8}]]"#,
        )
        .unwrap();
        assert_eq!(nested.top().unwrap().label, "LABEL_1");

        let flat: InferenceResponse =
            serde_json::from_str(r#"[{"label":"LABEL_0","score":0.91}]"#).unwrap();
        assert_eq!(flat.top().unwrap().score, 0.91);

        let single: InferenceResponse =
            serde_json::from_str(r#"{"label":"LABEL_1","score":0.5}"#).unwrap();
        assert_eq!(single.top().unwrap().label, "LABEL_1");

        let empty: InferenceResponse = serde_json::from_str("[]").unwrap();
        assert!(empty.top().is_none());
    }

    #[tokio::test]
    async fn unavailable_handle_refuses() {
        let h = ClassifierHandle::Unavailable;
        assert!(!h.is_available());
        assert_eq!(h.classify("x").await, Err(ClassifyError::Unavailable));
    }
}
