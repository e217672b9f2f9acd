// src/analyze/mod.rs
//! Sentiment over a batch of stream messages: text preparation, per-message
//! classification and the thresholded reduction.

pub mod aggregate;
pub mod classifier;

use metrics::counter;
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{debug, warn};

use crate::ingest::types::StreamMessage;

pub use aggregate::{
    aggregate, bucket_for, summarize, BucketCounts, SentimentBucket, SentimentSummary,
    CONFIDENCE_THRESHOLD,
};
pub use classifier::{
    build_classifier, truncate_chars, Classification, ClassifierHandle, ClassifyError,
    FixedClassifier, HttpClassifier, SentimentClassifier, MAX_INPUT_CHARS,
};

/// Clean message text for the model: decode entities, strip markup, collapse
/// whitespace, cap at [`MAX_INPUT_CHARS`].
pub fn prepare_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| {
        // Only things shaped like an element: a name right after `<` or `</`.
        regex::Regex::new(r"(?i)</?[a-z][a-z0-9]*(?:\s[^<>]*)?/?>").expect("tag regex")
    });
    out = re_tags.replace_all(&out, " ").to_string();

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("whitespace regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    truncate_chars(&out, MAX_INPUT_CHARS).to_string()
}

/// One message with the bucket its classification landed in.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredMessage {
    pub message: StreamMessage,
    pub label: String,
    pub score: f32,
    pub bucket: SentimentBucket,
}

#[derive(Debug, Clone, Serialize)]
pub struct SentimentReport {
    /// `None` when nothing could be classified ("no data").
    pub summary: Option<SentimentSummary>,
    pub scored: Vec<ScoredMessage>,
    /// Messages that were empty after preparation or failed to classify.
    pub unclassified: usize,
}

impl SentimentReport {
    fn empty(unclassified: usize) -> Self {
        Self {
            summary: None,
            scored: Vec::new(),
            unclassified,
        }
    }
}

/// Classify each message in order and reduce the batch.
///
/// An unavailable classifier yields "no data" without touching the messages.
/// Individual failures are counted and skipped.
pub async fn analyze_messages(
    messages: Vec<StreamMessage>,
    classifier: &ClassifierHandle,
) -> SentimentReport {
    let Some(positive) = classifier.positive_label().map(str::to_string) else {
        debug!(messages = messages.len(), "classifier unavailable; sentiment skipped");
        return SentimentReport::empty(messages.len());
    };

    let mut scored = Vec::with_capacity(messages.len());
    let mut unclassified = 0usize;

    for message in messages {
        let text = prepare_text(&message.content);
        if text.is_empty() {
            unclassified += 1;
            continue;
        }
        match classifier.classify(&text).await {
            Ok(Classification { label, score }) => {
                let bucket = bucket_for(&label, score, &positive);
                counter!("sentiment_messages_total", "bucket" => bucket.as_str()).increment(1);
                scored.push(ScoredMessage {
                    message,
                    label,
                    score,
                    bucket,
                });
            }
            Err(e) => {
                unclassified += 1;
                counter!("classifier_failures_total").increment(1);
                warn!(id = %message.id, error = %e, "message not classified");
            }
        }
    }

    SentimentReport {
        summary: summarize(scored.iter().map(|s| s.bucket)),
        scored,
        unclassified,
    }
}
