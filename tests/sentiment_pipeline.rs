// tests/sentiment_pipeline.rs
//
// Stream ingestion -> classification -> reduction through the facade, with a
// keyword classifier standing in for the model.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ticker_pulse::analyze::{
    analyze_messages, Classification, ClassifierHandle, ClassifyError, SentimentBucket,
    SentimentClassifier,
};
use ticker_pulse::engine::MarketPulse;
use ticker_pulse::ingest::prices::PriceOutcome;
use ticker_pulse::ingest::stream::StopReason;
use ticker_pulse::ingest::{
    CursorStreamIngester, NoProgress, UpstreamClient, WindowedPriceFetcher,
};

/// "naik" => confident positive, "turun" => confident negative,
/// "boom" => failure, anything else => low-confidence positive.
struct KeywordClassifier;

#[async_trait]
impl SentimentClassifier for KeywordClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, ClassifyError> {
        let (label, score) = if text.contains("boom") {
            return Err(ClassifyError::Request("model crashed".into()));
        } else if text.contains("naik") {
            ("LABEL_1", 0.93)
        } else if text.contains("turun") {
            ("LABEL_0", 0.88)
        } else {
            ("LABEL_1", 0.55)
        };
        Ok(Classification {
            label: label.into(),
            score,
        })
    }

    fn positive_label(&self) -> &str {
        "LABEL_1"
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 5, 10)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn msg(id: u64, created_at: &str, content: &str) -> Value {
    json!({"stream_id": id, "created_at": created_at, "content_original": content})
}

async fn pulse_with_stream(messages: Vec<Value>, classifier: ClassifierHandle) -> (MockServer, MarketPulse) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stream/BBCA"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"stream": messages, "pagination": {"next_cursor": null}}
        })))
        .mount(&server)
        .await;

    let client = UpstreamClient::with_client(reqwest::Client::new());
    let pulse = MarketPulse::new(
        WindowedPriceFetcher::new(client.clone(), None),
        CursorStreamIngester::new(client, Some(format!("{}/stream", server.uri()))),
        classifier,
        Some("configured-token".into()),
    );
    (server, pulse)
}

#[tokio::test]
async fn batch_reduces_to_bullish() {
    let (_server, pulse) = pulse_with_stream(
        vec![
            msg(6, "2025-05-10 11:00:00", "BBCA naik terus"),
            msg(5, "2025-05-10 10:00:00", "naik &amp; naik"),
            msg(4, "2025-05-10 09:00:00", "bakal turun"),
            msg(3, "2025-05-10 08:00:00", "hmm sideways"),
            msg(2, "2025-05-10 07:00:00", "   "),
            msg(1, "2025-05-10 06:00:00", "boom"),
        ],
        ClassifierHandle::available(KeywordClassifier),
    )
    .await;

    let s = pulse
        .sentiment_at(now(), "BBCA", 1, 20, None, &NoProgress)
        .await;

    assert_eq!(s.stop, StopReason::Exhausted);
    assert_eq!(s.messages_seen, 6);
    assert_eq!(s.unclassified, 2);

    let summary = s.summary.expect("classified messages");
    assert_eq!(summary.total, 4);
    assert_eq!(summary.counts.bullish, 2);
    assert_eq!(summary.counts.bearish, 1);
    assert_eq!(summary.counts.neutral, 1);
    assert_eq!(summary.dominant, SentimentBucket::Bullish);
    assert!((summary.bullish_pct - 50.0).abs() < 1e-9);

    let buckets: Vec<_> = s.scored.iter().map(|m| m.bucket).collect();
    assert_eq!(
        buckets,
        vec![
            SentimentBucket::Bullish,
            SentimentBucket::Bullish,
            SentimentBucket::Bearish,
            SentimentBucket::Neutral
        ]
    );
}

#[tokio::test]
async fn low_confidence_only_is_neutral() {
    let (_server, pulse) = pulse_with_stream(
        vec![
            msg(2, "2025-05-10 11:00:00", "meh"),
            msg(1, "2025-05-10 10:00:00", "whatever"),
        ],
        ClassifierHandle::available(KeywordClassifier),
    )
    .await;

    let s = pulse
        .sentiment_at(now(), "BBCA", 1, 20, None, &NoProgress)
        .await;
    let summary = s.summary.unwrap();
    assert_eq!(summary.dominant, SentimentBucket::Neutral);
    assert_eq!(summary.counts.neutral, 2);
    assert_eq!(summary.bullish_pct, 0.0);
}

#[tokio::test]
async fn no_messages_is_no_data() {
    let (_server, pulse) =
        pulse_with_stream(vec![], ClassifierHandle::available(KeywordClassifier)).await;
    let s = pulse
        .sentiment_at(now(), "BBCA", 1, 20, None, &NoProgress)
        .await;
    assert!(s.summary.is_none());
    assert_eq!(s.messages_seen, 0);
}

#[tokio::test]
async fn unavailable_classifier_skips_ingestion() {
    let (server, pulse) = pulse_with_stream(
        vec![msg(1, "2025-05-10 11:00:00", "naik")],
        ClassifierHandle::Unavailable,
    )
    .await;
    let s = pulse
        .sentiment_at(now(), "BBCA", 1, 20, None, &NoProgress)
        .await;
    assert!(s.summary.is_none());
    assert_eq!(s.stop, StopReason::ClassifierUnavailable);
    assert!(server.received_requests().await.unwrap().is_empty());

    // The raw messages are still reachable.
    let batch = pulse.stream_messages("BBCA", 3650, 20, None).await;
    assert_eq!(batch.messages.len(), 1);
    let report = analyze_messages(batch.messages, &ClassifierHandle::Unavailable).await;
    assert!(report.summary.is_none());
    assert_eq!(report.unclassified, 1);
}

#[tokio::test]
async fn repeat_requests_within_ttl_reuse_results() {
    let server = MockServer::start().await;
    let recent = (Utc::now().naive_utc() - chrono::Duration::minutes(5))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();
    Mock::given(method("GET"))
        .and(path("/stream/BBCA"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"stream": [msg(1, &recent, "naik")], "pagination": {"next_cursor": null}}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/prices/BBCA"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"result": [
                {"date": Utc::now().date_naive().to_string(), "open": 1, "high": 2, "low": 1, "close": 2}
            ]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = UpstreamClient::with_client(reqwest::Client::new());
    let pulse = MarketPulse::new(
        WindowedPriceFetcher::new(client.clone(), Some(format!("{}/prices", server.uri()))),
        CursorStreamIngester::new(client, Some(format!("{}/stream", server.uri()))),
        ClassifierHandle::available(KeywordClassifier),
        Some("configured-token".into()),
    );

    let first = pulse.sentiment("BBCA", 1, 20, None).await;
    let second = pulse.sentiment("BBCA", 1, 20, None).await;
    assert_eq!(first.summary, second.summary);
    assert_eq!(second.summary.unwrap().counts.bullish, 1);

    // One 30-day window, asked for twice.
    let a = pulse.price_history("BBCA", 30, None).await;
    let b = pulse.price_history("BBCA", 30, None).await;
    assert_eq!(a.outcome, PriceOutcome::Complete);
    assert_eq!(a, b);

    // A different token is a different cache entry.
    pulse.sentiment("BBCA", 1, 20, Some("other")).await;
    let stream_hits = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/stream/BBCA")
        .count();
    assert_eq!(stream_hits, 2);
}

#[tokio::test]
async fn zero_ttl_always_goes_upstream() {
    let (server, pulse) = pulse_with_stream(vec![], ClassifierHandle::available(KeywordClassifier)).await;
    let pulse = pulse.with_cache_ttls(Duration::ZERO, Duration::ZERO);
    pulse.sentiment("BBCA", 1, 20, None).await;
    pulse.sentiment("BBCA", 1, 20, None).await;
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}
