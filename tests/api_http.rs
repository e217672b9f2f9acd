// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health, /sector/{ticker}
// - ticker validation (400)
// - data endpoints without a token answer "locked" (empty, 200)
// - X-Upstream-Token header reaches the upstream
// - watchlist add / list / remove, persisted to disk
// - a failed watchlist save leaves the served list untouched
// - /diversify picks from other sectors, none for an unknown ticker

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value as Json};
use tower::ServiceExt as _; // for `oneshot`
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ticker_pulse::analyze::{Classification, ClassifierHandle, FixedClassifier};
use ticker_pulse::api::{create_router, AppState};
use ticker_pulse::engine::MarketPulse;
use ticker_pulse::ingest::{CursorStreamIngester, UpstreamClient, WindowedPriceFetcher};
use ticker_pulse::sector::sector_for;
use ticker_pulse::watchlist::Watchlist;

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

fn bullish_classifier() -> ClassifierHandle {
    ClassifierHandle::available(FixedClassifier::new(
        Classification {
            label: "LABEL_1".into(),
            score: 0.9,
        },
        "LABEL_1",
    ))
}

fn test_router(base: Option<&str>, dir: &tempfile::TempDir) -> Router {
    let client = UpstreamClient::with_client(reqwest::Client::new());
    let pulse = MarketPulse::new(
        WindowedPriceFetcher::new(client.clone(), base.map(|b| format!("{b}/prices"))),
        CursorStreamIngester::new(client, base.map(|b| format!("{b}/stream"))),
        bullish_classifier(),
        None,
    );
    let wl = Watchlist::load(dir.path().join("watchlist.txt")).expect("load watchlist");
    create_router(AppState::new(pulse, wl))
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Json) {
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_returns_ok() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(None, &dir);
    let resp = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn sector_lookup_and_bad_ticker() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(None, &dir);

    let (status, body) = call(&app, get("/sector/bbca")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ticker": "BBCA", "sector": "Finance"}));

    let (status, body) = call(&app, get("/sector/NOPE")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sector"], "Unknown");

    let (status, body) = call(&app, get("/prices/bad%20ticker")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let (status, _) = call(&app, get("/prices/BBCA?days=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn locked_without_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = test_router(Some(&server.uri()), &dir);

    let (status, body) = call(&app, get("/prices/BBCA")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["points"], json!([]));
    assert_eq!(body["outcome"]["status"], "not_configured");
    assert_eq!(body["days"], 180);

    let (status, body) = call(&app, get("/sentiment/BBCA")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"], Json::Null);
    assert_eq!(body["stop"]["reason"], "not_configured");
}

#[tokio::test]
async fn header_token_is_forwarded() {
    let server = MockServer::start().await;
    let now = chrono::Utc::now().naive_utc();
    let recent = (now - chrono::Duration::minutes(5))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();

    Mock::given(method("GET"))
        .and(path("/stream/BBCA"))
        .and(header("authorization", "Bearer from-header"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "stream": [
                    {"stream_id": "a1", "created_at": recent, "content": "to the moon",
                     "target_price": [{"last_price": 100, "target_price": 130}]},
                    {"stream_id": "a2", "created_at": recent, "content": "still holding"}
                ],
                "pagination": {"next_cursor": null}
            }
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = test_router(Some(&server.uri()), &dir);

    let req = Request::get("/sentiment/BBCA?days=1")
        .header("x-upstream-token", "from-header")
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["dominant"], "BULLISH");
    assert_eq!(body["summary"]["total"], 2);
    assert_eq!(body["summary"]["bullish_pct"], 100.0);

    let req = Request::get("/stream/BBCA")
        .header("x-upstream-token", "from-header")
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    assert_eq!(body["signals"]["bullish_targets"], 1);
    assert_eq!(body["stop"]["reason"], "exhausted");
}

#[tokio::test]
async fn watchlist_crud_persists() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(None, &dir);

    let post = |t: &str| {
        Request::post(format!("/watchlist/{t}"))
            .body(Body::empty())
            .unwrap()
    };
    let delete = |t: &str| {
        Request::delete(format!("/watchlist/{t}"))
            .body(Body::empty())
            .unwrap()
    };

    let (status, body) = call(&app, post("goto")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);

    let (_, body) = call(&app, post("GOTO")).await;
    assert_eq!(body["changed"], false);

    call(&app, post("antm")).await;
    let (_, body) = call(&app, get("/watchlist")).await;
    assert_eq!(body["tickers"], json!(["GOTO", "ANTM"]));

    let (status, body) = call(&app, delete("goto")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tickers"], json!(["ANTM"]));

    let (status, _) = call(&app, delete("goto")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let on_disk = std::fs::read_to_string(dir.path().join("watchlist.txt")).unwrap();
    assert_eq!(on_disk, "ANTM\n");
}

#[tokio::test]
async fn diversify_suggests_other_sectors() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(None, &dir);

    let (status, body) = call(&app, get("/diversify/BBRI")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sector"], "Finance");
    let candidates = body["candidates"].as_array().unwrap();
    assert_eq!(candidates.len(), 3);
    for c in candidates {
        let t = c["ticker"].as_str().unwrap();
        assert_ne!(sector_for(t), "Finance");
        assert_eq!(c["sector"], sector_for(t));
        // No stream configured: every candidate is "no data".
        assert_eq!(c["summary"], Json::Null);
    }
}

#[tokio::test]
async fn diversify_unknown_sector_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(None, &dir);

    let (status, body) = call(&app, get("/diversify/ZZZZ")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sector"], "Unknown");
    assert_eq!(body["candidates"], json!([]));
}

#[tokio::test]
async fn failed_watchlist_save_keeps_memory_and_disk_in_step() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(None, &dir);

    let req = |m: &str, t: &str| {
        Request::builder()
            .method(m)
            .uri(format!("/watchlist/{t}"))
            .body(Body::empty())
            .unwrap()
    };

    let (status, _) = call(&app, req("POST", "BBCA")).await;
    assert_eq!(status, StatusCode::OK);

    // A directory where the temp file goes makes every save fail.
    std::fs::create_dir(dir.path().join("watchlist.txt.tmp")).unwrap();

    let (status, body) = call(&app, req("POST", "GOTO")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "internal_error");

    let (status, _) = call(&app, req("DELETE", "BBCA")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (_, body) = call(&app, get("/watchlist")).await;
    assert_eq!(body["tickers"], json!(["BBCA"]));
    let on_disk = std::fs::read_to_string(dir.path().join("watchlist.txt")).unwrap();
    assert_eq!(on_disk, "BBCA\n");
}
