use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder (once per process) and register descriptions.
    /// Later calls reuse the same handle.
    pub fn init() -> anyhow::Result<Self> {
        let handle = HANDLE.get_or_try_init(|| -> anyhow::Result<PrometheusHandle> {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
            describe();
            Ok(handle)
        })?;
        Ok(Self {
            handle: handle.clone(),
        })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe() {
    describe_counter!(
        "upstream_requests_total",
        "Requests sent to the upstream price/stream endpoints."
    );
    describe_counter!(
        "upstream_auth_failures_total",
        "Upstream requests rejected with 401."
    );
    describe_counter!(
        "price_windows_failed_total",
        "Price windows skipped after a transient failure."
    );
    describe_counter!("stream_pages_total", "Stream pages decoded.");
    describe_counter!("stream_stops_total", "Finished stream walks by stop reason.");
    describe_counter!("classifier_failures_total", "Messages the classifier failed on.");
    describe_counter!(
        "sentiment_messages_total",
        "Classified messages by sentiment bucket."
    );
    describe_histogram!(
        "upstream_request_ms",
        "Upstream request latency in milliseconds."
    );
}
