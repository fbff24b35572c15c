use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Installs the Prometheus recorder and registers series metadata.
    /// Call once at startup; the lock TTL is exported as a static gauge.
    pub fn init(lock_ttl_secs: u64) -> Self {
        let builder = PrometheusBuilder::new();

        let handle = builder
            .install_recorder()
            .expect("prometheus: install recorder");

        ensure_metrics_described();
        gauge!("ingest_lock_ttl_seconds").set(lock_ttl_secs as f64);

        Self { handle }
    }

    /// Returns a router exposing `/metrics` in Prometheus exposition format.
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

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_runs_total", "Ingest runs by outcome (completed/skipped).");
        describe_counter!("ingest_items_total", "Items parsed out of source feeds.");
        describe_counter!(
            "ingest_source_errors_total",
            "Source adapter fetch/parse failures."
        );
        describe_counter!(
            "ingest_records_total",
            "Record upserts by outcome (inserted/updated/skipped)."
        );
        describe_counter!(
            "ingest_record_failures_total",
            "Records that failed to persist."
        );
        describe_counter!("claims_recorded_total", "New revenue claims opened.");
        describe_counter!(
            "claims_corroborated_total",
            "Submissions that corroborated an existing claim."
        );
        describe_counter!("claims_failed_total", "Claim ingestions that failed.");
        describe_gauge!("ingest_lock_ttl_seconds", "Configured ingest lock TTL.");
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
    });
}
