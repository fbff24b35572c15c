// tests/metrics_http.rs
//
// Prometheus exposition through the merged router. The recorder is
// process-global, so both tests share one install and only assert
// series presence, never exact values.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use once_cell::sync::Lazy;
use tower::ServiceExt as _;

use claimwatch::api::{self, AppState};
use claimwatch::claims::ClaimIngestor;
use claimwatch::classify::HeuristicClassifier;
use claimwatch::extract::ToolVocabulary;
use claimwatch::lock::LockManager;
use claimwatch::metrics::Metrics;
use claimwatch::pipeline::Pipeline;
use claimwatch::store::SqliteStore;
use claimwatch::upsert::RecordEngine;

static METRICS: Lazy<Metrics> = Lazy::new(|| Metrics::init(900));

async fn full_app() -> Router {
    let store = Arc::new(SqliteStore::in_memory().await.expect("store"));
    let engine = RecordEngine::new(
        store.clone(),
        Arc::new(HeuristicClassifier),
        ToolVocabulary::load_default(),
    );
    let claims = Arc::new(ClaimIngestor::new(
        store.clone(),
        store.clone(),
        store.clone(),
    ));
    let pipeline = Arc::new(Pipeline::new(
        LockManager::new(store.clone()),
        Vec::new(),
        engine,
        claims.clone(),
        Duration::from_secs(60),
    ));
    let state = AppState {
        pipeline,
        claims,
        records: store.clone(),
        claim_store: store,
        cron_secret: None,
    };
    api::router(state).merge(METRICS.router())
}

async fn scrape(app: Router) -> String {
    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).expect("build request"))
        .await
        .expect("oneshot /metrics");
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), 1_048_576)
        .await
        .expect("read exposition")
        .to_vec();
    String::from_utf8(bytes).expect("utf8 exposition")
}

#[tokio::test]
async fn exposition_carries_the_lock_ttl_gauge() {
    let app = full_app().await;
    let text = scrape(app).await;
    assert!(
        text.contains("ingest_lock_ttl_seconds"),
        "missing lock ttl gauge\n{text}"
    );
}

#[tokio::test]
async fn run_and_claim_counters_show_up_after_traffic() {
    let app = full_app().await;

    let resp = app
        .clone()
        .oneshot(Request::get("/cron/ingest").body(Body::empty()).expect("build request"))
        .await
        .expect("oneshot trigger");
    assert_eq!(resp.status(), StatusCode::OK);

    let claim = serde_json::json!({
        "subject_name": "SnapLedger",
        "text": "SnapLedger crossed $6,200 MRR",
        "source_url": "https://makerlog.example/posts/1"
    });
    let resp = app
        .clone()
        .oneshot(
            Request::post("/claims")
                .header("content-type", "application/json")
                .body(Body::from(claim.to_string()))
                .expect("build request"),
        )
        .await
        .expect("oneshot claim");
    assert_eq!(resp.status(), StatusCode::OK);

    let text = scrape(app).await;
    for needle in ["ingest_runs_total", "claims_recorded_total"] {
        assert!(
            text.contains(needle),
            "metrics exposition missing '{needle}'\n{text}"
        );
    }
}
