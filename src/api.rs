use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::claims::{ClaimIngestor, ClaimSubmission, SubjectRequired};
use crate::confidence::{EvidenceType, VerificationFlags};
use crate::extract::{parse_revenue_claim, RevenueClaim, STATED_CONFIDENCE};
use crate::pipeline::{Pipeline, RunOutcome};
use crate::store::{ClaimStore, RecordStore};

const DEFAULT_RECENT_LIMIT: u32 = 20;
const MAX_RECENT_LIMIT: u32 = 100;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub claims: Arc<ClaimIngestor>,
    pub records: Arc<dyn RecordStore>,
    pub claim_store: Arc<dyn ClaimStore>,
    pub cron_secret: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/cron/ingest", get(trigger_ingest))
        .route("/ingest/run", post(trigger_ingest))
        .route("/claims", post(submit_claim))
        .route("/claims/recent", get(recent_claims))
        .route("/records/recent", get(recent_records))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Bearer-token check for the protected endpoints. No configured secret
/// means "unprotected": the request is allowed and a warning logged,
/// never denied.
fn check_secret(headers: &HeaderMap, configured: Option<&str>) -> Result<(), Response> {
    let Some(expected) = configured else {
        tracing::warn!(target: "api", "no trigger secret configured, allowing unauthenticated request");
        return Ok(());
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    if presented == expected {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid or missing credential" })),
        )
            .into_response())
    }
}

/// Shared handler for the periodic (`GET /cron/ingest`) and manual
/// (`POST /ingest/run`) triggers. Contention is 409, not an error; 500
/// is reserved for a lock-store failure.
async fn trigger_ingest(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(rejection) = check_secret(&headers, state.cron_secret.as_deref()) {
        return rejection;
    }

    match state.pipeline.run().await {
        Ok(RunOutcome::Completed(report)) => (
            StatusCode::OK,
            Json(json!({ "status": "completed", "report": report })),
        )
            .into_response(),
        Ok(RunOutcome::Skipped) => (
            StatusCode::CONFLICT,
            Json(json!({
                "status": "skipped",
                "detail": "ingest lock is held by another run"
            })),
        )
            .into_response(),
        Err(err) => {
            tracing::error!(target: "api", "ingest trigger failed: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "detail": format!("{err:#}") })),
            )
                .into_response()
        }
    }
}

#[derive(Deserialize)]
struct SubmitClaimReq {
    subject_name: Option<String>,
    subject_url: Option<String>,
    /// Free text run through the extractor.
    text: Option<String>,
    /// Explicit value, used only when extraction finds nothing.
    monthly_cents: Option<i64>,
    source_url: String,
    source_date: Option<DateTime<Utc>>,
    evidence_type: Option<EvidenceType>,
    #[serde(default)]
    processor_verified: bool,
    #[serde(default)]
    public_dashboard: bool,
}

#[derive(Serialize)]
struct SubmitClaimResp {
    claim_id: i64,
    corroborated: bool,
    confidence_level: &'static str,
    confidence_score: u8,
}

async fn submit_claim(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SubmitClaimReq>,
) -> Response {
    if let Err(rejection) = check_secret(&headers, state.cron_secret.as_deref()) {
        return rejection;
    }

    let parsed = req.text.as_deref().and_then(parse_revenue_claim);
    let claim = match (parsed, req.monthly_cents) {
        (Some(claim), _) => claim,
        (None, Some(monthly_cents)) => RevenueClaim {
            monthly_cents,
            annual_cents: None,
            derived_from_annual: false,
            aspirational: false,
            extractor_confidence: STATED_CONFIDENCE,
        },
        (None, None) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({
                    "error": "no revenue claim found in text and no explicit monthly_cents given"
                })),
            )
                .into_response();
        }
    };

    let submission = ClaimSubmission {
        subject_name: req.subject_name.as_deref(),
        subject_url: req.subject_url.as_deref(),
        claim,
        evidence_type: req.evidence_type.unwrap_or(EvidenceType::SelfReported),
        flags: VerificationFlags {
            processor_verified: req.processor_verified,
            public_dashboard: req.public_dashboard,
        },
        source_url: &req.source_url,
        source_date: req.source_date,
        raw_text: req.text.as_deref().unwrap_or(""),
    };

    match state.claims.ingest(submission).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(SubmitClaimResp {
                claim_id: outcome.claim_id,
                corroborated: outcome.corroborated,
                confidence_level: outcome.level.as_str(),
                confidence_score: outcome.score,
            }),
        )
            .into_response(),
        Err(err) if err.is::<SubjectRequired>() => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
        Err(err) => {
            tracing::error!(target: "api", "claim submission failed: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "storage failure" })),
            )
                .into_response()
        }
    }
}

#[derive(Deserialize)]
struct RecentParams {
    limit: Option<u32>,
}

fn clamp_limit(params: &RecentParams) -> u32 {
    params.limit.unwrap_or(DEFAULT_RECENT_LIMIT).clamp(1, MAX_RECENT_LIMIT)
}

async fn recent_claims(
    State(state): State<AppState>,
    Query(params): Query<RecentParams>,
) -> Response {
    match state.claim_store.recent(clamp_limit(&params)).await {
        Ok(rows) => Json(rows).into_response(),
        Err(err) => {
            tracing::error!(target: "api", "listing recent claims failed: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "storage failure" })),
            )
                .into_response()
        }
    }
}

async fn recent_records(
    State(state): State<AppState>,
    Query(params): Query<RecentParams>,
) -> Response {
    match state.records.recent(clamp_limit(&params)).await {
        Ok(rows) => Json(rows).into_response(),
        Err(err) => {
            tracing::error!(target: "api", "listing recent records failed: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "storage failure" })),
            )
                .into_response()
        }
    }
}
