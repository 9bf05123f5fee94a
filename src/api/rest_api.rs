use crate::api::metrics::Metrics;
use crate::core::engine_handle::EngineHandle;
use crate::core::hash_key::HashKey;
use crate::core::suppression_engine::EngineStats;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::error;

/// Upper bound on values per batch check request
pub const MAX_BATCH_VALUES: usize = 10_000;

#[derive(Clone)]
pub struct ApiState {
    pub handle: Arc<EngineHandle>,
    pub metrics: Arc<Metrics>,
}

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub value: String,
    pub suppressed: bool,
}

#[derive(Debug, Deserialize)]
pub struct BatchCheckRequest {
    pub values: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchCheckResponse {
    pub results: Vec<CheckResult>,
    pub suppressed: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub version: u64,
    #[serde(flatten)]
    pub stats: EngineStats,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: u64,
    pub entries: u64,
}

/// Check a single address or md5 digest
async fn check_one(
    State(state): State<ApiState>,
    Query(query): Query<CheckQuery>,
) -> Json<CheckResult> {
    let engine = state.handle.load();
    let outcome = engine.check(&HashKey::from_address_or_hash(&query.value));
    state.metrics.record_outcome(outcome);
    Json(CheckResult {
        value: query.value,
        suppressed: outcome.is_suppressed(),
    })
}

/// Check many values against one engine snapshot
async fn check_batch(
    State(state): State<ApiState>,
    Json(request): Json<BatchCheckRequest>,
) -> Result<Json<BatchCheckResponse>, StatusCode> {
    if request.values.len() > MAX_BATCH_VALUES {
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }
    let engine = state.handle.load();
    let results: Vec<CheckResult> = request
        .values
        .into_iter()
        .map(|value| {
            let outcome = engine.check(&HashKey::from_address_or_hash(&value));
            state.metrics.record_outcome(outcome);
            CheckResult {
                value,
                suppressed: outcome.is_suppressed(),
            }
        })
        .collect();
    let suppressed = results.iter().filter(|r| r.suppressed).count();
    Ok(Json(BatchCheckResponse {
        results,
        suppressed,
    }))
}

async fn stats(State(state): State<ApiState>) -> Json<StatsResponse> {
    let published = state.handle.load_published();
    Json(StatsResponse {
        version: published.version,
        stats: published.engine.stats(),
    })
}

async fn metrics_handler(State(state): State<ApiState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let published = state.handle.load_published();
    Json(HealthResponse {
        status: "ok",
        version: published.version,
        entries: published.engine.count(),
    })
}

/// Create REST API router
pub fn create_router(handle: Arc<EngineHandle>, metrics: Arc<Metrics>) -> Router {
    let state = ApiState { handle, metrics };
    Router::new()
        .route("/check", get(check_one).post(check_batch))
        .route("/stats", get(stats))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
