use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use premise_intake::error::AppError;
use premise_intake::workflows::premises::{
    BatchResult, BatchSummary, DrainHandle, PremiseCsvReader,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::Cursor;

#[derive(Debug, Deserialize)]
pub(crate) struct PremisesBatchRequest {
    /// Premises CSV including its header row.
    pub(crate) csv: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct PremisesBatchResponse {
    pub(crate) summary: BatchSummary,
    #[serde(flatten)]
    pub(crate) result: BatchResult,
}

pub(crate) fn router() -> axum::Router {
    axum::Router::new()
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/premises/batch",
            axum::routing::post(premises_batch_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Runs one batch synchronously and returns every partition in input order.
pub(crate) async fn premises_batch_endpoint(
    Extension(state): Extension<AppState>,
    Json(payload): Json<PremisesBatchRequest>,
) -> Result<Json<PremisesBatchResponse>, AppError> {
    let records = PremiseCsvReader::from_reader(Cursor::new(payload.csv.into_bytes()))?;
    let result = state.runner.execute(records, &DrainHandle::new()).await?;

    Ok(Json(PremisesBatchResponse {
        summary: result.summary(),
        result,
    }))
}
