//! Operational HTTP endpoints.
//!
//! - `/healthz`       : liveness
//! - `/readyz`        : readiness (503 when draining or the ledger is corrupted)
//! - `/metrics`       : Prometheus text format
//! - `/ledger/verify` : re-verify the live ledger segment (JSON report)

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::app_state::AppState;

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    if state.is_draining() {
        (StatusCode::SERVICE_UNAVAILABLE, "draining")
    } else if state.ledger().is_corrupted() {
        (StatusCode::SERVICE_UNAVAILABLE, "ledger corrupted")
    } else {
        (StatusCode::OK, "ready")
    }
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    let extra = state.metrics_extra();
    let body = state.metrics().render(&extra);

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}

pub async fn verify_ledger(State(state): State<AppState>) -> Response {
    match state.verify_ledger().await {
        Ok(report) if report.ok => (StatusCode::OK, Json(report)).into_response(),
        Ok(report) => (StatusCode::CONFLICT, Json(report)).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.fault_code().as_str()).into_response(),
    }
}
