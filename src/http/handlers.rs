//! Route handlers: `/update`, `/health`, `/metrics`.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tokio::time::Instant;

use crate::gateway::Rejection;
use crate::http::request::request_id;
use crate::http::response::success_response;
use crate::http::server::AppState;
use crate::observability::MetricsSnapshot;
use crate::resilience::CircuitState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthBody {
    pub status: &'static str,
    pub in_flight: usize,
    pub queue_length: usize,
    pub circuit: CircuitState,
}

/// `POST /update`
pub async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = request_id(&headers);

    let result = match body {
        Ok(bytes) => state.gateway.submit(&bytes).await,
        Err(rejection) => {
            let rejection = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                Rejection::PayloadTooLarge {
                    limit: state.max_body_bytes,
                }
            } else {
                Rejection::Validation(rejection.body_text())
            };
            state.gateway.record_rejection(&rejection, started);
            Err(rejection)
        }
    };

    match result {
        Ok(completed) => {
            tracing::info!(
                request_id = %request_id,
                link = %completed.job.link,
                latency_ms = completed.latency.as_millis() as u64,
                "Update completed"
            );
            success_response(&completed)
        }
        Err(rejection) => {
            tracing::info!(
                request_id = %request_id,
                classification = %rejection.classification(),
                reason = %rejection,
                "Update rejected"
            );
            rejection.into_response()
        }
    }
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthBody>) {
    let view = state.gateway.health();
    let (status, label) = match view.circuit {
        CircuitState::Open => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
        CircuitState::Closed | CircuitState::HalfOpen => (StatusCode::OK, "ok"),
    };

    (
        status,
        Json(HealthBody {
            status: label,
            in_flight: view.in_flight,
            queue_length: view.queue_length,
            circuit: view.circuit,
        }),
    )
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.gateway.metrics_snapshot())
}
