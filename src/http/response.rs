//! Response building.
//!
//! # Responsibilities
//! - Map gateway outcomes to HTTP status codes
//! - Render the JSON `classification` body
//! - Attach retry hints (`retry-after`, `x-ratelimit-*`)
//!
//! # Design Decisions
//! - Status code plus `classification` are the only signals a caller needs
//! - Every rejection becomes a response; nothing escapes as a bare error

use axum::{
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::gateway::{Classification, Completed, Rejection};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SuccessBody<'a> {
    classification: &'static str,
    link: &'a str,
    latency_ms: u64,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    classification: &'static str,
    message: String,
}

/// HTTP status for a rejection.
pub fn status_for(rejection: &Rejection) -> StatusCode {
    match rejection {
        Rejection::Validation(_) => StatusCode::BAD_REQUEST,
        Rejection::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        Rejection::RateLimited(_) | Rejection::Busy | Rejection::BusyQueue => {
            StatusCode::TOO_MANY_REQUESTS
        }
        Rejection::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
        Rejection::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn success_response(completed: &Completed) -> Response {
    let body = SuccessBody {
        classification: Classification::Success.as_str(),
        link: completed.job.link.as_str(),
        latency_ms: u64::try_from(completed.latency.as_millis()).unwrap_or(u64::MAX),
    };
    (StatusCode::OK, Json(body)).into_response()
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let body = ErrorBody {
            classification: self.classification().as_str(),
            message: self.to_string(),
        };
        let mut response = (status, Json(body)).into_response();
        let headers = response.headers_mut();

        match &self {
            Rejection::RateLimited(info) => {
                headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(info.limit));
                headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(info.remaining));
                headers.insert(X_RATELIMIT_RESET, HeaderValue::from(info.reset_at_epoch_secs));
                headers.insert(header::RETRY_AFTER, HeaderValue::from(info.retry_after_secs));
            }
            Rejection::CircuitOpen { retry_after } => {
                let secs = retry_after.as_millis().div_ceil(1000).max(1);
                let secs = u64::try_from(secs).unwrap_or(u64::MAX);
                headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
            }
            _ => {}
        }

        response
    }
}
