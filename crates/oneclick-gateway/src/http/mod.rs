pub mod health;
pub mod schedule;

use axum::{http::StatusCode, Json};
use oneclick_scheduler::SchedulerError;
use serde_json::{json, Value};
use tracing::error;

/// Error half of every handler's return type.
pub type ApiError = (StatusCode, Json<Value>);

/// `{"error": <message>, "code": <code>}` with the given status.
pub fn error_body(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(json!({"error": message.into(), "code": code})),
    )
}

/// Map a scheduler error onto an HTTP response.
///
/// Persistence and client errors are logged and reported without detail.
pub fn api_error(err: SchedulerError) -> ApiError {
    let status = match &err {
        SchedulerError::Validation(_) => StatusCode::BAD_REQUEST,
        SchedulerError::Conflict { .. } => StatusCode::CONFLICT,
        SchedulerError::JobNotFound { .. } => StatusCode::NOT_FOUND,
        SchedulerError::ShuttingDown | SchedulerError::Saturated => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        SchedulerError::Database(_)
        | SchedulerError::Corrupt(_)
        | SchedulerError::Serialization(_)
        | SchedulerError::HttpClient(_) => {
            error!(code = err.code(), "request failed: {err}");
            return error_body(StatusCode::INTERNAL_SERVER_ERROR, err.code(), "internal error");
        }
    };
    error_body(status, err.code(), err.to_string())
}
