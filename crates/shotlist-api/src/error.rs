//! API error envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use shotlist_core::{defaults, Error};

/// Wrapper turning core errors into the standard API error envelope:
///
/// ```json
/// {
///   "status": "error",
///   "errorCode": "validation_error",
///   "message": "...",
///   "retryable": false
/// }
/// ```
///
/// Retryable errors additionally carry `retryAfterSeconds`.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError(Error::Validation(message.into()))
    }

    fn status_code(&self) -> StatusCode {
        match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::AssetNotFound(_) | Error::QueryKeyNotFound(_) => StatusCode::NOT_FOUND,
            Error::Consistency(_) => StatusCode::CONFLICT,
            Error::Embedding(_)
            | Error::Transcription(_)
            | Error::ExternalService(_)
            | Error::Request(_) => StatusCode::BAD_GATEWAY,
            Error::Stage { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retryable = self.0.retryable();
        let mut body = serde_json::json!({
            "status": "error",
            "errorCode": self.0.error_code(),
            "message": self.0.to_string(),
            "retryable": retryable,
        });
        if retryable {
            body["retryAfterSeconds"] = serde_json::json!(defaults::RETRY_AFTER_SECS);
        }
        (status, Json(body)).into_response()
    }
}
