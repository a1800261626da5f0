use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use stockrate_core::error::InvalidInput;
use stockrate_core::ingest::bulk::BulkAborted;
use stockrate_core::ingest::{UpstreamFetchError, UpstreamStatusError};
use stockrate_core::llm::error::LlmDiagnosticsError;

/// An error rendered as `{"error": message}` with `status`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// A collaborator this route needs was not configured at start-up.
    pub fn unavailable(what: &str) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("{what} is not configured"),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<InvalidInput> for ApiError {
    fn from(err: InvalidInput) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let (status, message) = if let Some(invalid) = err.downcast_ref::<InvalidInput>() {
            (StatusCode::BAD_REQUEST, invalid.to_string())
        } else if err.is::<UpstreamStatusError>()
            || err.is::<UpstreamFetchError>()
            || err.is::<BulkAborted>()
        {
            (StatusCode::BAD_GATEWAY, format!("{err:#}"))
        } else if let Some(llm) = err.downcast_ref::<LlmDiagnosticsError>() {
            (StatusCode::INTERNAL_SERVER_ERROR, llm.to_string())
        } else {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            )
        };

        if status.is_server_error() {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %format!("{err:#}"), %status, "request failed");
        }
        Self::new(status, message)
    }
}
