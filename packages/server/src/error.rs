// ABOUTME: HTTP error type for the sandbox manager server
// ABOUTME: Maps sandbox failures to status codes with a JSON {error} body

use agentrt_sandbox::SandboxError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Error type returned by every handler
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Sandbox(err) => match err {
                SandboxError::NotFound(_) => StatusCode::NOT_FOUND,
                SandboxError::SessionExists(_) | SandboxError::SessionClosed(_) => {
                    StatusCode::CONFLICT
                }
                SandboxError::InvalidRequest(_)
                | SandboxError::InvalidSessionId(_)
                | SandboxError::Config(_) => StatusCode::BAD_REQUEST,
                SandboxError::PortsExhausted { .. }
                | SandboxError::PoolExhausted { .. }
                | SandboxError::ReadinessTimeout { .. }
                | SandboxError::RuntimeUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                SandboxError::Http { .. }
                | SandboxError::Decode { .. }
                | SandboxError::Transport { .. } => StatusCode::BAD_GATEWAY,
                SandboxError::Runtime { .. }
                | SandboxError::RestartFailed { .. }
                | SandboxError::Timeout(_)
                | SandboxError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = %status, error = %self, "Request failed");
        } else {
            warn!(status = %status, error = %self, "Request rejected");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
