// ABOUTME: Bearer token authentication middleware for the sandbox manager
// ABOUTME: Health endpoints stay open; everything else needs the configured token

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::state::AppState;

/// Paths that don't require authentication
const WHITELISTED_PATHS: &[&str] = &["/healthz", "/health"];

fn requires_authentication(path: &str) -> bool {
    !WHITELISTED_PATHS.contains(&path)
}

pub async fn bearer_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let path = request.uri().path().to_string();
    if !requires_authentication(&path) {
        debug!(path = %path, "Path whitelisted, skipping token validation");
        return Ok(next.run(request).await);
    }

    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);

    match provided {
        Some(token) if token == expected => Ok(next.run(request).await),
        Some(_) => {
            warn!(path = %path, "Invalid bearer token");
            Err(AppError::Unauthorized("Invalid token".to_string()))
        }
        None => {
            warn!(path = %path, "Missing bearer token");
            Err(AppError::Unauthorized(
                "Bearer token required in Authorization header".to_string(),
            ))
        }
    }
}
