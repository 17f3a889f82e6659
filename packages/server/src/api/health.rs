use axum::Json;
use serde_json::{json, Value};

/// GET /healthz
pub async fn healthz() -> Json<&'static str> {
    Json("OK")
}

/// GET /health
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "sandbox-server"
    }))
}
