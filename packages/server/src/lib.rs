// ABOUTME: Sandbox manager server: execution protocol and container management over HTTP
// ABOUTME: Builds the configured backend, serves until Ctrl-C, then cleans up

use agentrt_sandbox::{build_backend, SandboxSettings};
use axum::http::Method;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

pub mod api;
pub mod error;
pub mod middleware;
pub mod state;

#[cfg(test)]
mod tests;

pub use state::AppState;

pub async fn run_server(settings: SandboxSettings) -> anyhow::Result<()> {
    let backend = build_backend(&settings).await?;

    if settings.token.is_none() {
        warn!("No SANDBOX_TOKEN configured; accepting unauthenticated requests");
    }

    let state = AppState::new(backend.clone(), &settings);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    let app = api::create_router(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    info!(
        "Sandbox manager listening on {} ({:?} deployment)",
        settings.bind_addr, settings.deployment
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    backend.shutdown().await;
    info!("Sandbox manager stopped");
    Ok(())
}
