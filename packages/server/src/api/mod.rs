use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::middleware::bearer_auth_middleware;
use crate::state::AppState;

pub mod containers;
pub mod health;
pub mod tools;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/health", get(health::health_check))
        .route("/tools/run_ipython_cell", post(tools::run_ipython_cell))
        .route("/tools/run_shell_command", post(tools::run_shell_command))
        .route(
            "/containers",
            get(containers::list_containers).post(containers::create_container),
        )
        .route(
            "/containers/{session_id}",
            get(containers::get_container).delete(containers::delete_container),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            bearer_auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
