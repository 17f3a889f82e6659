// ABOUTME: Execution endpoints served by the manager through the local executor
// ABOUTME: Program failures and timeouts are reported in-band as is_error results

use agentrt_sandbox::{
    into_execution_result, ExecutionResult, PythonRequest, SandboxError, ShellRequest,
};
use axum::{extract::State, Json};
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;

/// Usage errors are rejected; everything else becomes an error entry
fn respond(
    outcome: agentrt_sandbox::Result<ExecutionResult>,
) -> Result<Json<ExecutionResult>, AppError> {
    match outcome {
        Err(SandboxError::InvalidRequest(msg)) => Err(AppError::Validation(msg)),
        other => Ok(Json(into_execution_result(other))),
    }
}

/// POST /tools/run_ipython_cell
pub async fn run_ipython_cell(
    State(state): State<AppState>,
    Json(request): Json<PythonRequest>,
) -> Result<Json<ExecutionResult>, AppError> {
    info!("Running Python cell ({} bytes)", request.code.len());
    respond(
        state
            .executor
            .run_python_cell(&request.code, request.split_output)
            .await,
    )
}

/// POST /tools/run_shell_command
pub async fn run_shell_command(
    State(state): State<AppState>,
    Json(request): Json<ShellRequest>,
) -> Result<Json<ExecutionResult>, AppError> {
    info!("Running shell command: {}", request.command);
    respond(
        state
            .executor
            .run_shell_command(&request.command, request.split_output)
            .await,
    )
}
