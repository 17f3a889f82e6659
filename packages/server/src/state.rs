// ABOUTME: Shared application state for the sandbox manager handlers
// ABOUTME: Holds the sandbox backend, the local executor and the bearer token

use agentrt_sandbox::{LocalExecutor, SandboxBackend, SandboxSettings, SandboxType};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn SandboxBackend>,
    pub executor: Arc<LocalExecutor>,
    /// Bearer token required on protected routes; `None` disables auth
    pub token: Option<String>,
    pub default_sandbox_type: SandboxType,
}

impl AppState {
    pub fn new(backend: Arc<dyn SandboxBackend>, settings: &SandboxSettings) -> Self {
        Self {
            backend,
            executor: Arc::new(LocalExecutor::from_settings(settings)),
            token: settings.token.clone().filter(|t| !t.is_empty()),
            default_sandbox_type: settings.default_sandbox_type,
        }
    }
}
