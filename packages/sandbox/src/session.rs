// ABOUTME: Caller-facing sandbox session: execution, restart, close and health
// ABOUTME: Keeps a stable session id across restarts while the backing sandbox changes

use std::sync::Arc;
use tracing::{info, warn};

use crate::backend::SandboxBackend;
use crate::client::ExecutionClient;
use crate::error::{Result, SandboxError};
use crate::factory::{wait_until_ready, SessionTimeouts};
use crate::types::{ContainerDescriptor, ExecutionResult, SandboxType};

/// A live binding between a session id and one sandbox
pub struct SandboxSession {
    descriptor: ContainerDescriptor,
    /// `None` after a failed restart: there is no backing sandbox
    client: Option<ExecutionClient>,
    backend: Arc<dyn SandboxBackend>,
    timeouts: SessionTimeouts,
    closed: bool,
}

impl SandboxSession {
    /// Bind a session to an already provisioned sandbox
    pub fn new(
        descriptor: ContainerDescriptor,
        backend: Arc<dyn SandboxBackend>,
        timeouts: SessionTimeouts,
    ) -> Result<Self> {
        let client = ExecutionClient::for_descriptor(&descriptor, timeouts.exec_timeout)?;
        Ok(Self {
            descriptor,
            client: Some(client),
            backend,
            timeouts,
            closed: false,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.descriptor.session_id
    }

    pub fn container_id(&self) -> &str {
        &self.descriptor.container_id
    }

    pub fn base_url(&self) -> &str {
        &self.descriptor.base_url
    }

    pub fn browser_url(&self) -> Option<&str> {
        self.descriptor.browser_url.as_deref()
    }

    pub fn sandbox_type(&self) -> SandboxType {
        self.descriptor.sandbox_type
    }

    pub fn descriptor(&self) -> &ContainerDescriptor {
        &self.descriptor
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(SandboxError::SessionClosed(self.session_id().to_string()));
        }
        Ok(())
    }

    fn client(&self) -> Result<&ExecutionClient> {
        self.ensure_open()?;
        self.client
            .as_ref()
            .ok_or_else(|| SandboxError::NotFound(self.session_id().to_string()))
    }

    /// Run a Python cell; a failing program comes back as `is_error`, not `Err`
    pub async fn run_python(&self, code: &str, split_output: bool) -> Result<ExecutionResult> {
        self.client()?.run_ipython_cell(code, split_output).await
    }

    /// Run a shell command; a failing command comes back as `is_error`, not `Err`
    pub async fn run_shell(&self, command: &str, split_output: bool) -> Result<ExecutionResult> {
        self.client()?.run_shell_command(command, split_output).await
    }

    /// Replace the backing sandbox with a fresh one under the same session id.
    ///
    /// On failure the session has no backing sandbox: runs fail and `is_healthy` is false.
    pub async fn restart(&mut self) -> Result<()> {
        self.ensure_open()?;
        let session_id = self.descriptor.session_id.clone();
        let sandbox_type = self.descriptor.sandbox_type;
        info!("Restarting session {}", session_id);

        self.client = None;
        self.backend.remove(&session_id).await;

        let restart_failed = |reason: String| SandboxError::RestartFailed {
            session_id: session_id.clone(),
            reason,
        };

        let descriptor = self
            .backend
            .create(&session_id, sandbox_type)
            .await
            .map_err(|e| restart_failed(e.to_string()))?;

        let exec_timeout = self.timeouts.exec_timeout;
        let client = match wait_until_ready(&descriptor, self.timeouts)
            .await
            .and_then(|()| ExecutionClient::for_descriptor(&descriptor, exec_timeout))
        {
            Ok(client) => client,
            Err(e) => {
                self.backend.remove(&session_id).await;
                return Err(restart_failed(e.to_string()));
            }
        };

        info!(
            "Session {} restarted on container {}",
            session_id, descriptor.container_id
        );
        self.descriptor = descriptor;
        self.client = Some(client);
        Ok(())
    }

    /// Release the backing sandbox. Calling it again does nothing.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.client = None;
        self.backend.remove(&self.descriptor.session_id).await;
        self.closed = true;
        info!("Closed session {}", self.descriptor.session_id);
    }

    pub async fn is_healthy(&self) -> bool {
        match self.client() {
            Ok(client) => client.health_check().await,
            Err(_) => false,
        }
    }
}

impl Drop for SandboxSession {
    fn drop(&mut self) {
        if !self.closed {
            warn!(
                "Session {} dropped without close; its sandbox stays up until backend shutdown",
                self.descriptor.session_id
            );
        }
    }
}
