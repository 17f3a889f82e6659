// ABOUTME: Session factory: provisions sandboxes through a backend and probes readiness
// ABOUTME: Also reattaches to existing sessions by id

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::{build_backend, SandboxBackend};
use crate::client::ExecutionClient;
use crate::error::{Result, SandboxError};
use crate::retry::RetryPolicy;
use crate::session::SandboxSession;
use crate::settings::SandboxSettings;
use crate::types::{ContainerDescriptor, SandboxType};
use crate::validation::validate_session_id;

/// Probe budget and request timeouts shared by the factory and its sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    pub readiness: RetryPolicy,
    /// Bound on one `/healthz` request while waiting for readiness
    pub probe_timeout: Duration,
    /// Bound on one execution request
    pub exec_timeout: Duration,
}

impl SessionTimeouts {
    pub fn from_settings(settings: &SandboxSettings) -> Self {
        Self {
            readiness: settings.readiness_policy(),
            probe_timeout: settings.probe_timeout,
            exec_timeout: settings.exec_timeout,
        }
    }
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self::from_settings(&SandboxSettings::default())
    }
}

/// Poll `/healthz` until the sandbox accepts execution calls
pub(crate) async fn wait_until_ready(
    descriptor: &ContainerDescriptor,
    timeouts: SessionTimeouts,
) -> Result<()> {
    let session_id = descriptor.session_id.as_str();
    let probe = ExecutionClient::for_descriptor(descriptor, timeouts.probe_timeout)?;
    let policy = timeouts.readiness;

    match policy.poll_until(session_id, || probe.health_check()).await {
        Some(attempt) => {
            info!(
                "Sandbox for session {} ready after {} attempt(s)",
                session_id, attempt
            );
            Ok(())
        }
        None => Err(SandboxError::ReadinessTimeout {
            session_id: session_id.to_string(),
            attempts: policy.max_attempts,
        }),
    }
}

pub struct SessionFactory {
    backend: Arc<dyn SandboxBackend>,
    default_sandbox_type: SandboxType,
    timeouts: SessionTimeouts,
}

impl SessionFactory {
    pub fn new(backend: Arc<dyn SandboxBackend>, settings: &SandboxSettings) -> Self {
        Self {
            backend,
            default_sandbox_type: settings.default_sandbox_type,
            timeouts: SessionTimeouts::from_settings(settings),
        }
    }

    /// Build the configured backend and a factory on top of it
    pub async fn from_settings(settings: &SandboxSettings) -> Result<Self> {
        let backend = build_backend(settings).await?;
        Ok(Self::new(backend, settings))
    }

    pub fn backend(&self) -> &Arc<dyn SandboxBackend> {
        &self.backend
    }

    pub fn default_sandbox_type(&self) -> SandboxType {
        self.default_sandbox_type
    }

    pub fn timeouts(&self) -> SessionTimeouts {
        self.timeouts
    }

    /// Provision a sandbox and wait until it answers health probes.
    ///
    /// A blank or missing session id gets a fresh UUID.
    pub async fn create_session(
        &self,
        sandbox_type: SandboxType,
        session_id: Option<&str>,
    ) -> Result<SandboxSession> {
        let session_id = match session_id.map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        validate_session_id(&session_id)?;
        info!("Creating {} session {}", sandbox_type, session_id);

        let descriptor = self.backend.create(&session_id, sandbox_type).await?;

        if let Err(e) = wait_until_ready(&descriptor, self.timeouts).await {
            warn!("Sandbox for session {} never became ready", session_id);
            self.backend.remove(&session_id).await;
            return Err(e);
        }

        match SandboxSession::new(descriptor, self.backend.clone(), self.timeouts) {
            Ok(session) => Ok(session),
            Err(e) => {
                self.backend.remove(&session_id).await;
                Err(e)
            }
        }
    }

    pub async fn create_default_session(&self) -> Result<SandboxSession> {
        self.create_session(self.default_sandbox_type, None).await
    }

    /// Attach to an existing session without probing it
    pub async fn get_session(&self, session_id: &str) -> Result<SandboxSession> {
        let descriptor = self
            .backend
            .get(session_id)
            .await?
            .ok_or_else(|| SandboxError::NotFound(session_id.to_string()))?;

        SandboxSession::new(descriptor, self.backend.clone(), self.timeouts)
    }

    pub async fn is_manager_healthy(&self) -> bool {
        self.backend.is_healthy().await
    }
}
