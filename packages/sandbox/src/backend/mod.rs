// ABOUTME: Sandbox backend trait and deployment-based backend selection
// ABOUTME: Docker containers, manager-local execution, or a remote manager over HTTP

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::error::{Result, SandboxError};
use crate::providers::{ContainerRuntime, DockerRuntime};
use crate::settings::{DeploymentType, SandboxSettings};
use crate::types::{ContainerDescriptor, SandboxType};

pub mod container;
pub mod local;
pub mod remote;

pub use container::ContainerBackend;
pub use local::LocalBackend;
pub use remote::RemoteBackend;

/// Provisions and tears down sandboxes for sessions
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    /// Provision a sandbox for the session and return its descriptor
    async fn create(
        &self,
        session_id: &str,
        sandbox_type: SandboxType,
    ) -> Result<ContainerDescriptor>;

    /// Tear down the session's sandbox. Failures are logged, never returned.
    async fn remove(&self, session_id: &str);

    async fn get(&self, session_id: &str) -> Result<Option<ContainerDescriptor>>;

    async fn list(&self) -> Result<HashMap<String, ContainerDescriptor>>;

    /// Release everything this backend still owns
    async fn shutdown(&self);

    async fn is_healthy(&self) -> bool;
}

/// Build the backend selected by `settings.deployment`
pub async fn build_backend(settings: &SandboxSettings) -> Result<Arc<dyn SandboxBackend>> {
    match settings.deployment {
        DeploymentType::Docker => {
            let runtime = DockerRuntime::connect(settings.docker_host.as_deref())
                .map_err(|e| SandboxError::RuntimeUnavailable(e.to_string()))?;
            runtime
                .ping()
                .await
                .map_err(|e| SandboxError::RuntimeUnavailable(e.to_string()))?;
            info!("Connected to Docker daemon");
            Ok(Arc::new(ContainerBackend::new(
                Arc::new(runtime),
                settings.clone(),
            )))
        }
        DeploymentType::Local => {
            info!(
                "Using manager-local execution at {}",
                settings.manager_url
            );
            Ok(Arc::new(LocalBackend::new(settings.clone())))
        }
        DeploymentType::Remote => {
            info!("Using remote sandbox manager at {}", settings.manager_url);
            Ok(Arc::new(RemoteBackend::new(
                &settings.manager_url,
                settings.token.clone(),
                settings.exec_timeout,
            )?))
        }
    }
}
