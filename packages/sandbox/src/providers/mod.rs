// ABOUTME: Container runtime seam used by the container backend
// ABOUTME: Defines the minimal create/inspect/stop/remove interface and its config types

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

pub mod docker;

pub use docker::DockerRuntime;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Container error: {0}")]
    ContainerError(String),

    #[error("Container not found: {0}")]
    NotFound(String),

    #[error("Image error: {0}")]
    ImageError(String),

    #[error("Port already allocated: {0}")]
    PortConflict(String),
}

impl RuntimeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Everything needed to create and start one sandbox container
#[derive(Debug, Clone, Default)]
pub struct ContainerConfig {
    pub image: String,
    pub name: String,
    pub env_vars: HashMap<String, String>,
    pub volumes: Vec<VolumeMount>,
    pub ports: Vec<PortMapping>,
    pub labels: HashMap<String, String>,
    /// Runtime deletes the container once it stops
    pub auto_remove: bool,
    pub network_mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub host_path: String,
    pub container_path: String,
    pub readonly: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: String, // tcp or udp
}

impl PortMapping {
    pub fn tcp(host_port: u16, container_port: u16) -> Self {
        Self {
            host_port,
            container_port,
            protocol: "tcp".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Removing,
    Stopped,
    Dead,
    Unknown(String),
}

impl ContainerStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ContainerStatus::Running)
    }

    /// States the container cannot leave on its own
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ContainerStatus::Stopped | ContainerStatus::Dead | ContainerStatus::Removing
        )
    }
}

/// Container lifecycle operations the backend needs from a runtime
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Verify the runtime daemon is reachable
    async fn ping(&self) -> Result<()>;

    /// Make sure the image is present locally, pulling it if needed
    async fn ensure_image(&self, image: &str) -> Result<()>;

    /// Create and start a container, returning its id
    async fn create_container(&self, config: &ContainerConfig) -> Result<String>;

    async fn container_status(&self, container_id: &str) -> Result<ContainerStatus>;

    /// Stop a running container
    async fn stop_container(&self, container_id: &str, timeout_secs: u64) -> Result<()>;

    /// Remove a container
    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()>;
}
