// ABOUTME: Docker runtime implementation for container-backed sandboxes
// ABOUTME: Uses the bollard library to create, inspect, stop and remove sandbox containers

use super::{ContainerConfig, ContainerRuntime, ContainerStatus, Result, RuntimeError};
use async_trait::async_trait;
use bollard::{
    container::{
        Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions,
        StopContainerOptions,
    },
    image::CreateImageOptions,
    Docker, API_DEFAULT_VERSION,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Seconds bollard waits on a single daemon request
const CONNECT_TIMEOUT_SECS: u64 = 120;

pub struct DockerRuntime {
    client: Docker,
    label_prefix: String,
    /// Timeout for image pull operations (default: 10 minutes)
    pull_timeout: Duration,
}

impl DockerRuntime {
    /// Connect to the daemon at `docker_host`, or the platform default when unset
    pub fn connect(docker_host: Option<&str>) -> Result<Self> {
        let client = match docker_host {
            Some(host) if host.starts_with("unix://") => Docker::connect_with_socket(
                host,
                CONNECT_TIMEOUT_SECS,
                API_DEFAULT_VERSION,
            ),
            Some(host) => Docker::connect_with_http(host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION),
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(|e| RuntimeError::ConnectionError(e.to_string()))?;

        Ok(Self::with_client(client))
    }

    /// Create with a specific Docker connection
    pub fn with_client(client: Docker) -> Self {
        Self {
            client,
            label_prefix: "agentrt.sandbox".to_string(),
            pull_timeout: Duration::from_secs(600),
        }
    }

    pub fn with_pull_timeout(mut self, timeout: Duration) -> Self {
        self.pull_timeout = timeout;
        self
    }

    /// Convert our config to bollard config
    fn to_bollard_config(&self, config: &ContainerConfig) -> Config<String> {
        let mut labels = config.labels.clone();
        labels.insert(format!("{}.managed", self.label_prefix), "true".to_string());
        labels.insert(format!("{}.name", self.label_prefix), config.name.clone());

        let mut exposed_ports = HashMap::new();
        let mut port_bindings = HashMap::new();

        for port in &config.ports {
            let container_port = format!("{}/{}", port.container_port, port.protocol);
            exposed_ports.insert(container_port.clone(), HashMap::new());

            let binding = vec![bollard::models::PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some(port.host_port.to_string()),
            }];
            port_bindings.insert(container_port, Some(binding));
        }

        let binds: Vec<String> = config
            .volumes
            .iter()
            .map(|v| {
                format!(
                    "{}:{}:{}",
                    v.host_path,
                    v.container_path,
                    if v.readonly { "ro" } else { "rw" }
                )
            })
            .collect();

        let mut env: Vec<String> = config
            .env_vars
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        env.sort();

        let host_config = bollard::models::HostConfig {
            binds: if binds.is_empty() { None } else { Some(binds) },
            port_bindings: if port_bindings.is_empty() {
                None
            } else {
                Some(port_bindings)
            },
            auto_remove: Some(config.auto_remove),
            network_mode: config.network_mode.clone(),
            ..Default::default()
        };

        Config {
            image: Some(config.image.clone()),
            env: Some(env),
            labels: Some(labels),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        }
    }

    /// Convert bollard container status to our status
    fn convert_status(state: &str) -> ContainerStatus {
        match state.to_lowercase().as_str() {
            "created" => ContainerStatus::Created,
            "running" | "restarting" => ContainerStatus::Running,
            "paused" => ContainerStatus::Paused,
            "removing" => ContainerStatus::Removing,
            "exited" => ContainerStatus::Stopped,
            "dead" => ContainerStatus::Dead,
            other => ContainerStatus::Unknown(other.to_string()),
        }
    }

    /// Map a daemon error, keeping 404s distinguishable
    fn map_error(container_id: &str, err: bollard::errors::Error) -> RuntimeError {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            } => RuntimeError::NotFound(container_id.to_string()),
            bollard::errors::Error::DockerResponseServerError {
                status_code: 500,
                ref message,
            } if message.contains("port is already allocated") => {
                RuntimeError::PortConflict(message.clone())
            }
            other => RuntimeError::ContainerError(other.to_string()),
        }
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.client.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(RuntimeError::ImageError(e.to_string())),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        info!(
            "Pulling image: {} (timeout: {:?})",
            image, self.pull_timeout
        );

        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let stream = self.client.create_image(Some(options), None, None);

        let result = tokio::time::timeout(self.pull_timeout, async {
            let mut stream = stream;
            let mut last_status = String::new();

            while let Some(result) = stream.next().await {
                let info = result.map_err(|e| {
                    RuntimeError::ImageError(format!("Failed to pull image {}: {}", image, e))
                })?;
                if let Some(status) = &info.status {
                    if status != &last_status {
                        debug!("Pull status: {}", status);
                        last_status = status.clone();
                    }
                }
                if let Some(error) = info.error {
                    return Err(RuntimeError::ImageError(format!(
                        "Failed to pull image {}: {}",
                        image, error
                    )));
                }
            }

            Ok(())
        })
        .await;

        match result {
            Ok(Ok(())) => {
                info!("Successfully pulled image: {}", image);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RuntimeError::ImageError(format!(
                "Timeout pulling image {} after {:?}",
                image, self.pull_timeout
            ))),
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<()> {
        self.client
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| RuntimeError::ConnectionError(e.to_string()))
    }

    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.image_exists(image).await? {
            return Ok(());
        }
        self.pull_image(image).await
    }

    async fn create_container(&self, config: &ContainerConfig) -> Result<String> {
        info!("Creating container: {}", config.name);

        let bollard_config = self.to_bollard_config(config);
        let options = CreateContainerOptions {
            name: config.name.clone(),
            platform: None,
        };

        let container = self
            .client
            .create_container(Some(options), bollard_config)
            .await
            .map_err(|e| Self::map_error(&config.name, e))?;

        debug!("Created container: {}", container.id);

        if let Err(e) = self
            .client
            .start_container(&container.id, None::<StartContainerOptions<String>>)
            .await
        {
            // A created-but-unstarted container is never auto-removed
            warn!("Failed to start container {}: {}", container.id, e);
            let _ = self
                .client
                .remove_container(
                    &container.id,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await;
            return Err(Self::map_error(&container.id, e));
        }

        Ok(container.id)
    }

    async fn container_status(&self, container_id: &str) -> Result<ContainerStatus> {
        let inspect = self
            .client
            .inspect_container(container_id, None)
            .await
            .map_err(|e| Self::map_error(container_id, e))?;

        let state = inspect.state.as_ref().ok_or_else(|| {
            RuntimeError::ContainerError("Container has no state information".to_string())
        })?;

        if state.running == Some(true) {
            return Ok(ContainerStatus::Running);
        }

        Ok(Self::convert_status(
            state
                .status
                .as_ref()
                .map(|s| s.as_ref())
                .unwrap_or("unknown"),
        ))
    }

    async fn stop_container(&self, container_id: &str, timeout_secs: u64) -> Result<()> {
        info!(
            "Stopping container: {} (timeout: {}s)",
            container_id, timeout_secs
        );

        let options = StopContainerOptions {
            t: timeout_secs as i64,
        };

        match self.client.stop_container(container_id, Some(options)).await {
            Ok(()) => Ok(()),
            // 304: already stopped
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(Self::map_error(container_id, e)),
        }
    }

    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()> {
        info!("Removing container: {} (force: {})", container_id, force);

        let options = RemoveContainerOptions {
            force,
            v: true,
            ..Default::default()
        };

        match self.client.remove_container(container_id, Some(options)).await {
            Ok(()) => Ok(()),
            // 409: removal already in progress, typically from auto-remove
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 409, ..
            }) => Ok(()),
            Err(e) => Err(Self::map_error(container_id, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{PortMapping, VolumeMount};

    fn runtime() -> Option<DockerRuntime> {
        DockerRuntime::connect(None).ok()
    }

    #[test]
    fn test_status_conversion() {
        assert_eq!(
            DockerRuntime::convert_status("running"),
            ContainerStatus::Running
        );
        assert_eq!(
            DockerRuntime::convert_status("exited"),
            ContainerStatus::Stopped
        );
        assert!(DockerRuntime::convert_status("dead").is_terminal());
        assert_eq!(
            DockerRuntime::convert_status("weird"),
            ContainerStatus::Unknown("weird".to_string())
        );
    }

    #[test]
    fn test_not_found_mapping() {
        let err = DockerRuntime::map_error(
            "abc",
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message: "No such container".to_string(),
            },
        );
        assert!(err.is_not_found());

        let err = DockerRuntime::map_error(
            "abc",
            bollard::errors::Error::DockerResponseServerError {
                status_code: 500,
                message: "Bind for 0.0.0.0:50000 failed: port is already allocated".to_string(),
            },
        );
        assert!(matches!(err, RuntimeError::PortConflict(_)));
    }

    #[tokio::test]
    async fn test_container_config_conversion() {
        // Connecting only builds a client; no daemon round-trip happens here
        let Some(runtime) = runtime() else {
            return;
        };

        let config = ContainerConfig {
            image: "agentruntime/sandbox:base".to_string(),
            name: "sandbox-s1".to_string(),
            env_vars: HashMap::from([
                ("SESSION_ID".to_string(), "s1".to_string()),
                ("WORKSPACE_DIR".to_string(), "/workspace".to_string()),
            ]),
            volumes: vec![VolumeMount {
                host_path: "/tmp/host".to_string(),
                container_path: "/workspace".to_string(),
                readonly: false,
            }],
            ports: vec![PortMapping::tcp(50000, 8000)],
            labels: HashMap::new(),
            auto_remove: true,
            network_mode: Some("bridge".to_string()),
        };

        let bollard_config = runtime.to_bollard_config(&config);

        assert_eq!(
            bollard_config.image,
            Some("agentruntime/sandbox:base".to_string())
        );
        assert_eq!(
            bollard_config.env,
            Some(vec![
                "SESSION_ID=s1".to_string(),
                "WORKSPACE_DIR=/workspace".to_string()
            ])
        );
        let host_config = bollard_config.host_config.unwrap();
        assert_eq!(host_config.auto_remove, Some(true));
        assert_eq!(host_config.network_mode.as_deref(), Some("bridge"));
        assert_eq!(
            host_config.binds,
            Some(vec!["/tmp/host:/workspace:rw".to_string()])
        );
        let bindings = host_config.port_bindings.unwrap();
        let binding = bindings["8000/tcp"].as_ref().unwrap();
        assert_eq!(binding[0].host_port.as_deref(), Some("50000"));
        assert_eq!(
            bollard_config.labels.unwrap()["agentrt.sandbox.managed"],
            "true"
        );
    }
}
