// ABOUTME: Container-backed sandbox provisioning on top of a ContainerRuntime
// ABOUTME: Owns port leasing, registration, readiness polling and cleanup of containers

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::SandboxBackend;
use crate::error::{Result, SandboxError};
use crate::ports::PortAllocator;
use crate::providers::{
    ContainerConfig, ContainerRuntime, PortMapping, RuntimeError, VolumeMount,
};
use crate::registry::ContainerRegistry;
use crate::retry::RetryPolicy;
use crate::settings::SandboxSettings;
use crate::types::{ContainerDescriptor, SandboxType};
use crate::validation::validate_session_id;

/// Port the in-container execution server listens on
pub const EXECUTION_PORT: u16 = 8000;
/// Port the in-container browser service listens on
pub const BROWSER_PORT: u16 = 8080;
pub const WORKSPACE_DIR: &str = "/workspace";
const STOP_TIMEOUT_SECS: u64 = 10;
const LABEL_PREFIX: &str = "agentrt.sandbox";

pub struct ContainerBackend {
    runtime: Arc<dyn ContainerRuntime>,
    ports: Arc<PortAllocator>,
    registry: Arc<ContainerRegistry>,
    settings: SandboxSettings,
    state_poll: RetryPolicy,
    /// Session ids that are provisioning or registered; sized against `pool_size`
    claimed: Mutex<HashSet<String>>,
}

/// A claimed session id, released on drop unless the create committed
struct Reservation<'a> {
    set: &'a Mutex<HashSet<String>>,
    session_id: String,
    committed: bool,
}

impl Reservation<'_> {
    /// Keep the claim; it is released again by `remove`
    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.set
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.session_id);
        }
    }
}

impl ContainerBackend {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, settings: SandboxSettings) -> Self {
        let ports = Arc::new(PortAllocator::new(settings.port_range));
        Self::with_parts(runtime, ports, Arc::new(ContainerRegistry::new()), settings)
    }

    /// Build around an existing port pool and registry
    pub fn with_parts(
        runtime: Arc<dyn ContainerRuntime>,
        ports: Arc<PortAllocator>,
        registry: Arc<ContainerRegistry>,
        settings: SandboxSettings,
    ) -> Self {
        let state_poll = settings.readiness_policy();
        Self {
            runtime,
            ports,
            registry,
            settings,
            state_poll,
            claimed: Mutex::new(HashSet::new()),
        }
    }

    pub fn ports(&self) -> &Arc<PortAllocator> {
        &self.ports
    }

    pub fn registry(&self) -> &Arc<ContainerRegistry> {
        &self.registry
    }

    pub fn container_name(&self, session_id: &str) -> String {
        format!("{}{}", self.settings.container_prefix, session_id)
    }

    /// Claim the session id and a pool slot for the duration of one create
    fn reserve(&self, session_id: &str) -> Result<Reservation<'_>> {
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        if claimed.contains(session_id) {
            return Err(SandboxError::SessionExists(session_id.to_string()));
        }
        let live = claimed.len();
        let limit = self.settings.pool_size;
        if limit > 0 && live >= limit {
            return Err(SandboxError::PoolExhausted { live, limit });
        }
        claimed.insert(session_id.to_string());

        Ok(Reservation {
            set: &self.claimed,
            session_id: session_id.to_string(),
            committed: false,
        })
    }

    fn release_claim(&self, session_id: &str) {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
    }

    fn runtime_error(session_id: &str) -> impl FnOnce(RuntimeError) -> SandboxError + '_ {
        move |source| SandboxError::Runtime {
            session_id: session_id.to_string(),
            source,
        }
    }

    async fn prepare_mount(&self, session_id: &str) -> Result<Option<PathBuf>> {
        let Some(storage) = &self.settings.storage_path else {
            return Ok(None);
        };
        let root = storage.join(&self.settings.mount_dir_name);
        tokio::fs::create_dir_all(&root).await?;
        let root = tokio::fs::canonicalize(&root).await?;

        let dir = root.join(session_id);
        tokio::fs::create_dir_all(&dir).await?;
        let dir = tokio::fs::canonicalize(&dir).await?;
        if dir == root || !dir.starts_with(&root) {
            warn!(
                "Mount for session {} resolves to {}, outside {}",
                session_id,
                dir.display(),
                root.display()
            );
            return Err(SandboxError::InvalidSessionId(session_id.to_string()));
        }
        debug!("Mounting {} at {}", dir.display(), WORKSPACE_DIR);
        Ok(Some(dir))
    }

    fn build_environment(&self, session_id: &str) -> HashMap<String, String> {
        let mut env = self.settings.docker_environment.clone();
        env.insert("SESSION_ID".to_string(), session_id.to_string());
        env.insert("WORKSPACE_DIR".to_string(), WORKSPACE_DIR.to_string());
        env
    }

    /// Steps that run while ports are leased; the caller releases them on error
    async fn provision(
        &self,
        session_id: &str,
        sandbox_type: SandboxType,
        image: &str,
        ports: &[u16],
    ) -> Result<ContainerDescriptor> {
        let token = Uuid::new_v4().simple().to_string();
        let environment = self.build_environment(session_id);
        let mut env_vars = environment.clone();
        env_vars.insert("SECRET_TOKEN".to_string(), token.clone());

        let mount_dir = self.prepare_mount(session_id).await?;
        let volumes = mount_dir
            .iter()
            .map(|dir| VolumeMount {
                host_path: dir.display().to_string(),
                container_path: WORKSPACE_DIR.to_string(),
                readonly: false,
            })
            .collect();

        let labels = HashMap::from([
            (format!("{}.session", LABEL_PREFIX), session_id.to_string()),
            (format!("{}.type", LABEL_PREFIX), sandbox_type.to_string()),
        ]);

        let config = ContainerConfig {
            image: image.to_string(),
            name: self.container_name(session_id),
            env_vars,
            volumes,
            ports: vec![
                PortMapping::tcp(ports[0], EXECUTION_PORT),
                PortMapping::tcp(ports[1], BROWSER_PORT),
            ],
            labels,
            auto_remove: true,
            network_mode: Some("bridge".to_string()),
        };

        let container_id = self
            .runtime
            .create_container(&config)
            .await
            .map_err(Self::runtime_error(session_id))?;

        if let Err(e) = self.wait_running(session_id, &container_id).await {
            self.destroy_container(&container_id).await;
            return Err(e);
        }

        let host = &self.settings.host;
        Ok(ContainerDescriptor {
            session_id: session_id.to_string(),
            container_id,
            base_url: format!("http://{}:{}", host, ports[0]),
            browser_url: Some(format!("http://{}:{}", host, ports[1])),
            ports: ports.to_vec(),
            sandbox_type,
            runtime_token: Some(token),
            environment,
            mount_dir: mount_dir.map(|d| d.display().to_string()),
            created_at: Some(Utc::now()),
        })
    }

    async fn wait_running(&self, session_id: &str, container_id: &str) -> Result<()> {
        let runtime = &self.runtime;
        let attempt = self
            .state_poll
            .poll_until(container_id, move || async move {
                match runtime.container_status(container_id).await {
                    Ok(status) => status.is_running(),
                    Err(e) => {
                        debug!("Inspecting container {} failed: {}", container_id, e);
                        false
                    }
                }
            })
            .await;

        match attempt {
            Some(n) => {
                debug!("Container {} running after {} attempt(s)", container_id, n);
                Ok(())
            }
            None => Err(SandboxError::ReadinessTimeout {
                session_id: session_id.to_string(),
                attempts: self.state_poll.max_attempts,
            }),
        }
    }

    /// Stop then force-remove; every failure is logged and swallowed
    async fn destroy_container(&self, container_id: &str) {
        if let Err(e) = self
            .runtime
            .stop_container(container_id, STOP_TIMEOUT_SECS)
            .await
        {
            if !e.is_not_found() {
                warn!("Failed to stop container {}: {}", container_id, e);
            }
        }

        match self.runtime.remove_container(container_id, true).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!("Container {} already removed", container_id);
            }
            Err(e) => warn!("Failed to remove container {}: {}", container_id, e),
        }
    }
}

#[async_trait]
impl SandboxBackend for ContainerBackend {
    async fn create(
        &self,
        session_id: &str,
        sandbox_type: SandboxType,
    ) -> Result<ContainerDescriptor> {
        validate_session_id(session_id)?;
        let reservation = self.reserve(session_id)?;

        let image = self.settings.image_for(sandbox_type);
        info!(
            "Creating {} sandbox for session {} from {}",
            sandbox_type, session_id, image
        );
        self.runtime
            .ensure_image(&image)
            .await
            .map_err(Self::runtime_error(session_id))?;

        let ports = self.ports.allocate(2)?;

        let descriptor = match self
            .provision(session_id, sandbox_type, &image, &ports)
            .await
        {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!("Failed to create sandbox for session {}: {}", session_id, e);
                self.ports.release(&ports);
                return Err(e);
            }
        };

        if let Err(rejected) = self.registry.insert(descriptor.clone()).await {
            self.destroy_container(&rejected.container_id).await;
            self.ports.release(&rejected.ports);
            return Err(SandboxError::SessionExists(session_id.to_string()));
        }
        reservation.commit();

        info!("Sandbox ready for session {}", session_id);
        Ok(descriptor)
    }

    async fn remove(&self, session_id: &str) {
        let Some(descriptor) = self.registry.take(session_id).await else {
            debug!("No container registered for session {}", session_id);
            return;
        };

        info!(
            "Removing container {} for session {}",
            descriptor.container_id, session_id
        );
        self.destroy_container(&descriptor.container_id).await;
        self.ports.release(&descriptor.ports);
        self.release_claim(session_id);
    }

    async fn get(&self, session_id: &str) -> Result<Option<ContainerDescriptor>> {
        Ok(self.registry.get(session_id).await)
    }

    async fn list(&self) -> Result<HashMap<String, ContainerDescriptor>> {
        Ok(self.registry.snapshot().await)
    }

    async fn shutdown(&self) {
        let session_ids = self.registry.session_ids().await;
        if !self.settings.auto_cleanup {
            info!(
                "Auto-cleanup disabled, leaving {} container(s) running",
                session_ids.len()
            );
            return;
        }

        info!("Cleaning up {} container(s)", session_ids.len());
        join_all(session_ids.iter().map(|id| self.remove(id))).await;
    }

    async fn is_healthy(&self) -> bool {
        self.runtime.ping().await.is_ok()
    }
}
