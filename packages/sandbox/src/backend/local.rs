// ABOUTME: Backend for manager-local execution: sessions address the manager itself
// ABOUTME: No containers are created; descriptors are bookkeeping entries in a registry

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use super::SandboxBackend;
use crate::client::ExecutionClient;
use crate::error::{Result, SandboxError};
use crate::registry::{ContainerRegistry, InsertRefused};
use crate::settings::SandboxSettings;
use crate::types::{ContainerDescriptor, SandboxType};
use crate::validation::validate_session_id;

pub struct LocalBackend {
    registry: ContainerRegistry,
    settings: SandboxSettings,
}

impl LocalBackend {
    pub fn new(settings: SandboxSettings) -> Self {
        Self {
            registry: ContainerRegistry::new(),
            settings,
        }
    }

    fn describe(&self, session_id: &str, sandbox_type: SandboxType) -> ContainerDescriptor {
        let mut environment = HashMap::from([("SESSION_ID".to_string(), session_id.to_string())]);
        if let Some(workdir) = &self.settings.local_workdir {
            environment.insert("WORKSPACE_DIR".to_string(), workdir.display().to_string());
        }

        ContainerDescriptor {
            session_id: session_id.to_string(),
            container_id: format!("local-{}", Uuid::new_v4().simple()),
            base_url: self.settings.manager_url.clone(),
            browser_url: None,
            ports: Vec::new(),
            sandbox_type,
            runtime_token: self.settings.token.clone(),
            environment,
            mount_dir: self
                .settings
                .local_workdir
                .as_ref()
                .map(|d| d.display().to_string()),
            created_at: Some(Utc::now()),
        }
    }
}

#[async_trait]
impl SandboxBackend for LocalBackend {
    async fn create(
        &self,
        session_id: &str,
        sandbox_type: SandboxType,
    ) -> Result<ContainerDescriptor> {
        validate_session_id(session_id)?;

        let descriptor = self.describe(session_id, sandbox_type);
        self.registry
            .insert_within(descriptor.clone(), self.settings.pool_size)
            .await
            .map_err(|refused| match refused {
                InsertRefused::Duplicate => SandboxError::SessionExists(session_id.to_string()),
                InsertRefused::Full { live, limit } => SandboxError::PoolExhausted { live, limit },
            })?;

        info!(
            "Registered local {} session {} at {}",
            sandbox_type, session_id, descriptor.base_url
        );
        Ok(descriptor)
    }

    async fn remove(&self, session_id: &str) {
        match self.registry.take(session_id).await {
            Some(_) => info!("Removed local session {}", session_id),
            None => debug!("No local session registered for {}", session_id),
        }
    }

    async fn get(&self, session_id: &str) -> Result<Option<ContainerDescriptor>> {
        Ok(self.registry.get(session_id).await)
    }

    async fn list(&self) -> Result<HashMap<String, ContainerDescriptor>> {
        Ok(self.registry.snapshot().await)
    }

    async fn shutdown(&self) {
        for session_id in self.registry.session_ids().await {
            self.remove(&session_id).await;
        }
    }

    async fn is_healthy(&self) -> bool {
        match ExecutionClient::new(
            &self.settings.manager_url,
            self.settings.token.clone(),
            self.settings.exec_timeout,
        ) {
            Ok(client) => client.health_check().await,
            Err(_) => false,
        }
    }
}
