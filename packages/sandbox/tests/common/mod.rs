// ABOUTME: Shared fixtures for session and tool integration tests
// ABOUTME: Stub backend handing out descriptors for a wiremock sandbox server

#![allow(dead_code)]

use agentrt_sandbox::{
    ContainerDescriptor, ContainerRegistry, Result, SandboxBackend, SandboxError, SandboxSettings,
    SandboxType, SessionFactory,
};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Backend stub that hands out descriptors for a mock server
pub struct StubBackend {
    base_url: String,
    /// Creates numbered at or above this fail
    fail_from: Option<usize>,
    creates: AtomicUsize,
    removes: Mutex<Vec<String>>,
    registry: ContainerRegistry,
}

impl StubBackend {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            fail_from: None,
            creates: AtomicUsize::new(0),
            removes: Mutex::new(Vec::new()),
            registry: ContainerRegistry::new(),
        }
    }

    pub fn failing_from(mut self, n: usize) -> Self {
        self.fail_from = Some(n);
        self
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> Vec<String> {
        self.removes.lock().unwrap().clone()
    }
}

#[async_trait]
impl SandboxBackend for StubBackend {
    async fn create(
        &self,
        session_id: &str,
        sandbox_type: SandboxType,
    ) -> Result<ContainerDescriptor> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_from.is_some_and(|k| n >= k) {
            return Err(SandboxError::PoolExhausted { live: 1, limit: 1 });
        }
        let descriptor = ContainerDescriptor {
            session_id: session_id.to_string(),
            container_id: format!("stub-{}", n),
            base_url: self.base_url.clone(),
            browser_url: None,
            ports: vec![],
            sandbox_type,
            runtime_token: Some("tok".to_string()),
            environment: HashMap::new(),
            mount_dir: None,
            created_at: None,
        };
        self.registry
            .insert(descriptor.clone())
            .await
            .map_err(|_| SandboxError::SessionExists(session_id.to_string()))?;
        Ok(descriptor)
    }

    async fn remove(&self, session_id: &str) {
        self.removes.lock().unwrap().push(session_id.to_string());
        self.registry.take(session_id).await;
    }

    async fn get(&self, session_id: &str) -> Result<Option<ContainerDescriptor>> {
        Ok(self.registry.get(session_id).await)
    }

    async fn list(&self) -> Result<HashMap<String, ContainerDescriptor>> {
        Ok(self.registry.snapshot().await)
    }

    async fn shutdown(&self) {}

    async fn is_healthy(&self) -> bool {
        true
    }
}

pub fn fast_settings() -> SandboxSettings {
    SandboxSettings {
        ready_attempts: 5,
        ready_interval: Duration::from_millis(5),
        exec_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

pub async fn healthy_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/healthz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("OK")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tools/run_shell_command"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "output", "text": "hi\n0"}],
            "is_error": false
        })))
        .mount(&server)
        .await;
    server
}

pub fn factory(backend: Arc<StubBackend>) -> SessionFactory {
    SessionFactory::new(backend, &fast_settings())
}
