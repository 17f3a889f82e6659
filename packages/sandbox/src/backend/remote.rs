// ABOUTME: Backend that delegates container management to a remote manager over HTTP
// ABOUTME: Speaks the /containers protocol; the remote node owns ports and cleanup

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::SandboxBackend;
use crate::client::{read_json, transport_error, ExecutionClient, HEALTHZ_ENDPOINT};
use crate::error::Result;
use crate::types::{ContainerDescriptor, SandboxType};
use crate::validation::validate_session_id;

/// Client for a remote sandbox manager
pub struct RemoteBackend {
    http_client: Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl RemoteBackend {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(transport_error(&base_url))?;

        Ok(Self {
            http_client,
            base_url,
            token: token.filter(|t| !t.is_empty()),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn containers_url(&self, session_id: Option<&str>) -> String {
        match session_id {
            Some(id) => format!("{}/containers/{}", self.base_url, id),
            None => format!("{}/containers", self.base_url),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl SandboxBackend for RemoteBackend {
    async fn create(
        &self,
        session_id: &str,
        sandbox_type: SandboxType,
    ) -> Result<ContainerDescriptor> {
        validate_session_id(session_id)?;
        let url = self.containers_url(None);
        info!(
            "Requesting {} sandbox for session {} from {}",
            sandbox_type, session_id, self.base_url
        );

        let sandbox_type = sandbox_type.as_str().to_uppercase();
        let response = self
            .authorize(self.http_client.post(&url))
            .query(&[("sandboxType", sandbox_type.as_str()), ("sessionId", session_id)])
            .send()
            .await
            .map_err(transport_error(&url))?;

        let descriptor: ContainerDescriptor = read_json(&url, response).await?;
        debug!(
            "Remote manager created container {} for session {}",
            descriptor.container_id, session_id
        );
        Ok(descriptor)
    }

    async fn remove(&self, session_id: &str) {
        if let Err(e) = validate_session_id(session_id) {
            warn!("Not removing remote container: {}", e);
            return;
        }
        let url = self.containers_url(Some(session_id));
        match self
            .authorize(self.http_client.delete(&url))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                info!("Removed remote container for session {}", session_id);
            }
            Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                debug!("Remote manager has no container for session {}", session_id);
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                warn!(
                    "Failed to remove remote container for session {}: {} {}",
                    session_id, status, body
                );
            }
            Err(e) => warn!(
                "Failed to remove remote container for session {}: {}",
                session_id, e
            ),
        }
    }

    async fn get(&self, session_id: &str) -> Result<Option<ContainerDescriptor>> {
        validate_session_id(session_id)?;
        let url = self.containers_url(Some(session_id));
        let response = self
            .authorize(self.http_client.get(&url))
            .send()
            .await
            .map_err(transport_error(&url))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        read_json(&url, response).await.map(Some)
    }

    async fn list(&self) -> Result<HashMap<String, ContainerDescriptor>> {
        let url = self.containers_url(None);
        let response = self
            .authorize(self.http_client.get(&url))
            .send()
            .await
            .map_err(transport_error(&url))?;
        read_json(&url, response).await
    }

    async fn shutdown(&self) {
        debug!("Remote manager at {} owns its containers", self.base_url);
    }

    async fn is_healthy(&self) -> bool {
        match ExecutionClient::new(&self.base_url, self.token.clone(), self.timeout) {
            Ok(client) => client.health_check().await,
            Err(e) => {
                debug!("Cannot probe {}{}: {}", self.base_url, HEALTHZ_ENDPOINT, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SandboxError;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn descriptor_json(session_id: &str) -> serde_json::Value {
        json!({
            "session_id": session_id,
            "container_id": "c-123",
            "base_url": "http://sandbox-host:50000",
            "browser_url": "http://sandbox-host:50001",
            "ports": [50000, 50001],
            "sandboxType": "BASE",
            "runtime_token": "abc"
        })
    }

    fn backend(server: &MockServer) -> RemoteBackend {
        RemoteBackend::new(
            &server.uri(),
            Some("manager-token".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_sends_type_and_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/containers"))
            .and(query_param("sandboxType", "BROWSER"))
            .and(query_param("sessionId", "s1"))
            .and(header("authorization", "Bearer manager-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(descriptor_json("s1")))
            .expect(1)
            .mount(&server)
            .await;

        let descriptor = backend(&server)
            .create("s1", SandboxType::Browser)
            .await
            .unwrap();
        assert_eq!(descriptor.container_id, "c-123");
        assert_eq!(descriptor.primary_port(), Some(50000));
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/containers/nope"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(backend(&server).get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_failure_surfaces_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/containers"))
            .respond_with(ResponseTemplate::new(503).set_body_string("pool exhausted"))
            .mount(&server)
            .await;

        let err = backend(&server)
            .create("s1", SandboxType::Base)
            .await
            .unwrap_err();
        match err {
            SandboxError::Http { status, body, .. } => {
                assert_eq!(status, 503);
                assert_eq!(body, "pool exhausted");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_list_and_remove() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/containers"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "s1": descriptor_json("s1") })),
            )
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/containers/s1"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend(&server);
        let all = backend.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["s1"].session_id, "s1");

        // Delete failures are logged, not raised
        backend.remove("s1").await;
    }

    #[tokio::test]
    async fn test_path_like_ids_never_reach_the_manager() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200).set_body_json(descriptor_json("x")))
            .expect(0)
            .mount(&server)
            .await;

        let backend = backend(&server);
        for id in ["..", "a/b", "/abs"] {
            assert!(matches!(
                backend.create(id, SandboxType::Base).await,
                Err(SandboxError::InvalidSessionId(_))
            ));
            assert!(matches!(
                backend.get(id).await,
                Err(SandboxError::InvalidSessionId(_))
            ));
            backend.remove(id).await;
        }
    }
}
