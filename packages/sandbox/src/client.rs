// ABOUTME: HTTP client for the sandbox execution protocol (/tools, /healthz, /health)
// ABOUTME: Bound to one base URL and optional bearer token; every request has a timeout

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, SandboxError};
use crate::types::{ContainerDescriptor, ExecutionResult, PythonRequest, ShellRequest};

pub const PYTHON_ENDPOINT: &str = "/tools/run_ipython_cell";
pub const SHELL_ENDPOINT: &str = "/tools/run_shell_command";
pub const HEALTHZ_ENDPOINT: &str = "/healthz";
pub const HEALTH_ENDPOINT: &str = "/health";

/// Execution client for one sandbox
#[derive(Debug, Clone)]
pub struct ExecutionClient {
    http_client: Client,
    base_url: String,
    token: Option<String>,
}

impl ExecutionClient {
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
        })
    }

    /// Client bound to a descriptor's address and runtime token
    pub fn for_descriptor(descriptor: &ContainerDescriptor, timeout: Duration) -> Result<Self> {
        Self::new(
            &descriptor.base_url,
            descriptor.runtime_token.clone(),
            timeout,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Run a Python cell in the sandbox
    pub async fn run_ipython_cell(&self, code: &str, split_output: bool) -> Result<ExecutionResult> {
        let body = PythonRequest {
            code: code.to_string(),
            split_output,
        };
        self.execute(PYTHON_ENDPOINT, &body).await
    }

    /// Run a shell command in the sandbox
    pub async fn run_shell_command(
        &self,
        command: &str,
        split_output: bool,
    ) -> Result<ExecutionResult> {
        let body = ShellRequest {
            command: command.to_string(),
            split_output,
        };
        self.execute(SHELL_ENDPOINT, &body).await
    }

    async fn execute<B: Serialize>(&self, path: &str, body: &B) -> Result<ExecutionResult> {
        let url = self.url(path);
        debug!("POST {}", url);

        let response = self
            .authorize(self.http_client.post(&url))
            .json(body)
            .send()
            .await
            .map_err(transport_error(&url))?;

        read_json(&url, response).await
    }

    /// True iff `/healthz` answers 2xx with `OK`. Never fails.
    pub async fn health_check(&self) -> bool {
        let url = self.url(HEALTHZ_ENDPOINT);
        let response = match self.authorize(self.http_client.get(&url)).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("Health check against {} failed: {}", url, e);
                return false;
            }
        };

        if !response.status().is_success() {
            debug!(
                "Health check against {} returned {}",
                url,
                response.status()
            );
            return false;
        }

        match response.text().await {
            Ok(body) => is_ok_body(&body),
            Err(e) => {
                debug!("Failed to read health response from {}: {}", url, e);
                false
            }
        }
    }

    /// Detailed status from `/health`
    pub async fn health_status(&self) -> Result<HashMap<String, Value>> {
        let url = self.url(HEALTH_ENDPOINT);
        let response = self
            .authorize(self.http_client.get(&url))
            .send()
            .await
            .map_err(transport_error(&url))?;
        read_json(&url, response).await
    }
}

/// Accepts both the plain and the JSON-encoded `OK` body
fn is_ok_body(body: &str) -> bool {
    let body = body.trim();
    body == "OK" || body == "\"OK\""
}

pub(crate) fn transport_error(endpoint: &str) -> impl FnOnce(reqwest::Error) -> SandboxError + '_ {
    move |source| SandboxError::Transport {
        endpoint: endpoint.to_string(),
        source,
    }
}

/// Read a response body, mapping non-2xx to `Http` and malformed JSON to `Decode`
pub(crate) async fn read_json<T: DeserializeOwned>(endpoint: &str, response: Response) -> Result<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(transport_error(endpoint))?;

    if !status.is_success() {
        return Err(SandboxError::Http {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|source| SandboxError::Decode {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        body,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_body_variants() {
        assert!(is_ok_body("OK"));
        assert!(is_ok_body("\"OK\""));
        assert!(is_ok_body("OK\n"));
        assert!(!is_ok_body("ok"));
        assert!(!is_ok_body("{\"status\":\"healthy\"}"));
    }

    #[test]
    fn test_empty_token_means_no_auth() {
        let client =
            ExecutionClient::new("http://localhost:50000/", Some(String::new()), Duration::from_secs(5))
                .unwrap();
        assert!(!client.has_token());
        assert_eq!(client.base_url(), "http://localhost:50000");
        assert_eq!(
            client.url(SHELL_ENDPOINT),
            "http://localhost:50000/tools/run_shell_command"
        );
    }
}
