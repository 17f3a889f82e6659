// ABOUTME: Error types for sandbox provisioning, sessions and execution
// ABOUTME: Separates resource exhaustion, not-found, transport and misuse failures

use std::time::Duration;
use thiserror::Error;

use crate::providers::RuntimeError;
use crate::settings::ConfigError;

/// Main error type for sandbox operations
#[derive(Error, Debug)]
pub enum SandboxError {
    /// No free port could be leased from the configured range
    #[error("No available ports in range {min}-{max}")]
    PortsExhausted { min: u16, max: u16 },

    /// The live container cap has been reached
    #[error("Sandbox pool exhausted: {live} of {limit} containers in use")]
    PoolExhausted { live: usize, limit: usize },

    /// A container or sandbox did not become ready within its probe budget
    #[error("Sandbox {session_id} failed to become ready after {attempts} attempts")]
    ReadinessTimeout { session_id: String, attempts: u32 },

    /// The container runtime could not be reached at startup
    #[error("Container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// A container runtime call failed
    #[error("Container runtime error for session {session_id}: {source}")]
    Runtime {
        session_id: String,
        #[source]
        source: RuntimeError,
    },

    /// Session id unusable as a container name, mount directory or URL segment
    #[error("Invalid session id {0:?}: expected 1-128 letters, digits, '_', '.' or '-', starting with a letter or digit")]
    InvalidSessionId(String),

    /// No container is registered for the session id
    #[error("Container not found for session: {0}")]
    NotFound(String),

    /// A container is already registered under the session id
    #[error("Session already exists: {0}")]
    SessionExists(String),

    /// The remote endpoint answered with a non-2xx status
    #[error("Request to {endpoint} failed with status {status}: {body}")]
    Http {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// The remote endpoint answered 2xx with a body that is not the declared shape
    #[error("Failed to decode response from {endpoint} (status {status}): {source}; body: {body}")]
    Decode {
        endpoint: String,
        status: u16,
        body: String,
        #[source]
        source: serde_json::Error,
    },

    /// The request never produced an HTTP response
    #[error("Failed to execute request to {endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// Operation attempted on a closed session
    #[error("Session is closed: {0}")]
    SessionClosed(String),

    /// Restart could not produce a new backing container
    #[error("Failed to restart session {session_id}: {reason}")]
    RestartFailed { session_id: String, reason: String },

    /// Invalid execution request
    #[error("Invalid execution request: {0}")]
    InvalidRequest(String),

    /// Local process exceeded its wall-clock budget
    #[error("Process timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for Results that return SandboxError
pub type Result<T> = std::result::Result<T, SandboxError>;

impl SandboxError {
    /// Status code of a non-2xx or undecodable response, if this error carries one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            SandboxError::Http { status, .. } | SandboxError::Decode { status, .. } => {
                Some(*status)
            }
            SandboxError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the failure is a missing session rather than an infrastructure fault
    pub fn is_not_found(&self) -> bool {
        matches!(self, SandboxError::NotFound(_))
            || matches!(self, SandboxError::Http { status: 404, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_keeps_status_and_body() {
        let err = SandboxError::Http {
            endpoint: "/tools/run_shell_command".to_string(),
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert_eq!(err.status_code(), Some(502));
        let msg = err.to_string();
        assert!(msg.contains("502"));
        assert!(msg.contains("bad gateway"));
        assert!(msg.contains("/tools/run_shell_command"));
    }

    #[test]
    fn test_not_found_classification() {
        assert!(SandboxError::NotFound("abc".to_string()).is_not_found());
        assert!(SandboxError::Http {
            endpoint: "/containers/abc".to_string(),
            status: 404,
            body: String::new(),
        }
        .is_not_found());
        assert!(!SandboxError::SessionClosed("abc".to_string()).is_not_found());
    }

    #[test]
    fn test_timeout_display() {
        let err = SandboxError::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "Process timed out after 30 seconds");
    }
}
