// ABOUTME: Shared data model for sandbox descriptors and execution results
// ABOUTME: Mirrors the JSON shapes of the execution and container-management protocols

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Capability profile of a sandbox, selecting its container image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SandboxType {
    #[default]
    #[serde(alias = "BASE")]
    Base,
    #[serde(alias = "FILESYSTEM")]
    Filesystem,
    #[serde(alias = "BROWSER")]
    Browser,
    #[serde(alias = "CUSTOM")]
    Custom,
}

impl SandboxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxType::Base => "base",
            SandboxType::Filesystem => "filesystem",
            SandboxType::Browser => "browser",
            SandboxType::Custom => "custom",
        }
    }
}

impl fmt::Display for SandboxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SandboxType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "base" => Ok(SandboxType::Base),
            "filesystem" => Ok(SandboxType::Filesystem),
            "browser" => Ok(SandboxType::Browser),
            "custom" => Ok(SandboxType::Custom),
            _ => Err(format!("Unknown sandbox type: {}", s)),
        }
    }
}

/// Record of a provisioned sandbox: address, credential and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerDescriptor {
    pub session_id: String,
    pub container_id: String,
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_url: Option<String>,
    /// First entry is the execution port, second the browser port
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(alias = "sandboxType")]
    pub sandbox_type: SandboxType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_token: Option<String>,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ContainerDescriptor {
    pub fn primary_port(&self) -> Option<u16> {
        self.ports.first().copied()
    }

    pub fn browser_port(&self) -> Option<u16> {
        self.ports.get(1).copied()
    }
}

/// Label attached to one piece of execution output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Stdout,
    Stderr,
    #[serde(alias = "return_code")]
    Returncode,
    Output,
    Error,
    Text,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TextContent {
    pub fn new(kind: ContentKind, text: impl Into<String>) -> Self {
        let description = match kind {
            ContentKind::Stdout => Some("Standard output"),
            ContentKind::Stderr => Some("Standard error"),
            ContentKind::Returncode => Some("Command return code"),
            ContentKind::Output => Some("Execution output"),
            ContentKind::Error => Some("Execution error"),
            ContentKind::Text | ContentKind::Other => None,
        };
        Self {
            kind,
            text: text.into(),
            description: description.map(str::to_string),
        }
    }
}

/// Outcome of one execution call. A failing user program is `is_error`, not a fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub content: Vec<TextContent>,
    #[serde(default)]
    pub is_error: bool,
}

impl ExecutionResult {
    pub fn new(content: Vec<TextContent>, is_error: bool) -> Self {
        Self { content, is_error }
    }

    /// Single `error` entry result, used when infrastructure failures must be reported in-band
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![TextContent::new(ContentKind::Error, message)],
            is_error: true,
        }
    }

    /// First entry of the given kind
    pub fn find(&self, kind: &ContentKind) -> Option<&TextContent> {
        self.content.iter().find(|c| &c.kind == kind)
    }

    pub fn text_of(&self, kind: &ContentKind) -> Option<&str> {
        self.find(kind).map(|c| c.text.as_str())
    }
}

/// Body of `POST /tools/run_ipython_cell`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PythonRequest {
    pub code: String,
    #[serde(default)]
    pub split_output: bool,
}

/// Body of `POST /tools/run_shell_command`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellRequest {
    pub command: String,
    #[serde(default)]
    pub split_output: bool,
}
