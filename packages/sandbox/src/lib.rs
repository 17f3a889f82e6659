// ABOUTME: Sandbox lifecycle and execution core for the agent runtime
// ABOUTME: Provisions isolated sandboxes, tracks sessions and executes code against them

pub mod backend;
pub mod client;
pub mod error;
pub mod executor;
pub mod factory;
pub mod ports;
pub mod providers;
pub mod registry;
pub mod retry;
pub mod session;
pub mod settings;
pub mod tools;
pub mod types;
pub mod validation;

pub use backend::{build_backend, ContainerBackend, LocalBackend, RemoteBackend, SandboxBackend};
pub use client::ExecutionClient;
pub use error::{Result, SandboxError};
pub use executor::{into_execution_result, LocalExecutor};
pub use factory::{SessionFactory, SessionTimeouts};
pub use ports::PortAllocator;
pub use providers::{ContainerRuntime, DockerRuntime, RuntimeError};
pub use registry::ContainerRegistry;
pub use retry::RetryPolicy;
pub use session::SandboxSession;
pub use tools::{PythonTool, ShellTool};
pub use settings::{ConfigError, DeploymentType, PortRange, SandboxSettings};
pub use types::{
    ContainerDescriptor, ContentKind, ExecutionResult, PythonRequest, SandboxType, ShellRequest,
    TextContent,
};
pub use validation::validate_session_id;
