// ABOUTME: Sandbox manager settings loaded from SANDBOX_* environment variables
// ABOUTME: Validates deployment type, port range, timeouts and extra container environment

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryPolicy;
use crate::types::SandboxType;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },
    #[error("Invalid sandbox type: {0}")]
    InvalidSandboxType(String),
    #[error("Invalid deployment type: {0}")]
    InvalidDeployment(String),
    #[error("Invalid port range: {0}")]
    InvalidPortRange(String),
    #[error("Invalid environment entry: {0}")]
    InvalidEnvironment(String),
}

/// Which backend variant serves `create`/`remove`/`get`/`list`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentType {
    /// Containers on the local Docker daemon
    Docker,
    /// No containers; code runs as child processes of the manager
    Local,
    /// Another manager node reached over the container-management protocol
    Remote,
}

impl FromStr for DeploymentType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "docker" => Ok(DeploymentType::Docker),
            "local" => Ok(DeploymentType::Local),
            "remote" => Ok(DeploymentType::Remote),
            _ => Err(ConfigError::InvalidDeployment(s.to_string())),
        }
    }
}

/// Inclusive host port range handed to the port allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub min: u16,
    pub max: u16,
}

impl PortRange {
    pub fn new(min: u16, max: u16) -> Result<Self, ConfigError> {
        if min == 0 || min > max {
            return Err(ConfigError::InvalidPortRange(format!("{}-{}", min, max)));
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.min..=self.max).contains(&port)
    }

    pub fn len(&self) -> usize {
        (self.max - self.min) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl FromStr for PortRange {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (min, max) = s
            .split_once('-')
            .ok_or_else(|| ConfigError::InvalidPortRange(s.to_string()))?;
        let min = min
            .trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPortRange(s.to_string()))?;
        let max = max
            .trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPortRange(s.to_string()))?;
        PortRange::new(min, max)
    }
}

#[derive(Debug, Clone)]
pub struct SandboxSettings {
    // General
    pub default_sandbox_type: SandboxType,
    /// Maximum live containers; 0 means unlimited
    pub pool_size: usize,
    pub auto_cleanup: bool,
    pub container_prefix: String,
    pub deployment: DeploymentType,

    // Network
    pub port_range: PortRange,
    /// Host name used when building descriptor URLs
    pub host: String,

    // Storage
    pub storage_path: Option<PathBuf>,
    pub mount_dir_name: String,

    // Docker
    pub docker_host: Option<String>,
    pub docker_environment: HashMap<String, String>,
    pub custom_image: Option<String>,

    // Probing and timeouts
    pub ready_attempts: u32,
    pub ready_interval: Duration,
    /// Per-request bound on a single `/healthz` readiness probe
    pub probe_timeout: Duration,
    pub exec_timeout: Duration,
    pub local_timeout: Duration,

    // Local execution
    pub python_bin: String,
    pub shell_bin: String,
    pub local_workdir: Option<PathBuf>,

    // Manager
    pub manager_url: String,
    pub token: Option<String>,
    pub bind_addr: String,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            default_sandbox_type: SandboxType::Base,
            pool_size: 0,
            auto_cleanup: true,
            container_prefix: "sandbox-".to_string(),
            deployment: DeploymentType::Docker,
            port_range: PortRange {
                min: 49152,
                max: 59152,
            },
            host: "localhost".to_string(),
            storage_path: None,
            mount_dir_name: "sessions_mount_dir".to_string(),
            docker_host: None,
            docker_environment: HashMap::new(),
            custom_image: None,
            ready_attempts: 30,
            ready_interval: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(2),
            exec_timeout: Duration::from_secs(60),
            local_timeout: Duration::from_secs(30),
            python_bin: "python3".to_string(),
            shell_bin: "/bin/bash".to_string(),
            local_workdir: None,
            manager_url: "http://localhost:8000".to_string(),
            token: None,
            bind_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

impl SandboxSettings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load settings from an arbitrary variable source; unset variables keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let default_sandbox_type = match get("SANDBOX_DEFAULT_TYPE") {
            Some(v) => v.parse::<SandboxType>().map_err(ConfigError::InvalidSandboxType)?,
            None => defaults.default_sandbox_type,
        };

        let deployment = match get("SANDBOX_DEPLOYMENT") {
            Some(v) => v.parse::<DeploymentType>()?,
            None => defaults.deployment,
        };

        let port_range = match get("SANDBOX_PORT_RANGE") {
            Some(v) => v.parse::<PortRange>()?,
            None => defaults.port_range,
        };

        let docker_environment = match get("SANDBOX_DOCKER_ENV") {
            Some(v) => parse_environment(&v)?,
            None => HashMap::new(),
        };

        let ready_interval_ms: u64 = parse_var(&get, "SANDBOX_READY_INTERVAL_MS", 1000)?;
        let probe_timeout_ms: u64 = parse_var(&get, "SANDBOX_PROBE_TIMEOUT_MS", 2000)?;
        let exec_timeout_secs: u64 = parse_var(&get, "SANDBOX_EXEC_TIMEOUT_SECS", 60)?;
        let local_timeout_secs: u64 = parse_var(&get, "SANDBOX_LOCAL_TIMEOUT_SECS", 30)?;

        Ok(Self {
            default_sandbox_type,
            pool_size: parse_var(&get, "SANDBOX_POOL_SIZE", defaults.pool_size)?,
            auto_cleanup: parse_var(&get, "SANDBOX_AUTO_CLEANUP", defaults.auto_cleanup)?,
            container_prefix: get("SANDBOX_CONTAINER_PREFIX").unwrap_or(defaults.container_prefix),
            deployment,
            port_range,
            host: get("SANDBOX_HOST").unwrap_or(defaults.host),
            storage_path: get("SANDBOX_STORAGE_PATH").map(PathBuf::from),
            mount_dir_name: get("SANDBOX_MOUNT_DIR").unwrap_or(defaults.mount_dir_name),
            docker_host: get("SANDBOX_DOCKER_HOST"),
            docker_environment,
            custom_image: get("SANDBOX_CUSTOM_IMAGE"),
            ready_attempts: parse_var(&get, "SANDBOX_READY_ATTEMPTS", defaults.ready_attempts)?,
            ready_interval: Duration::from_millis(ready_interval_ms),
            probe_timeout: Duration::from_millis(probe_timeout_ms),
            exec_timeout: Duration::from_secs(exec_timeout_secs),
            local_timeout: Duration::from_secs(local_timeout_secs),
            python_bin: get("SANDBOX_PYTHON").unwrap_or(defaults.python_bin),
            shell_bin: get("SANDBOX_SHELL").unwrap_or(defaults.shell_bin),
            local_workdir: get("SANDBOX_LOCAL_WORKDIR").map(PathBuf::from),
            manager_url: get("SANDBOX_MANAGER_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.manager_url),
            token: get("SANDBOX_TOKEN"),
            bind_addr: get("SANDBOX_BIND").unwrap_or(defaults.bind_addr),
        })
    }

    /// Probe budget used for both container-state polling and execution readiness
    pub fn readiness_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.ready_attempts, self.ready_interval)
    }

    /// Image for a sandbox type; custom falls back to the base image when none is configured
    pub fn image_for(&self, sandbox_type: SandboxType) -> String {
        match sandbox_type {
            SandboxType::Base => "agentruntime/sandbox:base".to_string(),
            SandboxType::Filesystem => "agentruntime/sandbox:filesystem".to_string(),
            SandboxType::Browser => "agentruntime/sandbox:browser".to_string(),
            SandboxType::Custom => self
                .custom_image
                .clone()
                .unwrap_or_else(|| "agentruntime/sandbox:base".to_string()),
        }
    }
}

fn parse_var<T, G>(get: &G, var: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue {
                var: var.to_string(),
                value,
            }),
        None => Ok(default),
    }
}

/// Parse `K=V,K2=V2` into a map
fn parse_environment(raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut environment = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidEnvironment(entry.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::InvalidEnvironment(entry.to_string()));
        }
        environment.insert(key.to_string(), value.trim().to_string());
    }
    Ok(environment)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let settings = SandboxSettings::from_lookup(|_| None).unwrap();
        assert_eq!(settings.default_sandbox_type, SandboxType::Base);
        assert_eq!(settings.deployment, DeploymentType::Docker);
        assert_eq!(settings.port_range, PortRange::new(49152, 59152).unwrap());
        assert_eq!(settings.container_prefix, "sandbox-");
        assert!(settings.auto_cleanup);
        assert_eq!(settings.ready_attempts, 30);
        assert_eq!(settings.probe_timeout, Duration::from_secs(2));
        assert_eq!(settings.exec_timeout, Duration::from_secs(60));
        assert_eq!(settings.local_timeout, Duration::from_secs(30));
        assert!(settings.token.is_none());
    }

    #[test]
    fn test_overrides_are_parsed() {
        let settings = SandboxSettings::from_lookup(lookup_from(&[
            ("SANDBOX_DEFAULT_TYPE", "BROWSER"),
            ("SANDBOX_DEPLOYMENT", "local"),
            ("SANDBOX_PORT_RANGE", "20000-20010"),
            ("SANDBOX_POOL_SIZE", "4"),
            ("SANDBOX_AUTO_CLEANUP", "false"),
            ("SANDBOX_DOCKER_ENV", "FOO=bar, LEVEL=debug"),
            ("SANDBOX_READY_INTERVAL_MS", "5"),
            ("SANDBOX_PROBE_TIMEOUT_MS", "250"),
            ("SANDBOX_MANAGER_URL", "http://manager:8000/"),
        ]))
        .unwrap();

        assert_eq!(settings.default_sandbox_type, SandboxType::Browser);
        assert_eq!(settings.deployment, DeploymentType::Local);
        assert_eq!(settings.port_range.len(), 11);
        assert_eq!(settings.pool_size, 4);
        assert!(!settings.auto_cleanup);
        assert_eq!(settings.docker_environment.get("FOO").unwrap(), "bar");
        assert_eq!(settings.docker_environment.get("LEVEL").unwrap(), "debug");
        assert_eq!(settings.ready_interval, Duration::from_millis(5));
        assert_eq!(settings.probe_timeout, Duration::from_millis(250));
        assert_eq!(settings.manager_url, "http://manager:8000");
    }

    #[test]
    fn test_rejects_malformed_values() {
        assert!(matches!(
            SandboxSettings::from_lookup(lookup_from(&[("SANDBOX_PORT_RANGE", "9000-8000")])),
            Err(ConfigError::InvalidPortRange(_))
        ));
        assert!(matches!(
            SandboxSettings::from_lookup(lookup_from(&[("SANDBOX_POOL_SIZE", "many")])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            SandboxSettings::from_lookup(lookup_from(&[("SANDBOX_DEPLOYMENT", "k8s")])),
            Err(ConfigError::InvalidDeployment(_))
        ));
        assert!(matches!(
            SandboxSettings::from_lookup(lookup_from(&[("SANDBOX_DOCKER_ENV", "NOVALUE")])),
            Err(ConfigError::InvalidEnvironment(_))
        ));
    }

    #[test]
    fn test_image_for_custom_falls_back_to_base() {
        let mut settings = SandboxSettings::default();
        assert_eq!(
            settings.image_for(SandboxType::Custom),
            "agentruntime/sandbox:base"
        );
        settings.custom_image = Some("registry.local/my-sandbox:1".to_string());
        assert_eq!(
            settings.image_for(SandboxType::Custom),
            "registry.local/my-sandbox:1"
        );
        assert_eq!(
            settings.image_for(SandboxType::Filesystem),
            "agentruntime/sandbox:filesystem"
        );
    }
}
