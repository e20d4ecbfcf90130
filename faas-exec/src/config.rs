use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{
    docker::DEFAULT_SOCKET,
    error::Error,
    sandbox::{DEFAULT_NODE_IMAGE, DEFAULT_PYTHON_IMAGE},
    types::ResourcePolicy,
};

/// Engine configuration; every field has a default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Limits applied to every sandbox
    pub policy: ResourcePolicy,

    /// Parent directory of the process backend's scratch directories
    pub scratch_root: PathBuf,

    /// Docker daemon socket
    pub docker_socket: PathBuf,

    pub python_image: String,

    pub node_image: String,

    /// Budget for stopping a container after its deadline (ms)
    pub stop_grace_ms: u64,

    /// Budget for reaping a killed process (ms)
    pub kill_grace_ms: u64,

    /// Pull an image on first use when it is missing locally
    pub pull_missing_images: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy: ResourcePolicy::default(),
            scratch_root: std::env::temp_dir().join("faas-exec"),
            docker_socket: PathBuf::from(DEFAULT_SOCKET),
            python_image: DEFAULT_PYTHON_IMAGE.to_string(),
            node_image: DEFAULT_NODE_IMAGE.to_string(),
            stop_grace_ms: 500,
            kill_grace_ms: 500,
            pull_missing_images: true,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.policy.memory_bytes == 0 {
            return Err(Error::Config("policy.memory_bytes must be positive".to_string()));
        }
        if self.policy.cpu_time_secs == 0 {
            return Err(Error::Config("policy.cpu_time_secs must be positive".to_string()));
        }
        if self.stop_grace_ms == 0 || self.kill_grace_ms == 0 {
            return Err(Error::Config("grace periods must be positive".to_string()));
        }
        Ok(())
    }

    pub fn with_policy(mut self, policy: ResourcePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_scratch_root(mut self, scratch_root: PathBuf) -> Self {
        self.scratch_root = scratch_root;
        self
    }

    pub fn with_docker_socket(mut self, docker_socket: PathBuf) -> Self {
        self.docker_socket = docker_socket;
        self
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}
