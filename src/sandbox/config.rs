//! Sandbox configuration with builder pattern.

use std::path::PathBuf;
use std::time::Duration;

use crate::sandbox::catalog::Runtime;
use crate::sandbox::limits::ResourceLimits;

/// Configuration for one interpreter session.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Runtime the session container is started from.
    pub runtime: Runtime,
    /// Resource ceilings for the container and each execution.
    pub limits: ResourceLimits,
    /// Host directory uploaded into the container once at construction.
    pub workspace_dir: Option<PathBuf>,
    /// Working directory inside the container; the workspace lands here.
    pub container_workdir: String,
    /// Directory inside the container that receives staged source files.
    pub scratch_dir: String,
    /// How long to wait for an in-flight exec to wind down after a kill.
    pub kill_grace: Duration,
    /// Prefix for container names.
    pub name_prefix: String,
    /// Environment variables set on the container.
    pub env: Vec<(String, String)>,
    /// Extra labels attached to the container.
    pub labels: Vec<(String, String)>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            runtime: Runtime::Python311,
            limits: ResourceLimits::default(),
            workspace_dir: None,
            container_workdir: "/workspace".to_string(),
            scratch_dir: "/tmp".to_string(),
            kill_grace: Duration::from_secs(2),
            name_prefix: "sandbox".to_string(),
            env: Vec::new(),
            labels: Vec::new(),
        }
    }
}

impl SandboxConfig {
    /// Create a new builder for SandboxConfig.
    pub fn builder() -> SandboxConfigBuilder {
        SandboxConfigBuilder::default()
    }
}

/// Builder for creating SandboxConfig instances.
#[derive(Debug, Clone, Default)]
pub struct SandboxConfigBuilder {
    runtime: Option<Runtime>,
    limits: Option<ResourceLimits>,
    workspace_dir: Option<PathBuf>,
    container_workdir: Option<String>,
    scratch_dir: Option<String>,
    kill_grace: Option<Duration>,
    name_prefix: Option<String>,
    env: Vec<(String, String)>,
    labels: Vec<(String, String)>,
}

impl SandboxConfigBuilder {
    /// Set the runtime.
    pub fn runtime(mut self, runtime: Runtime) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Set all resource limits at once.
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Set the per-execution timeout, keeping the other limits.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        let limits = self.limits.take().unwrap_or_default();
        self.limits = Some(ResourceLimits { timeout, ..limits });
        self
    }

    /// Set the memory ceiling in bytes, keeping the other limits.
    pub fn max_memory(mut self, bytes: u64) -> Self {
        let limits = self.limits.take().unwrap_or_default();
        self.limits = Some(ResourceLimits {
            memory_bytes: bytes,
            ..limits
        });
        self
    }

    /// Set a host directory to upload into the container workdir.
    pub fn workspace_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.workspace_dir = Some(path.into());
        self
    }

    /// Set the working directory inside the container.
    pub fn container_workdir(mut self, path: impl Into<String>) -> Self {
        self.container_workdir = Some(path.into());
        self
    }

    /// Set the directory that receives staged source files.
    pub fn scratch_dir(mut self, path: impl Into<String>) -> Self {
        self.scratch_dir = Some(path.into());
        self
    }

    /// Set the grace period granted to an exec after a timeout kill.
    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = Some(grace);
        self
    }

    /// Set the container name prefix.
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Add several environment variables.
    pub fn envs<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Add a container label.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    /// Build the SandboxConfig.
    pub fn build(self) -> SandboxConfig {
        let default = SandboxConfig::default();
        SandboxConfig {
            runtime: self.runtime.unwrap_or(default.runtime),
            limits: self.limits.unwrap_or(default.limits),
            workspace_dir: self.workspace_dir.or(default.workspace_dir),
            container_workdir: self.container_workdir.unwrap_or(default.container_workdir),
            scratch_dir: self.scratch_dir.unwrap_or(default.scratch_dir),
            kill_grace: self.kill_grace.unwrap_or(default.kill_grace),
            name_prefix: self.name_prefix.unwrap_or(default.name_prefix),
            env: self.env,
            labels: self.labels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SandboxConfig::default();
        assert_eq!(config.runtime, Runtime::Python311);
        assert_eq!(config.limits.timeout, Duration::from_secs(30));
        assert_eq!(config.container_workdir, "/workspace");
        assert!(config.workspace_dir.is_none());
    }

    #[test]
    fn test_builder() {
        let config = SandboxConfig::builder()
            .runtime(Runtime::Node20)
            .timeout(Duration::from_secs(5))
            .max_memory(32 * 1024 * 1024)
            .workspace_dir("/srv/project")
            .env("MODE", "test")
            .envs([("A", "1"), ("B", "2")])
            .build();

        assert_eq!(config.runtime, Runtime::Node20);
        assert_eq!(config.limits.timeout, Duration::from_secs(5));
        assert_eq!(config.limits.memory_bytes, 32 * 1024 * 1024);
        // Untouched limits keep their defaults.
        assert_eq!(config.limits.max_processes, 64);
        assert_eq!(config.workspace_dir, Some(PathBuf::from("/srv/project")));
        assert_eq!(config.env.len(), 3);
    }
}
