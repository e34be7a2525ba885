//! The seam between a sandbox session and the container daemon.
//!
//! [`ContainerEngine`] is the narrow set of daemon operations a session
//! needs. [`DockerEngine`] implements it over the Docker Engine API.

use std::collections::HashMap;

use anyhow::{bail, Context};
use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptionsBuilder, CreateImageOptionsBuilder, InspectContainerOptions,
    KillContainerOptionsBuilder, RemoveContainerOptionsBuilder, StartContainerOptions,
    UploadToContainerOptionsBuilder,
};
use bollard::Docker;
use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt};
use tracing::debug;

use crate::sandbox::io::ExecOutput;

/// Everything the engine needs to create a sandbox container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Long-lived idle entrypoint; work arrives through exec calls.
    pub entrypoint: Vec<String>,
    pub working_dir: String,
    /// `KEY=VALUE` pairs.
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    pub memory_bytes: i64,
    pub nano_cpus: i64,
    pub pids_limit: i64,
}

/// Observed state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Running,
    Stopped { oom_killed: bool },
    Missing,
}

/// Container daemon operations used by a sandbox session.
///
/// Implementations must treat removal and killing of an already-gone
/// container as success.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Check that the daemon answers.
    async fn ping(&self) -> anyhow::Result<()>;

    async fn image_exists(&self, image: &str) -> anyhow::Result<bool>;

    async fn pull_image(&self, image: &str) -> anyhow::Result<()>;

    /// Create a container and return its id.
    async fn create_container(&self, spec: &ContainerSpec) -> anyhow::Result<String>;

    async fn start_container(&self, id: &str) -> anyhow::Result<()>;

    async fn container_status(&self, id: &str) -> anyhow::Result<ContainerStatus>;

    /// Run `command` in the container, streaming its output into `output`,
    /// and return the exit code once the command finishes.
    async fn exec(
        &self,
        id: &str,
        command: &[String],
        working_dir: &str,
        output: &ExecOutput,
    ) -> anyhow::Result<i64>;

    /// Extract a tar archive into `dest_dir` inside the container.
    async fn upload_archive(&self, id: &str, dest_dir: &str, archive: Vec<u8>)
        -> anyhow::Result<()>;

    /// SIGKILL every process in the container.
    async fn kill_container(&self, id: &str) -> anyhow::Result<()>;

    /// Force-remove the container.
    async fn remove_container(&self, id: &str) -> anyhow::Result<()>;
}

/// [`ContainerEngine`] over a Docker (or Docker-compatible) daemon.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect using the platform defaults (`DOCKER_HOST` or the local socket).
    pub fn connect() -> anyhow::Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().context("failed to connect to docker daemon")?;
        Ok(Self { docker })
    }

    /// Wrap an existing client.
    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }
}

fn status_code(error: &BollardError) -> Option<u16> {
    match error {
        BollardError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

fn is_not_found(error: &BollardError) -> bool {
    status_code(error) == Some(404)
}

/// Split `repo[:tag]`, ignoring a colon that belongs to a registry port.
fn split_image_tag(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, tag),
        _ => (image, "latest"),
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ping(&self) -> anyhow::Result<()> {
        self.docker.ping().await.context("docker ping failed")?;
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> anyhow::Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(error) if is_not_found(&error) => Ok(false),
            Err(error) => Err(error).context("failed to inspect image"),
        }
    }

    async fn pull_image(&self, image: &str) -> anyhow::Result<()> {
        let (from_image, tag) = split_image_tag(image);
        self.docker
            .create_image(
                Some(
                    CreateImageOptionsBuilder::new()
                        .from_image(from_image)
                        .tag(tag)
                        .build(),
                ),
                None,
                None,
            )
            .try_collect::<Vec<_>>()
            .await
            .with_context(|| format!("failed to pull {image}"))?;
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> anyhow::Result<String> {
        let body = ContainerCreateBody {
            image: Some(spec.image.clone()),
            entrypoint: Some(spec.entrypoint.clone()),
            cmd: Some(Vec::new()),
            working_dir: Some(spec.working_dir.clone()),
            env: if spec.env.is_empty() {
                None
            } else {
                Some(spec.env.clone())
            },
            labels: Some(spec.labels.clone()),
            host_config: Some(HostConfig {
                memory: Some(spec.memory_bytes),
                // Equal to memory: no swap headroom, so overruns hit the OOM killer.
                memory_swap: Some(spec.memory_bytes),
                nano_cpus: Some(spec.nano_cpus),
                pids_limit: Some(spec.pids_limit),
                security_opt: Some(vec!["no-new-privileges".to_string()]),
                ..HostConfig::default()
            }),
            ..ContainerCreateBody::default()
        };

        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptionsBuilder::new().name(&spec.name).build()),
                body,
            )
            .await
            .with_context(|| format!("failed to create container {}", spec.name))?;
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> anyhow::Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions>)
            .await
            .with_context(|| format!("failed to start container {id}"))
    }

    async fn container_status(&self, id: &str) -> anyhow::Result<ContainerStatus> {
        let inspect = match self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => inspect,
            Err(error) if is_not_found(&error) => return Ok(ContainerStatus::Missing),
            Err(error) => return Err(error).context("failed to inspect container"),
        };

        let state = inspect.state.unwrap_or_default();
        if state.running.unwrap_or(false) {
            Ok(ContainerStatus::Running)
        } else {
            Ok(ContainerStatus::Stopped {
                oom_killed: state.oom_killed.unwrap_or(false),
            })
        }
    }

    async fn exec(
        &self,
        id: &str,
        command: &[String],
        working_dir: &str,
        output: &ExecOutput,
    ) -> anyhow::Result<i64> {
        let exec = self
            .docker
            .create_exec(
                id,
                CreateExecOptions::<String> {
                    cmd: Some(command.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    working_dir: Some(working_dir.to_string()),
                    ..Default::default()
                },
            )
            .await
            .context("failed to create exec")?;

        match self
            .docker
            .start_exec(&exec.id, None::<StartExecOptions>)
            .await
            .context("failed to start exec")?
        {
            StartExecResults::Attached {
                output: mut stream, ..
            } => {
                while let Some(chunk) = stream.next().await {
                    match chunk.context("exec output stream failed")? {
                        LogOutput::StdOut { message } => output.stdout.extend(&message),
                        LogOutput::StdErr { message } => output.stderr.extend(&message),
                        LogOutput::Console { message } => output.stdout.extend(&message),
                        LogOutput::StdIn { .. } => {}
                    }
                }
            }
            StartExecResults::Detached => bail!("exec started detached"),
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .context("failed to inspect exec")?;
        debug!(exec_id = %exec.id, exit_code = ?inspect.exit_code, "exec finished");
        // No exit code means the exec never completed, e.g. the container died.
        Ok(inspect.exit_code.unwrap_or(-1))
    }

    async fn upload_archive(
        &self,
        id: &str,
        dest_dir: &str,
        archive: Vec<u8>,
    ) -> anyhow::Result<()> {
        self.docker
            .upload_to_container(
                id,
                Some(UploadToContainerOptionsBuilder::new().path(dest_dir).build()),
                bollard::body_full(Bytes::from(archive)),
            )
            .await
            .with_context(|| format!("failed to upload archive to {dest_dir}"))
    }

    async fn kill_container(&self, id: &str) -> anyhow::Result<()> {
        match self
            .docker
            .kill_container(
                id,
                Some(KillContainerOptionsBuilder::new().signal("SIGKILL").build()),
            )
            .await
        {
            Ok(()) => Ok(()),
            // 404: gone, 409: not running. Either way nothing is left to kill.
            Err(error) if matches!(status_code(&error), Some(404 | 409)) => Ok(()),
            Err(error) => Err(error).context("failed to kill container"),
        }
    }

    async fn remove_container(&self, id: &str) -> anyhow::Result<()> {
        match self
            .docker
            .remove_container(
                id,
                Some(
                    RemoveContainerOptionsBuilder::new()
                        .force(true)
                        .v(true)
                        .build(),
                ),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(error) if is_not_found(&error) => Ok(()),
            Err(error) => Err(error).context("failed to remove container"),
        }
    }
}
