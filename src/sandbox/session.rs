//! Lifecycle of the one container backing an interpreter.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, SandboxError};
use crate::sandbox::config::SandboxConfig;
use crate::sandbox::engine::{ContainerEngine, ContainerSpec, ContainerStatus};
use crate::sandbox::io::ExecOutput;
use crate::sandbox::staging::{self, StagedArchive};

/// Label carrying the session id on every sandbox container.
pub const SESSION_LABEL: &str = "container-sandbox.session";

/// Idle entrypoint that keeps the container alive between executions.
const IDLE_ENTRYPOINT: [&str; 3] = ["tail", "-f", "/dev/null"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Starting,
    Running,
    Terminated,
}

/// Raw output of a command run without supervision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i64,
}

/// Owns one running container for its lifetime.
///
/// Dropping a session that was never terminated schedules a best-effort
/// removal on the current Tokio runtime. Call [`SandboxSession::terminate`]
/// for deterministic teardown.
pub struct SandboxSession {
    engine: Arc<dyn ContainerEngine>,
    id: Uuid,
    state: SessionState,
    container_id: Option<String>,
    workdir: String,
}

impl fmt::Debug for SandboxSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("container_id", &self.container_id)
            .field("workdir", &self.workdir)
            .finish()
    }
}

impl SandboxSession {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            engine,
            id: Uuid::new_v4(),
            state: SessionState::Uninitialized,
            container_id: None,
            workdir: String::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }

    pub fn workdir(&self) -> &str {
        &self.workdir
    }

    fn running_container(&self) -> Option<&str> {
        match self.state {
            SessionState::Running => self.container_id.as_deref(),
            _ => None,
        }
    }

    fn container_spec(&self, image: &str, config: &SandboxConfig) -> ContainerSpec {
        let mut labels: HashMap<String, String> = config.labels.iter().cloned().collect();
        labels.insert(SESSION_LABEL.to_string(), self.id.to_string());

        ContainerSpec {
            name: format!("{}-{}", config.name_prefix, self.id.simple()),
            image: image.to_string(),
            entrypoint: IDLE_ENTRYPOINT.iter().map(|s| s.to_string()).collect(),
            working_dir: config.container_workdir.clone(),
            env: config.env.iter().map(|(k, v)| format!("{k}={v}")).collect(),
            labels,
            memory_bytes: config.limits.memory_i64(),
            nano_cpus: config.limits.nano_cpus(),
            pids_limit: i64::from(config.limits.max_processes),
        }
    }

    /// Validate limits, make sure the image is present, then create and
    /// start the idle container with the limits bound at creation.
    pub async fn start(&mut self, image: &str, config: &SandboxConfig) -> Result<()> {
        if self.state != SessionState::Uninitialized {
            return Err(SandboxError::Config(format!(
                "session {} already started",
                self.id
            )));
        }
        config.limits.validate()?;

        self.state = SessionState::Starting;
        match self.start_container(image, config).await {
            Ok(()) => {
                self.state = SessionState::Running;
                self.workdir = config.container_workdir.clone();
                Ok(())
            }
            Err(error) => {
                // Nothing may outlive a failed start.
                if let Some(id) = self.container_id.take() {
                    if let Err(cleanup) = self.engine.remove_container(&id).await {
                        warn!(container = %id, error = %cleanup, "failed to remove container after failed start");
                    }
                }
                self.state = SessionState::Terminated;
                Err(error)
            }
        }
    }

    async fn start_container(&mut self, image: &str, config: &SandboxConfig) -> Result<()> {
        self.engine
            .ping()
            .await
            .map_err(SandboxError::EngineUnavailable)?;

        let present = self
            .engine
            .image_exists(image)
            .await
            .map_err(SandboxError::EngineUnavailable)?;
        if !present {
            info!(image, "pulling sandbox image");
            self.engine
                .pull_image(image)
                .await
                .map_err(|source| SandboxError::ImagePull {
                    image: image.to_string(),
                    source,
                })?;
        }

        let spec = self.container_spec(image, config);
        let container_id = self
            .engine
            .create_container(&spec)
            .await
            .map_err(SandboxError::ContainerCreate)?;
        self.container_id = Some(container_id.clone());

        self.engine
            .start_container(&container_id)
            .await
            .map_err(SandboxError::ContainerCreate)?;

        info!(
            session = %self.id,
            container = %container_id,
            image,
            memory_bytes = spec.memory_bytes,
            nano_cpus = spec.nano_cpus,
            pids_limit = spec.pids_limit,
            "sandbox container started"
        );
        Ok(())
    }

    /// Re-check liveness before reuse. A stopped container is started again
    /// (its filesystem survives); a vanished one is reported as lost.
    pub async fn ensure_running(&self) -> Result<()> {
        let Some(id) = self.running_container() else {
            return Err(SandboxError::SessionClosed);
        };
        match self
            .engine
            .container_status(id)
            .await
            .map_err(SandboxError::EngineUnavailable)?
        {
            ContainerStatus::Running => Ok(()),
            ContainerStatus::Stopped { oom_killed } => {
                warn!(container = %id, oom_killed, "sandbox container stopped, restarting");
                self.revive().await
            }
            ContainerStatus::Missing => Err(SandboxError::ContainerLost(id.to_string())),
        }
    }

    /// Start the container again after it was killed.
    pub async fn revive(&self) -> Result<()> {
        let Some(id) = self.running_container() else {
            return Err(SandboxError::SessionClosed);
        };
        self.engine
            .start_container(id)
            .await
            .map_err(SandboxError::ContainerCreate)?;
        debug!(container = %id, "sandbox container revived");
        Ok(())
    }

    /// Whether the engine flagged the container as OOM-killed.
    pub async fn was_oom_killed(&self) -> bool {
        let Some(id) = self.running_container() else {
            return false;
        };
        matches!(
            self.engine.container_status(id).await,
            Ok(ContainerStatus::Stopped { oom_killed: true })
        )
    }

    /// Launch `command` on its own task. The task streams output into
    /// `output` and resolves to the exit code. Aborting the task, or killing
    /// the container, cancels the exec.
    pub fn spawn_run(
        &self,
        command: Vec<String>,
        output: ExecOutput,
    ) -> Result<JoinHandle<Result<i64>>> {
        let Some(id) = self.running_container() else {
            return Err(SandboxError::SessionClosed);
        };
        let engine = Arc::clone(&self.engine);
        let id = id.to_string();
        let workdir = self.workdir.clone();

        debug!(container = %id, ?command, "starting exec");
        Ok(tokio::spawn(async move {
            engine
                .exec(&id, &command, &workdir, &output)
                .await
                .map_err(SandboxError::ExecFailed)
        }))
    }

    /// Run a command to completion with no deadline.
    pub async fn run(&self, command: &[String]) -> Result<RunOutput> {
        let output = ExecOutput::new();
        let handle = self.spawn_run(command.to_vec(), output.clone())?;
        let exit_code = handle
            .await
            .map_err(|e| SandboxError::ExecFailed(anyhow::anyhow!("run task failed: {e}")))??;
        let (stdout, stderr) = output.snapshot();
        Ok(RunOutput {
            stdout,
            stderr,
            exit_code,
        })
    }

    /// SIGKILL everything in the container. The container stops and needs
    /// [`SandboxSession::revive`] before the next run.
    pub async fn kill(&self) -> Result<()> {
        let Some(id) = self.running_container() else {
            return Ok(());
        };
        self.engine
            .kill_container(id)
            .await
            .map_err(SandboxError::ExecFailed)
    }

    async fn upload(&self, container_dir: &str, archive: StagedArchive) -> Result<()> {
        let Some(id) = self.running_container() else {
            return Err(SandboxError::Upload(
                container_dir.to_string(),
                anyhow::anyhow!("session is not running"),
            ));
        };
        self.engine
            .upload_archive(id, container_dir, archive.bytes)
            .await
            .map_err(|e| SandboxError::Upload(container_dir.to_string(), e))?;
        debug!(container = %id, container_dir, files = archive.file_count, "archive uploaded");
        Ok(())
    }

    /// Copy every regular file below `host_dir` into `container_dir`.
    /// Returns the number of files uploaded.
    pub async fn upload_tree(&self, host_dir: &Path, container_dir: &str) -> Result<usize> {
        let archive = staging::archive_directory(host_dir)?;
        let file_count = archive.file_count;
        if file_count == 0 {
            debug!(host_dir = %host_dir.display(), "workspace is empty, nothing to upload");
            return Ok(0);
        }
        self.upload(container_dir, archive).await?;
        Ok(file_count)
    }

    /// Write one file called `name` into `container_dir` and return its
    /// path inside the container.
    pub async fn upload_file(
        &self,
        container_dir: &str,
        name: &str,
        content: &[u8],
    ) -> Result<String> {
        let archive = staging::archive_file(name, content)?;
        self.upload(container_dir, archive).await?;
        Ok(format!("{}/{}", container_dir.trim_end_matches('/'), name))
    }

    /// Force-remove the container. Idempotent.
    pub async fn terminate(&mut self) -> Result<()> {
        if self.state == SessionState::Terminated {
            return Ok(());
        }
        self.state = SessionState::Terminated;

        let Some(id) = self.container_id.take() else {
            return Ok(());
        };
        match self.engine.remove_container(&id).await {
            Ok(()) => {
                info!(session = %self.id, container = %id, "sandbox container removed");
                Ok(())
            }
            Err(error) => {
                warn!(session = %self.id, container = %id, error = %error, "failed to remove sandbox container");
                Err(SandboxError::Teardown(error))
            }
        }
    }
}

impl Drop for SandboxSession {
    fn drop(&mut self) {
        let Some(id) = self.container_id.take() else {
            return;
        };
        if self.state == SessionState::Terminated {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(session = %self.id, container = %id, "session dropped without terminate, removing container");
                let engine = Arc::clone(&self.engine);
                handle.spawn(async move {
                    if let Err(error) = engine.remove_container(&id).await {
                        warn!(container = %id, error = %error, "failed to remove leaked container");
                    }
                });
            }
            Err(_) => {
                warn!(session = %self.id, container = %id, "session dropped outside a Tokio runtime, container left behind");
            }
        }
    }
}
