//! The interpreter facade: one session, many executions.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, SandboxError};
use crate::sandbox::catalog::{LanguageFamily, Runtime};
use crate::sandbox::config::SandboxConfig;
use crate::sandbox::engine::{ContainerEngine, DockerEngine};
use crate::sandbox::io::ExecOutput;
use crate::sandbox::limits::ResourceLimits;
use crate::sandbox::session::{SandboxSession, SessionState};
use crate::sandbox::supervisor::ExecutionSupervisor;

/// Prefix of staged source file names.
const SCRIPT_PREFIX: &str = "sandbox";

/// How the executed code ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Exited with code 0.
    Normal,
    /// Exited with any other code that is not an OOM kill.
    NonZeroExit,
    /// Killed by the engine for exceeding the memory ceiling.
    OutOfMemory,
    /// Ran past the wall-clock timeout and was killed.
    TimedOut,
}

/// Result of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Captured stdout output.
    pub stdout: Vec<u8>,
    /// Captured stderr output.
    pub stderr: Vec<u8>,
    /// Exit code. Not meaningful when the outcome is `TimedOut`.
    pub exit_code: i64,
    /// Time from launch to completion or kill.
    pub wall_clock: Duration,
    pub outcome: ExecutionOutcome,
}

impl ExecutionResult {
    /// Check if the execution was successful (exit code 0).
    pub fn is_success(&self) -> bool {
        self.outcome == ExecutionOutcome::Normal
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    pub fn wall_clock_seconds(&self) -> f64 {
        self.wall_clock.as_secs_f64()
    }
}

/// What the confirmation hook gets to look at before code is staged.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionRequest<'a> {
    pub source_code: &'a str,
    pub language: LanguageFamily,
}

/// Pre-execution policy hook. Returning `false` aborts the execution.
pub type ConfirmHook = Arc<dyn Fn(&ExecutionRequest<'_>) -> bool + Send + Sync>;

/// A sandboxed code interpreter backed by one long-lived container.
///
/// Executions are serialized and share the container filesystem, so each
/// one sees the files left by the previous one. Use separate interpreters
/// when executions must not observe each other.
pub struct Interpreter {
    config: SandboxConfig,
    session: Mutex<SandboxSession>,
    confirm: Option<ConfirmHook>,
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("config", &self.config)
            .field("session", &self.session)
            .field("confirm", &self.confirm.is_some())
            .finish()
    }
}

impl Interpreter {
    /// Create an interpreter on the local Docker daemon.
    ///
    /// Limits are validated before the daemon is contacted. The container
    /// is started eagerly and the workspace, if any, is uploaded before this
    /// returns.
    pub async fn new(config: SandboxConfig) -> Result<Self> {
        config.limits.validate()?;
        let engine = DockerEngine::connect().map_err(SandboxError::EngineUnavailable)?;
        Self::with_engine(config, Arc::new(engine)).await
    }

    /// Create an interpreter for a runtime id such as `"python:3.11"`.
    pub async fn from_runtime_id(
        runtime_id: &str,
        limits: ResourceLimits,
        workspace_dir: Option<std::path::PathBuf>,
    ) -> Result<Self> {
        let runtime: Runtime = runtime_id.parse()?;
        let mut builder = SandboxConfig::builder().runtime(runtime).limits(limits);
        if let Some(dir) = workspace_dir {
            builder = builder.workspace_dir(dir);
        }
        Self::new(builder.build()).await
    }

    /// Create an interpreter on a caller-supplied engine.
    pub async fn with_engine(
        config: SandboxConfig,
        engine: Arc<dyn ContainerEngine>,
    ) -> Result<Self> {
        config.limits.validate()?;
        if let Some(dir) = &config.workspace_dir {
            if !dir.is_dir() {
                return Err(SandboxError::DirectoryNotFound(dir.clone()));
            }
        }

        let resolved = config.runtime.resolve();
        let mut session = SandboxSession::new(engine);
        session.start(resolved.image, &config).await?;

        if let Some(dir) = &config.workspace_dir {
            let uploaded = session
                .upload_tree(dir, &config.container_workdir)
                .await;
            match uploaded {
                Ok(files) => info!(files, dir = %dir.display(), "workspace uploaded"),
                Err(error) => {
                    if let Err(cleanup) = session.terminate().await {
                        warn!(error = %cleanup, "failed to tear down session after workspace upload failure");
                    }
                    return Err(error);
                }
            }
        }

        Ok(Self {
            config,
            session: Mutex::new(session),
            confirm: None,
        })
    }

    /// Register a confirmation hook consulted before every execution.
    pub fn with_confirmation<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ExecutionRequest<'_>) -> bool + Send + Sync + 'static,
    {
        self.confirm = Some(Arc::new(hook));
        self
    }

    pub fn runtime(&self) -> Runtime {
        self.config.runtime
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.config.limits
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Whether `dispose` has run.
    pub async fn is_disposed(&self) -> bool {
        self.session.lock().await.state() == SessionState::Terminated
    }

    /// Execute `code` written in `language`.
    ///
    /// Non-zero exits, OOM kills and timeouts are reported on the result;
    /// only sandbox machinery failures are returned as errors.
    pub async fn execute(&self, code: &str, language: &str) -> Result<ExecutionResult> {
        let session = self.session.lock().await;
        if session.state() == SessionState::Terminated {
            return Err(SandboxError::SessionClosed);
        }

        let runtime = self.config.runtime;
        let family = LanguageFamily::from_language(language)
            .filter(|family| *family == runtime.family())
            .ok_or_else(|| SandboxError::UnsupportedLanguage {
                language: language.to_string(),
                runtime: runtime.id().to_string(),
            })?;

        if let Some(confirm) = &self.confirm {
            let request = ExecutionRequest {
                source_code: code,
                language: family,
            };
            if !confirm(&request) {
                info!(%family, "execution declined by confirmation hook");
                return Err(SandboxError::ExecutionAborted);
            }
        }

        session.ensure_running().await?;

        let file_name = format!(
            "{}-{}.{}",
            SCRIPT_PREFIX,
            Uuid::new_v4().simple(),
            family.extension()
        );
        let path = session
            .upload_file(&self.config.scratch_dir, &file_name, code.as_bytes())
            .await?;
        debug!(%path, "source staged");

        let supervisor = ExecutionSupervisor::new(self.config.limits.timeout, self.config.kill_grace);
        let result = supervisor
            .supervise(&session, family.command_for(&path))
            .await;

        self.remove_staged(&session, &path).await;
        result
    }

    /// Best effort: failure is logged, never returned.
    async fn remove_staged(&self, session: &SandboxSession, path: &str) {
        let command = vec!["rm".to_string(), "-f".to_string(), path.to_string()];
        let output = ExecOutput::new();
        let mut handle = match session.spawn_run(command, output) {
            Ok(handle) => handle,
            Err(error) => {
                warn!(%path, error = %error, "failed to remove staged source");
                return;
            }
        };
        match tokio::time::timeout(self.config.kill_grace, &mut handle).await {
            Ok(Ok(Ok(0))) => {}
            Ok(Ok(Ok(exit_code))) => {
                warn!(%path, exit_code, "failed to remove staged source")
            }
            Ok(Ok(Err(error))) => warn!(%path, error = %error, "failed to remove staged source"),
            Ok(Err(error)) => warn!(%path, error = %error, "staged source removal task failed"),
            Err(_) => {
                warn!(%path, "timed out removing staged source");
                handle.abort();
            }
        }
    }

    /// Write a file into the container working directory, returning its
    /// path inside the container.
    pub async fn upload_file(&self, name: &str, content: &[u8]) -> Result<String> {
        let session = self.session.lock().await;
        if session.state() == SessionState::Terminated {
            return Err(SandboxError::SessionClosed);
        }
        session.ensure_running().await?;
        session
            .upload_file(&self.config.container_workdir, name, content)
            .await
    }

    /// Tear down the container. Safe to call any number of times.
    pub async fn dispose(&self) -> Result<()> {
        self.session.lock().await.terminate().await
    }
}
