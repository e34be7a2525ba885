//! Wall-clock enforcement around a session run.
//!
//! The run executes on its own task and races a deadline. When the deadline
//! wins, the whole container is SIGKILLed, since a single exec may have
//! spawned children that ignore softer signals. The run task is then joined
//! and the container started again so the session stays usable.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{Result, SandboxError};
use crate::sandbox::executor::{ExecutionOutcome, ExecutionResult};
use crate::sandbox::io::ExecOutput;
use crate::sandbox::limits::OOM_EXIT_CODE;
use crate::sandbox::session::SandboxSession;

/// Exit code reported when a run was timed out; not meaningful.
pub const TIMED_OUT_EXIT_CODE: i64 = -1;

/// Map an exit code to an outcome. `oom_flagged` is the engine's own
/// OOM-kill flag for the container.
pub fn classify(exit_code: i64, oom_flagged: bool) -> ExecutionOutcome {
    match exit_code {
        0 => ExecutionOutcome::Normal,
        OOM_EXIT_CODE => ExecutionOutcome::OutOfMemory,
        _ if oom_flagged => ExecutionOutcome::OutOfMemory,
        _ => ExecutionOutcome::NonZeroExit,
    }
}

/// Runs commands in a session under a wall-clock deadline. Stateless apart
/// from its two durations.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionSupervisor {
    timeout: Duration,
    kill_grace: Duration,
}

impl ExecutionSupervisor {
    pub fn new(timeout: Duration, kill_grace: Duration) -> Self {
        Self {
            timeout,
            kill_grace,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `command` in `session` and classify the outcome.
    pub async fn supervise(
        &self,
        session: &SandboxSession,
        command: Vec<String>,
    ) -> Result<ExecutionResult> {
        let started = Instant::now();
        let output = ExecOutput::new();
        let mut handle = session.spawn_run(command, output.clone())?;

        // Biased towards the deadline: once it has passed, it wins even if
        // the run completed in the same instant.
        let finished = tokio::select! {
            biased;
            _ = tokio::time::sleep(self.timeout) => None,
            joined = &mut handle => Some(joined),
        };

        let Some(joined) = finished else {
            warn!(timeout = ?self.timeout, "execution timed out, killing sandbox container");
            if let Err(error) = session.kill().await {
                warn!(error = %error, "failed to kill sandbox container");
            }
            match tokio::time::timeout(self.kill_grace, &mut handle).await {
                Ok(_) => debug!("timed out run joined after kill"),
                Err(_) => {
                    warn!("timed out run did not finish after kill, aborting it");
                    handle.abort();
                }
            }
            if let Err(error) = session.revive().await {
                // The liveness check before the next execution retries this.
                warn!(error = %error, "failed to restart sandbox container after timeout");
            }

            let (stdout, stderr) = output.snapshot();
            return Ok(ExecutionResult {
                stdout,
                stderr,
                exit_code: TIMED_OUT_EXIT_CODE,
                wall_clock: started.elapsed(),
                outcome: ExecutionOutcome::TimedOut,
            });
        };

        let exit_code = joined
            .map_err(|e| SandboxError::ExecFailed(anyhow::anyhow!("run task failed: {e}")))??;
        let wall_clock = started.elapsed();

        let oom_flagged = exit_code != 0 && session.was_oom_killed().await;
        let outcome = classify(exit_code, oom_flagged);
        debug!(exit_code, ?outcome, ?wall_clock, "execution finished");

        let (stdout, stderr) = output.snapshot();
        Ok(ExecutionResult {
            stdout,
            stderr,
            exit_code,
            wall_clock,
            outcome,
        })
    }
}
