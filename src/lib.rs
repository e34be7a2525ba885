//! # Container Sandbox
//!
//! Run untrusted code snippets inside ephemeral, resource-limited containers.
//!
//! An [`Interpreter`] owns one long-lived container started from an
//! allow-listed [`Runtime`] image. Each [`Interpreter::execute`] call stages
//! the code into the container as a uniquely named file, runs it under a
//! wall-clock deadline and returns a structured [`ExecutionResult`]:
//!
//! - **Memory, CPU and process limits**: bound to the container at creation
//!   and enforced by the engine's cgroups, not by the executed code
//! - **Wall-clock timeout**: enforced by killing the container, so code that
//!   ignores signals or forks children cannot outlive its deadline
//! - **OOM detection**: memory kills are reported as
//!   [`ExecutionOutcome::OutOfMemory`], distinct from ordinary failures
//! - **Archive-only file transfer**: code and workspace files are copied in
//!   as tar archives, never bind-mounted, and paths cannot escape their
//!   target directory
//!
//! ## Example
//!
//! ```rust,no_run
//! use container_sandbox_rs::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = SandboxConfig::builder()
//!         .runtime(Runtime::Python311)
//!         .timeout(Duration::from_secs(5))
//!         .max_memory(128 * 1024 * 1024) // 128MB
//!         .build();
//!
//!     let interpreter = Interpreter::new(config).await?;
//!     let result = interpreter.execute("print(1 + 1)", "python").await?;
//!
//!     assert_eq!(result.stdout_lossy().trim(), "2");
//!     assert_eq!(result.outcome, ExecutionOutcome::Normal);
//!
//!     interpreter.dispose().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Outcomes versus errors
//!
//! What the executed code does is never an error: non-zero exits, OOM kills
//! and timeouts are values of [`ExecutionOutcome`]. [`SandboxError`] is
//! reserved for the sandbox machinery (bad configuration, an unreachable
//! engine, a failed upload, a closed session).

pub mod error;
pub mod prelude;
pub mod sandbox;

// Re-export main types at crate root for convenience
pub use error::{Result, SandboxError};
pub use sandbox::catalog::{resolve, LanguageFamily, ResolvedRuntime, Runtime};
pub use sandbox::config::{SandboxConfig, SandboxConfigBuilder};
pub use sandbox::engine::{ContainerEngine, ContainerSpec, ContainerStatus, DockerEngine};
pub use sandbox::executor::{
    ConfirmHook, ExecutionOutcome, ExecutionRequest, ExecutionResult, Interpreter,
};
pub use sandbox::io::ExecOutput;
pub use sandbox::limits::{ResourceLimits, ResourceLimitsBuilder};
pub use sandbox::session::{RunOutput, SandboxSession, SessionState};
pub use sandbox::supervisor::ExecutionSupervisor;
