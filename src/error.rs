//! Error types for the container sandbox.
//!
//! Only failures of the sandbox machinery are errors. What the executed code
//! does (non-zero exit, OOM kill, running past its deadline) is reported as
//! an [`ExecutionOutcome`](crate::ExecutionOutcome) on the result instead.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while building, driving or tearing down a sandbox.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// The runtime identifier is not part of the closed runtime catalog.
    #[error("unsupported runtime: {0}")]
    UnsupportedRuntime(String),

    /// Resource limits failed validation.
    #[error("invalid resource limits: {0}")]
    InvalidLimits(String),

    /// Any other configuration problem detected before a container exists.
    #[error("configuration error: {0}")]
    Config(String),

    /// The container engine could not be reached.
    #[error("container engine unavailable")]
    EngineUnavailable(#[source] anyhow::Error),

    /// The runtime image was missing locally and could not be pulled.
    #[error("failed to pull image {image}")]
    ImagePull {
        /// The image reference that was being pulled.
        image: String,
        #[source]
        source: anyhow::Error,
    },

    /// The sandbox container could not be created or started.
    #[error("failed to create sandbox container")]
    ContainerCreate(#[source] anyhow::Error),

    /// The sandbox container disappeared between two executions.
    #[error("sandbox container {0} is gone")]
    ContainerLost(String),

    /// Injecting files into the sandbox filesystem failed.
    #[error("upload failed: {0}")]
    Upload(String, #[source] anyhow::Error),

    /// The host workspace directory does not exist or is not a directory.
    #[error("workspace directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// A staged path is absolute or tries to escape the target directory.
    #[error("unsafe path rejected: {0}")]
    UnsafePath(String),

    /// The requested language is not served by the session's runtime.
    #[error("language {language:?} is not supported by runtime {runtime}")]
    UnsupportedLanguage {
        /// The language name supplied by the caller.
        language: String,
        /// The runtime identifier of the session.
        runtime: String,
    },

    /// The confirmation hook declined the execution.
    #[error("execution aborted by confirmation hook")]
    ExecutionAborted,

    /// The interpreter has been disposed.
    #[error("sandbox session is closed")]
    SessionClosed,

    /// The exec call inside the container failed at the engine level.
    #[error("failed to run command in sandbox")]
    ExecFailed(#[source] anyhow::Error),

    /// Removing the sandbox container failed.
    #[error("failed to tear down sandbox container")]
    Teardown(#[source] anyhow::Error),

    /// I/O error on the host side (reading workspace files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Check if this error was raised by input validation, before any
    /// container existed.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SandboxError::UnsupportedRuntime(_)
                | SandboxError::InvalidLimits(_)
                | SandboxError::Config(_)
        )
    }

    /// Check if this is an infrastructure failure a caller may retry with
    /// backoff. Nothing is retried internally.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SandboxError::EngineUnavailable(_) | SandboxError::ImagePull { .. }
        )
    }

    /// Check if this error comes from staging files into the sandbox.
    pub fn is_upload_error(&self) -> bool {
        matches!(
            self,
            SandboxError::Upload(..)
                | SandboxError::DirectoryNotFound(_)
                | SandboxError::UnsafePath(_)
        )
    }

    /// Check if the interpreter was already disposed.
    pub fn is_session_closed(&self) -> bool {
        matches!(self, SandboxError::SessionClosed)
    }
}

/// Result type alias for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;
