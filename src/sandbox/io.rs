//! Output capture for commands run inside the sandbox.
//!
//! The buffers are shared between the task streaming an exec's output and
//! the supervisor, so whatever was produced before a timeout kill is still
//! readable afterwards.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A shared buffer that one exec stream appends to.
#[derive(Clone, Debug, Default)]
pub struct CapturedOutput {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CapturedOutput {
    /// Create a new captured output buffer.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a chunk of output.
    pub fn extend(&self, data: &[u8]) {
        self.lock().extend_from_slice(data);
    }

    /// Get the captured output as bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.lock().clone()
    }
}

/// The two output streams of one exec.
#[derive(Clone, Debug, Default)]
pub struct ExecOutput {
    /// Captured stdout.
    pub stdout: CapturedOutput,
    /// Captured stderr.
    pub stderr: CapturedOutput,
}

impl ExecOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot both streams.
    pub fn snapshot(&self) -> (Vec<u8>, Vec<u8>) {
        (self.stdout.to_bytes(), self.stderr.to_bytes())
    }
}
