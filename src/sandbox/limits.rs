//! Resource limits applied to the sandbox container.
//!
//! Memory, CPU and process-count ceilings are handed to the container engine
//! at creation time and enforced by its cgroups, not by the sandboxed code.
//! The wall-clock timeout is enforced by the execution supervisor.

use std::time::Duration;

use crate::error::{Result, SandboxError};

/// Smallest memory ceiling the engine accepts for a container.
pub const MIN_MEMORY_BYTES: u64 = 6 * 1024 * 1024;

/// Smallest CPU share the engine accepts. Anything below rounds to a
/// nano-CPU count the engine either rejects or reads as unlimited.
pub const MIN_CPU_SHARE: f64 = 0.01;

/// Exit code reported for a process killed by SIGKILL, which is how the
/// engine's OOM killer terminates a process over its memory ceiling.
pub const OOM_EXIT_CODE: i64 = 137;

/// Resource ceilings for one sandbox session. Immutable once a session
/// has been created from them.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceLimits {
    /// Memory ceiling in bytes (swap is capped at the same value).
    pub memory_bytes: u64,
    /// CPU share in cores, e.g. `0.5` for half a core.
    pub cpu_share: f64,
    /// Maximum number of processes inside the container.
    pub max_processes: u32,
    /// Wall-clock timeout for a single execution.
    pub timeout: Duration,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_bytes: 256 * 1024 * 1024, // 256MB
            cpu_share: 1.0,
            max_processes: 64,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ResourceLimits {
    /// Create a new builder for ResourceLimits.
    pub fn builder() -> ResourceLimitsBuilder {
        ResourceLimitsBuilder::default()
    }

    /// Check the limits before any engine call is made.
    pub fn validate(&self) -> Result<()> {
        if !self.cpu_share.is_finite() || self.cpu_share <= 0.0 {
            return Err(SandboxError::InvalidLimits(format!(
                "cpu share must be a positive number, got {}",
                self.cpu_share
            )));
        }
        if self.cpu_share < MIN_CPU_SHARE {
            return Err(SandboxError::InvalidLimits(format!(
                "cpu share must be at least {}, got {}",
                MIN_CPU_SHARE, self.cpu_share
            )));
        }
        if self.memory_bytes < MIN_MEMORY_BYTES {
            return Err(SandboxError::InvalidLimits(format!(
                "memory ceiling must be at least {} bytes, got {}",
                MIN_MEMORY_BYTES, self.memory_bytes
            )));
        }
        if self.max_processes == 0 {
            return Err(SandboxError::InvalidLimits(
                "max processes must be greater than zero".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(SandboxError::InvalidLimits(
                "timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// CPU share expressed in the engine's nano-CPU unit.
    pub fn nano_cpus(&self) -> i64 {
        (self.cpu_share * 1_000_000_000.0).round() as i64
    }

    /// Memory ceiling as the engine's signed byte count.
    pub fn memory_i64(&self) -> i64 {
        i64::try_from(self.memory_bytes).unwrap_or(i64::MAX)
    }
}

/// Builder for ResourceLimits. Omitted fields fall back to the defaults.
#[derive(Debug, Clone, Default)]
pub struct ResourceLimitsBuilder {
    memory_bytes: Option<u64>,
    cpu_share: Option<f64>,
    max_processes: Option<u32>,
    timeout: Option<Duration>,
}

impl ResourceLimitsBuilder {
    /// Set the memory ceiling in bytes.
    pub fn memory_bytes(mut self, bytes: u64) -> Self {
        self.memory_bytes = Some(bytes);
        self
    }

    /// Set the CPU share in cores.
    pub fn cpu_share(mut self, share: f64) -> Self {
        self.cpu_share = Some(share);
        self
    }

    /// Set the maximum process count.
    pub fn max_processes(mut self, count: u32) -> Self {
        self.max_processes = Some(count);
        self
    }

    /// Set the wall-clock timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the wall-clock timeout in whole seconds.
    pub fn timeout_secs(self, secs: u64) -> Self {
        self.timeout(Duration::from_secs(secs))
    }

    /// Build the ResourceLimits. Validation happens when a session starts.
    pub fn build(self) -> ResourceLimits {
        let default = ResourceLimits::default();
        ResourceLimits {
            memory_bytes: self.memory_bytes.unwrap_or(default.memory_bytes),
            cpu_share: self.cpu_share.unwrap_or(default.cpu_share),
            max_processes: self.max_processes.unwrap_or(default.max_processes),
            timeout: self.timeout.unwrap_or(default.timeout),
        }
    }
}
