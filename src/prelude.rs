//! Prelude module for convenient imports.

pub use crate::error::{Result, SandboxError};
pub use crate::sandbox::{
    catalog::{LanguageFamily, Runtime},
    config::SandboxConfig,
    executor::{ExecutionOutcome, ExecutionResult, Interpreter},
    limits::ResourceLimits,
};
