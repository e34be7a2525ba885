//! Sandbox module containing all execution-related components.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod executor;
pub mod io;
pub mod limits;
pub mod session;
pub mod staging;
pub mod supervisor;
