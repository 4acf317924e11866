// src/exec/mod.rs

//! Execution layer.
//!
//! - [`runner`] runs a single task body with retry and timeout handling and
//!   turns whatever happens into a [`crate::types::TaskOutput`].
//! - [`shell`] runs commands through the platform shell using
//!   `tokio::process::Command`.

pub mod runner;
pub mod shell;

pub use runner::run_task;
pub use shell::run_shell;
