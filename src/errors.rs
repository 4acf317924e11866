// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("Task '{task}' has unknown dependency '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Invalid run configuration: {0}")]
    InvalidRunConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DagError {
    /// Whether this error belongs to the configuration class (fatal to the
    /// scheduler instance; nothing can run until it is fixed).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DagError::ConfigError(_)
                | DagError::DuplicateTask(_)
                | DagError::UnknownDependency { .. }
                | DagError::DagCycle(_)
                | DagError::TomlError(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DagError>;
