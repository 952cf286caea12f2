//! Error types for IaC module.

use std::path::PathBuf;

use dbstack_core::{ConfigurationError, CoreError};
use thiserror::Error;

/// Result type alias for IaC operations.
pub type IacResult<T> = Result<T, IacError>;

/// Errors that can occur while declaring or synthesizing units.
#[derive(Error, Debug)]
pub enum IacError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Synthesis failed: {0}")]
    SynthFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl IacError {
    /// Whether this error belongs to the local configuration-error class.
    pub fn is_configuration(&self) -> bool {
        matches!(self, IacError::Configuration(_) | IacError::ConfigNotFound(_))
    }
}

impl From<CoreError> for IacError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Configuration(e) => IacError::Configuration(e),
            CoreError::ConfigNotFound(p) => IacError::ConfigNotFound(p),
            CoreError::Io(e) => IacError::Io(e),
            CoreError::Yaml(e) => IacError::Yaml(e),
        }
    }
}
