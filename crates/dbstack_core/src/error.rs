//! Error types for the core module.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while loading configuration or building the graph.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CoreError {
    /// Whether this error belongs to the local configuration-error class.
    pub fn is_configuration(&self) -> bool {
        matches!(self, CoreError::Configuration(_) | CoreError::ConfigNotFound(_))
    }
}

/// Local, synchronous configuration failures.
///
/// Every variant aborts assembly before anything is declared.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("missing required context key: {0}")]
    MissingContextKey(String),

    #[error("invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("invalid prefix length: {0} (must be 0-32)")]
    InvalidPrefixLength(u8),

    #[error("invalid namespace '{0}': must start with a letter and contain only letters, digits and '-'")]
    InvalidNamespace(String),

    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error("invalid setting {key}: {message}")]
    InvalidSetting { key: String, message: String },

    #[error("duplicate unit: {0}")]
    DuplicateUnit(String),

    #[error("unknown unit: {0}")]
    UnknownUnit(String),

    #[error("dependency cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("network {network} has no {subnet_type} subnets")]
    SubnetTypeUnavailable { network: String, subnet_type: String },

    #[error("address space of {cidr} exhausted while allocating /{mask} subnets")]
    AddressSpaceExhausted { cidr: String, mask: u8 },

    #[error("access rule from {peer} on port {port} is already declared")]
    DuplicateAccessRule { peer: String, port: u16 },

    #[error("unknown parameter group '{name}' for engine family {family}")]
    UnknownParameterGroup { name: String, family: String },
}

impl ConfigurationError {
    pub fn invalid_setting(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSetting {
            key: key.into(),
            message: message.into(),
        }
    }
}
