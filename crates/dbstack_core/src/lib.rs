//! # dbstack_core
//!
//! Deployment context, configuration and dependency graph for dbstack.
//!
//! Everything here is resolved once per invocation, before any unit of
//! infrastructure is declared:
//!
//! - **Config**: YAML file with one entry per named environment
//! - **Context**: validated `ns` / `ingressCIDR` values
//! - **Graph**: ordering constraints between declared units
//!
//! # Example
//!
//! ```rust
//! use dbstack_core::{ContextMap, DeploymentConfig};
//!
//! let config = DeploymentConfig::demo();
//! let env = config.resolve("demo", &ContextMap::new()).unwrap();
//! assert_eq!(env.context.namespace.as_str(), "Demo");
//! ```

pub mod cidr;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;

pub use cidr::Ipv4Cidr;
pub use config::{
    DeploymentConfig, EnvironmentConfig, RemovalPolicy, ResolvedEnvironment, DEFAULT_CONFIG_FILE,
    DEFAULT_ENVIRONMENT, DEFAULT_REGION,
};
pub use context::{
    parse_context_pair, ContextMap, DeploymentContext, Namespace, CONTEXT_INGRESS_CIDR,
    CONTEXT_NAMESPACE, REQUIRED_CONTEXT_KEYS,
};
pub use error::{ConfigurationError, CoreError, CoreResult};
pub use graph::{DependencyEdge, DependencyGraph};
