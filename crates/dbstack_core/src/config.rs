//! Deployment configuration file.
//!
//! Each named environment carries its own context values, so one entry point
//! serves every deployment:
//!
//! ```yaml
//! region: ap-northeast-2
//! environments:
//!   demo:
//!     context:
//!       ns: Demo
//!       ingressCIDR: 39.115.51.138/32
//!     removal_policy: destroy
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::context::{ContextMap, DeploymentContext, CONTEXT_INGRESS_CIDR, CONTEXT_NAMESPACE};
use crate::error::{ConfigurationError, CoreError, CoreResult};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "dbstack.yaml";

/// Default environment name.
pub const DEFAULT_ENVIRONMENT: &str = "demo";

/// Default region.
pub const DEFAULT_REGION: &str = "ap-northeast-2";

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

/// What happens to a unit's storage when the unit is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    /// Delete the resource and its data.
    #[default]
    Destroy,
    /// Keep the resource after the unit is removed.
    Retain,
    /// Take a final snapshot, then delete.
    Snapshot,
}

impl RemovalPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemovalPolicy::Destroy => "destroy",
            RemovalPolicy::Retain => "retain",
            RemovalPolicy::Snapshot => "snapshot",
        }
    }

    /// CloudFormation `DeletionPolicy` value.
    pub fn deletion_policy(&self) -> &'static str {
        match self {
            RemovalPolicy::Destroy => "Delete",
            RemovalPolicy::Retain => "Retain",
            RemovalPolicy::Snapshot => "Snapshot",
        }
    }
}

impl std::fmt::Display for RemovalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-environment settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Context key/values (`ns`, `ingressCIDR`).
    #[serde(default)]
    pub context: ContextMap,
    /// Region override for this environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Database teardown policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removal_policy: Option<RemovalPolicy>,
    /// Number of database instances in the cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<u32>,
}

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            account: None,
            environments: BTreeMap::new(),
        }
    }
}

/// An environment with its context validated and defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEnvironment {
    pub name: String,
    pub region: String,
    pub account: Option<String>,
    pub context: DeploymentContext,
    pub removal_policy: RemovalPolicy,
    pub instances: u32,
}

impl ResolvedEnvironment {
    /// Environments named like production.
    pub fn is_production(&self) -> bool {
        matches!(self.name.to_lowercase().as_str(), "prod" | "production")
    }
}

impl DeploymentConfig {
    /// Built-in configuration with the single `demo` environment.
    pub fn demo() -> Self {
        let mut context = ContextMap::new();
        context.insert(CONTEXT_NAMESPACE.to_string(), "Demo".to_string());
        context.insert(CONTEXT_INGRESS_CIDR.to_string(), "39.115.51.138/32".to_string());

        let mut environments = BTreeMap::new();
        environments.insert(
            DEFAULT_ENVIRONMENT.to_string(),
            EnvironmentConfig {
                context,
                region: None,
                removal_policy: Some(RemovalPolicy::Destroy),
                instances: Some(1),
            },
        );

        Self {
            region: default_region(),
            account: None,
            environments,
        }
    }

    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound(path.to_path_buf()));
        }
        info!("Loading configuration from {:?}", path);
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> CoreResult<Self> {
        let config: DeploymentConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_file(&self, path: &Path) -> CoreResult<()> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn environment_names(&self) -> Vec<&str> {
        self.environments.keys().map(|k| k.as_str()).collect()
    }

    pub fn environment(&self, name: &str) -> Result<&EnvironmentConfig, ConfigurationError> {
        self.environments
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownEnvironment(name.to_string()))
    }

    /// Resolve an environment, layering `overrides` on top of its context.
    pub fn resolve(&self, name: &str, overrides: &ContextMap) -> Result<ResolvedEnvironment, ConfigurationError> {
        let env = self.environment(name)?;

        let mut context = env.context.clone();
        for (key, value) in overrides {
            debug!("Context override {}={}", key, value);
            context.insert(key.clone(), value.clone());
        }

        let region = env.region.clone().unwrap_or_else(|| self.region.clone());
        if region.trim().is_empty() {
            return Err(ConfigurationError::invalid_setting("region", "must not be empty"));
        }

        let instances = env.instances.unwrap_or(1);
        if instances == 0 {
            return Err(ConfigurationError::invalid_setting("instances", "must be at least 1"));
        }

        Ok(ResolvedEnvironment {
            name: name.to_string(),
            region,
            account: self.account.clone(),
            context: DeploymentContext::resolve(&context)?,
            removal_policy: env.removal_policy.unwrap_or_default(),
            instances,
        })
    }
}
