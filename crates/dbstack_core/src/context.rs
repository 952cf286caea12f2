//! Deployment context resolved before any unit is constructed.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cidr::Ipv4Cidr;
use crate::error::ConfigurationError;

/// Context key holding the namespace used in unit identifiers.
pub const CONTEXT_NAMESPACE: &str = "ns";

/// Context key holding the external range allowed to reach the database port.
pub const CONTEXT_INGRESS_CIDR: &str = "ingressCIDR";

/// Keys that must be present before assembly runs.
pub const REQUIRED_CONTEXT_KEYS: &[&str] = &[CONTEXT_NAMESPACE, CONTEXT_INGRESS_CIDR];

const NAMESPACE_PATTERN: &str = r"^[A-Za-z][A-Za-z0-9-]*$";

/// Raw string-to-string context as read from config files and CLI flags.
pub type ContextMap = BTreeMap<String, String>;

/// Namespace label used to derive deployment-scoped identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

impl Namespace {
    pub fn new(value: impl Into<String>) -> Result<Self, ConfigurationError> {
        let value = value.into();
        let pattern = Regex::new(NAMESPACE_PATTERN)
            .map_err(|e| ConfigurationError::invalid_setting(CONTEXT_NAMESPACE, e.to_string()))?;

        if !pattern.is_match(&value) {
            return Err(ConfigurationError::InvalidNamespace(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deployment-scoped identifier, e.g. `VpcStack` + `Demo` = `VpcStackDemo`.
    pub fn scoped(&self, base: &str) -> String {
        format!("{}{}", base, self.0)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Namespace {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Namespace> for String {
    fn from(value: Namespace) -> Self {
        value.0
    }
}

/// Validated deployment context.
///
/// Built once per invocation from a [`ContextMap`]; every required key is
/// checked here so unit construction never looks anything up by string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentContext {
    pub namespace: Namespace,
    pub ingress_cidr: Ipv4Cidr,
}

impl DeploymentContext {
    pub fn new(namespace: Namespace, ingress_cidr: Ipv4Cidr) -> Self {
        Self {
            namespace,
            ingress_cidr,
        }
    }

    /// Resolve and validate the required keys.
    pub fn resolve(map: &ContextMap) -> Result<Self, ConfigurationError> {
        for key in REQUIRED_CONTEXT_KEYS {
            if !map.contains_key(*key) {
                return Err(ConfigurationError::MissingContextKey(key.to_string()));
            }
        }

        let namespace = Namespace::new(require(map, CONTEXT_NAMESPACE)?)?;
        let ingress_cidr = Ipv4Cidr::new(require(map, CONTEXT_INGRESS_CIDR)?)?;

        debug!(
            "Resolved deployment context ns={} ingressCIDR={}",
            namespace, ingress_cidr
        );

        Ok(Self {
            namespace,
            ingress_cidr,
        })
    }

    /// Render back into the raw key/value form.
    pub fn to_map(&self) -> ContextMap {
        let mut map = ContextMap::new();
        map.insert(CONTEXT_NAMESPACE.to_string(), self.namespace.to_string());
        map.insert(CONTEXT_INGRESS_CIDR.to_string(), self.ingress_cidr.to_string());
        map
    }
}

fn require<'a>(map: &'a ContextMap, key: &str) -> Result<&'a str, ConfigurationError> {
    map.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigurationError::MissingContextKey(key.to_string()))
}

/// Parse a `key=value` pair as given on the command line.
pub fn parse_context_pair(pair: &str) -> Result<(String, String), ConfigurationError> {
    match pair.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(ConfigurationError::invalid_setting(
            "context",
            format!("expected key=value, got '{}'", pair),
        )),
    }
}
