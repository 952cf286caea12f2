//! The seam every declared unit implements.

use serde::{Deserialize, Serialize};

use crate::template::{Export, Template};

/// What a unit declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Network,
    Database,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Network => "network",
            UnitKind::Database => "database",
        }
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named piece of infrastructure whose desired state is described, not
/// provisioned, by this program.
pub trait DeclaredUnit {
    /// Deployment-scoped logical identifier, stable across runs.
    fn id(&self) -> &str;

    fn kind(&self) -> UnitKind;

    /// Desired-state document handed to the orchestrator.
    fn template(&self) -> Template;

    /// Values published for consumers outside the unit.
    fn exports(&self) -> Vec<Export>;
}
