//! Local topology checks run before anything is handed to the orchestrator.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{info, warn};

use dbstack_core::RemovalPolicy;

use crate::connections::Peer;
use crate::database::SECRET_ARN_EXPORT;
use crate::topology::Topology;
use crate::unit::DeclaredUnit;

/// Outcome of validating a topology.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub checks: Vec<ValidationCheck>,
    pub warnings: Vec<String>,
    pub passed: bool,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            checks: Vec::new(),
            warnings: Vec::new(),
            passed: true,
        }
    }

    pub fn add_check(&mut self, name: &str, passed: bool, message: impl Into<String>) {
        if !passed {
            self.passed = false;
        }
        self.checks.push(ValidationCheck {
            name: name.to_string(),
            passed,
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn check(&self, name: &str) -> Option<&ValidationCheck> {
        self.checks.iter().find(|c| c.name == name)
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationCheck {
    pub name: String,
    pub passed: bool,
    pub message: String,
}

/// Runs every topology check.
#[derive(Debug, Default)]
pub struct TopologyValidator;

impl TopologyValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, topology: &Topology) -> ValidationReport {
        let mut report = ValidationReport::new();
        info!("Validating environment {}", topology.environment().name);

        self.check_context(topology, &mut report);
        self.check_dependencies(topology, &mut report);
        self.check_access_rules(topology, &mut report);
        self.check_exports(topology, &mut report);
        self.check_teardown(topology, &mut report);

        if !report.passed {
            warn!("Validation failed for {}", topology.environment().name);
        }
        report
    }

    fn check_context(&self, topology: &Topology, report: &mut ValidationReport) {
        let ctx = topology.context();
        report.add_check(
            "context",
            true,
            format!("ns={} ingressCIDR={}", ctx.namespace, ctx.ingress_cidr),
        );
    }

    fn check_dependencies(&self, topology: &Topology, report: &mut ValidationReport) {
        let graph = topology.graph();
        let order = graph.deployment_order();
        let database = topology.database();

        if order.len() != graph.len() {
            report.add_check("dependencies", false, "deployment order does not cover every unit");
            return;
        }
        let wired = graph.dependencies_of(database.id()).contains(&database.network_id());
        if !wired {
            report.add_check(
                "dependencies",
                false,
                format!("{} does not depend on {}", database.id(), database.network_id()),
            );
            return;
        }
        report.add_check("dependencies", true, format!("deploy order: {}", order.join(" -> ")));
    }

    fn check_access_rules(&self, topology: &Topology, report: &mut ValidationReport) {
        let cluster = topology.database().cluster();
        let connections = cluster.connections();
        let port = cluster.port();

        let expected = [
            Peer::SelfReference,
            Peer::ipv4(topology.network().cidr_block()),
            Peer::ipv4(topology.context().ingress_cidr),
        ];
        let base: Vec<Peer> = connections
            .rules()
            .iter()
            .take(expected.len())
            .filter(|r| r.port == port)
            .map(|r| r.peer)
            .collect();

        if base == expected {
            report.add_check(
                "access-rules",
                true,
                format!("{} rules on port {}", connections.rules().len(), port),
            );
        } else {
            let missing: Vec<String> = expected
                .iter()
                .filter(|peer| !base.contains(peer))
                .map(|peer| peer.to_string())
                .collect();
            let detail = if missing.is_empty() {
                "base rules out of order".to_string()
            } else {
                format!("not open to: {}", missing.join(", "))
            };
            report.add_check(
                "access-rules",
                false,
                format!("port {} {}", port, detail),
            );
        }
    }

    fn check_exports(&self, topology: &Topology, report: &mut ValidationReport) {
        let exports = topology.exports();
        let mut seen = BTreeSet::new();
        let duplicates: Vec<&str> = exports
            .iter()
            .filter(|e| !seen.insert(e.name.as_str()))
            .map(|e| e.name.as_str())
            .collect();
        let secret_exports = exports.iter().filter(|e| e.name == SECRET_ARN_EXPORT).count();

        if !duplicates.is_empty() {
            report.add_check("exports", false, format!("duplicate export names: {}", duplicates.join(", ")));
        } else if secret_exports != 1 {
            report.add_check(
                "exports",
                false,
                format!("expected one {} export, found {}", SECRET_ARN_EXPORT, secret_exports),
            );
        } else {
            report.add_check("exports", true, format!("{} exports", exports.len()));
        }
    }

    fn check_teardown(&self, topology: &Topology, report: &mut ValidationReport) {
        let env = topology.environment();
        if env.is_production() && env.removal_policy == RemovalPolicy::Destroy {
            report.add_warning(format!(
                "environment {} destroys the database on teardown",
                env.name
            ));
        }
        report.add_check("teardown", true, format!("removal policy {}", env.removal_policy));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbstack_core::{ContextMap, DeploymentConfig, CONTEXT_NAMESPACE};

    use crate::topology::assemble_environment;

    #[test]
    fn test_demo_passes() {
        let topology = assemble_environment(&DeploymentConfig::demo(), "demo", &ContextMap::new()).unwrap();
        let report = TopologyValidator::new().validate(&topology);

        assert!(report.passed);
        let names: Vec<&str> = report.checks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["context", "dependencies", "access-rules", "exports", "teardown"]);
        assert_eq!(report.check("access-rules").unwrap().message, "3 rules on port 5432");
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_production_destroy_warns() {
        let mut config = DeploymentConfig::demo();
        let mut prod = config.environments["demo"].clone();
        prod.context.insert(CONTEXT_NAMESPACE.into(), "Prod".into());
        config.environments.insert("prod".into(), prod);

        let topology = assemble_environment(&config, "prod", &ContextMap::new()).unwrap();
        let report = TopologyValidator::new().validate(&topology);

        assert!(report.passed);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("prod"));
    }

    #[test]
    fn test_failed_check_fails_report() {
        let mut report = ValidationReport::new();
        report.add_check("a", true, "ok");
        report.add_check("b", false, "broken");
        assert!(!report.passed);
        assert!(!report.check("b").unwrap().passed);
    }
}
