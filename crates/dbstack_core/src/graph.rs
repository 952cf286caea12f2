//! Dependency graph between declared units.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigurationError;

/// Directed ordering constraint: `from` is deployed after `to`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
}

/// DAG of unit identifiers.
///
/// Edges that would close a cycle are rejected when added, so the graph is
/// acyclic at all times.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    units: BTreeSet<String>,
    edges: BTreeSet<DependencyEdge>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_unit(&mut self, id: impl Into<String>) -> Result<(), ConfigurationError> {
        let id = id.into();
        if !self.units.insert(id.clone()) {
            return Err(ConfigurationError::DuplicateUnit(id));
        }
        Ok(())
    }

    /// Record that `from` depends on `to`. Adding an existing edge is a no-op.
    pub fn add_dependency(&mut self, from: &str, to: &str) -> Result<(), ConfigurationError> {
        for id in [from, to] {
            if !self.units.contains(id) {
                return Err(ConfigurationError::UnknownUnit(id.to_string()));
            }
        }

        if let Some(mut path) = self.path(to, from) {
            path.insert(0, from.to_string());
            return Err(ConfigurationError::DependencyCycle(path));
        }

        debug!("Dependency {} -> {}", from, to);
        self.edges.insert(DependencyEdge {
            from: from.to_string(),
            to: to.to_string(),
        });
        Ok(())
    }

    pub fn units(&self) -> impl Iterator<Item = &str> {
        self.units.iter().map(|s| s.as_str())
    }

    pub fn edges(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.edges.iter()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Direct dependencies of `id`.
    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.from == id)
            .map(|e| e.to.as_str())
            .collect()
    }

    /// Units whose dependencies all come before them. Ties break by id.
    pub fn deployment_order(&self) -> Vec<String> {
        let mut remaining: BTreeMap<&str, usize> = self.units.iter().map(|u| (u.as_str(), 0)).collect();
        for edge in &self.edges {
            if let Some(count) = remaining.get_mut(edge.from.as_str()) {
                *count += 1;
            }
        }

        let mut ready: BTreeSet<&str> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.units.len());

        while let Some(next) = ready.pop_first() {
            order.push(next.to_string());
            for edge in self.edges.iter().filter(|e| e.to == next) {
                if let Some(count) = remaining.get_mut(edge.from.as_str()) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(edge.from.as_str());
                    }
                }
            }
        }

        order
    }

    /// Reverse of the deployment order: dependents are removed first.
    pub fn teardown_order(&self) -> Vec<String> {
        let mut order = self.deployment_order();
        order.reverse();
        order
    }

    /// Path of dependency edges from `start` to `target`, if any.
    fn path(&self, start: &str, target: &str) -> Option<Vec<String>> {
        if start == target {
            return Some(vec![start.to_string()]);
        }

        let mut stack = vec![vec![start.to_string()]];
        let mut seen = BTreeSet::new();

        while let Some(path) = stack.pop() {
            let Some(current) = path.last() else {
                continue;
            };
            if !seen.insert(current.clone()) {
                continue;
            }
            for dep in self.dependencies_of(current) {
                let mut next = path.clone();
                next.push(dep.to_string());
                if dep == target {
                    return Some(next);
                }
                stack.push(next);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_units() -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        graph.add_unit("VpcStackDemo").unwrap();
        graph.add_unit("RdsStackDemo").unwrap();
        graph
    }

    #[test]
    fn test_database_after_network() {
        let mut graph = two_units();
        graph.add_dependency("RdsStackDemo", "VpcStackDemo").unwrap();

        assert_eq!(graph.deployment_order(), vec!["VpcStackDemo", "RdsStackDemo"]);
        assert_eq!(graph.teardown_order(), vec!["RdsStackDemo", "VpcStackDemo"]);
        assert_eq!(graph.dependencies_of("RdsStackDemo"), vec!["VpcStackDemo"]);
        assert_eq!(graph.edges().count(), 1);
    }

    #[test]
    fn test_duplicate_edge_is_noop() {
        let mut graph = two_units();
        graph.add_dependency("RdsStackDemo", "VpcStackDemo").unwrap();
        graph.add_dependency("RdsStackDemo", "VpcStackDemo").unwrap();
        assert_eq!(graph.edges().count(), 1);
    }

    #[test]
    fn test_cycle_rejected() {
        let mut graph = two_units();
        graph.add_dependency("RdsStackDemo", "VpcStackDemo").unwrap();
        let err = graph.add_dependency("VpcStackDemo", "RdsStackDemo").unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::DependencyCycle(vec![
                "VpcStackDemo".into(),
                "RdsStackDemo".into(),
                "VpcStackDemo".into(),
            ])
        );
        assert_eq!(graph.edges().count(), 1);
    }

    #[test]
    fn test_self_edge_rejected() {
        let mut graph = two_units();
        assert!(matches!(
            graph.add_dependency("VpcStackDemo", "VpcStackDemo"),
            Err(ConfigurationError::DependencyCycle(_))
        ));
    }

    #[test]
    fn test_transitive_cycle() {
        let mut graph = two_units();
        graph.add_unit("AppStackDemo").unwrap();
        graph.add_dependency("AppStackDemo", "RdsStackDemo").unwrap();
        graph.add_dependency("RdsStackDemo", "VpcStackDemo").unwrap();
        assert!(graph.add_dependency("VpcStackDemo", "AppStackDemo").is_err());
        assert_eq!(
            graph.deployment_order(),
            vec!["VpcStackDemo", "RdsStackDemo", "AppStackDemo"]
        );
    }

    #[test]
    fn test_unknown_and_duplicate_units() {
        let mut graph = two_units();
        assert_eq!(
            graph.add_unit("VpcStackDemo").unwrap_err(),
            ConfigurationError::DuplicateUnit("VpcStackDemo".into())
        );
        assert_eq!(
            graph.add_dependency("RdsStackDemo", "Missing").unwrap_err(),
            ConfigurationError::UnknownUnit("Missing".into())
        );
    }

    #[test]
    fn test_independent_units_sorted_by_id() {
        let graph = two_units();
        assert_eq!(graph.deployment_order(), vec!["RdsStackDemo", "VpcStackDemo"]);
    }
}
