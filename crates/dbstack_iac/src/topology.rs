//! Entry assembly: network unit, database unit, and the edge between them.

use tracing::info;

use dbstack_core::{ContextMap, DependencyGraph, DeploymentConfig, DeploymentContext, ResolvedEnvironment};

use crate::database::{DatabaseProps, DatabaseUnit};
use crate::error::IacResult;
use crate::network::{NetworkProps, NetworkUnit};
use crate::template::Export;
use crate::unit::DeclaredUnit;

/// Base of the network unit identifier (`VpcStack<ns>`).
pub const NETWORK_UNIT_BASE: &str = "VpcStack";

/// Base of the database unit identifier (`RdsStack<ns>`).
pub const DATABASE_UNIT_BASE: &str = "RdsStack";

/// Complete, immutable description of one deployment.
#[derive(Debug, Clone)]
pub struct Topology {
    environment: ResolvedEnvironment,
    network: NetworkUnit,
    database: DatabaseUnit,
    graph: DependencyGraph,
}

impl Topology {
    pub fn environment(&self) -> &ResolvedEnvironment {
        &self.environment
    }

    pub fn context(&self) -> &DeploymentContext {
        &self.environment.context
    }

    pub fn network(&self) -> &NetworkUnit {
        &self.network
    }

    pub fn database(&self) -> &DatabaseUnit {
        &self.database
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Identifiers of every declared unit, sorted.
    pub fn unit_ids(&self) -> Vec<&str> {
        self.graph.units().collect()
    }

    pub fn unit(&self, id: &str) -> Option<&dyn DeclaredUnit> {
        if self.network.id() == id {
            Some(&self.network as &dyn DeclaredUnit)
        } else if self.database.id() == id {
            Some(&self.database as &dyn DeclaredUnit)
        } else {
            None
        }
    }

    /// Units with dependencies first.
    pub fn units_in_deployment_order(&self) -> Vec<&dyn DeclaredUnit> {
        self.graph
            .deployment_order()
            .iter()
            .filter_map(|id| self.unit(id))
            .collect()
    }

    /// Every export published by the topology.
    pub fn exports(&self) -> Vec<Export> {
        self.units_in_deployment_order()
            .into_iter()
            .flat_map(|u| u.exports())
            .collect()
    }
}

/// Assemble the topology for a resolved environment.
///
/// Identical input yields identical identifiers and templates.
pub fn assemble(environment: &ResolvedEnvironment) -> IacResult<Topology> {
    let ctx = &environment.context;
    info!(
        "Assembling environment {} (ns={}, region={})",
        environment.name, ctx.namespace, environment.region
    );

    let network_id = ctx.namespace.scoped(NETWORK_UNIT_BASE);
    let database_id = ctx.namespace.scoped(DATABASE_UNIT_BASE);

    let network = NetworkUnit::new(network_id.as_str(), &environment.region, NetworkProps::default())?;

    let props = DatabaseProps::new(ctx.ingress_cidr)
        .with_instances(environment.instances)
        .with_removal_policy(environment.removal_policy);
    let database = DatabaseUnit::new(database_id.as_str(), &network.handle(), props)?;

    let mut graph = DependencyGraph::new();
    graph.add_unit(network_id.as_str())?;
    graph.add_unit(database_id.as_str())?;
    graph.add_dependency(&database_id, &network_id)?;

    Ok(Topology {
        environment: environment.clone(),
        network,
        database,
        graph,
    })
}

/// Resolve `env_name` from `config` (with context overrides) and assemble it.
pub fn assemble_environment(
    config: &DeploymentConfig,
    env_name: &str,
    overrides: &ContextMap,
) -> IacResult<Topology> {
    let environment = config.resolve(env_name, overrides)?;
    assemble(&environment)
}
