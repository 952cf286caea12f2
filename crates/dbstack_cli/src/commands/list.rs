//! List command - Show units in deployment or teardown order.

use anyhow::Result;
use clap::Args;

use dbstack_iac::Topology;

use super::EnvironmentArgs;

#[derive(Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub environment: EnvironmentArgs,

    /// Show teardown order instead
    #[arg(long)]
    pub destroy: bool,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: ListArgs) -> Result<()> {
    let topology = args.environment.assemble()?;
    let rows = unit_rows(&topology, args.destroy);

    if args.json {
        let value: Vec<_> = rows
            .iter()
            .map(|(id, kind, deps)| serde_json::json!({ "id": id, "kind": kind, "dependencies": deps }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    for (id, kind, deps) in rows {
        if deps.is_empty() {
            println!("{} ({})", id, kind);
        } else {
            println!("{} ({}) <- {}", id, kind, deps.join(", "));
        }
    }
    Ok(())
}

/// `(id, kind, dependencies)` in the requested order.
fn unit_rows(topology: &Topology, destroy: bool) -> Vec<(String, String, Vec<String>)> {
    let graph = topology.graph();
    let order = if destroy {
        graph.teardown_order()
    } else {
        graph.deployment_order()
    };

    order
        .into_iter()
        .filter_map(|id| {
            let unit = topology.unit(&id)?;
            let deps = graph.dependencies_of(&id).into_iter().map(String::from).collect();
            Some((id.clone(), unit.kind().to_string(), deps))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbstack_core::{ContextMap, DeploymentConfig};
    use dbstack_iac::assemble_environment;

    #[test]
    fn test_rows_follow_order() {
        let topology = assemble_environment(&DeploymentConfig::demo(), "demo", &ContextMap::new()).unwrap();

        let deploy = unit_rows(&topology, false);
        assert_eq!(deploy[0].0, "VpcStackDemo");
        assert_eq!(deploy[0].1, "network");
        assert_eq!(deploy[1].2, vec!["VpcStackDemo"]);

        let teardown = unit_rows(&topology, true);
        assert_eq!(teardown[0].0, "RdsStackDemo");
        assert_eq!(teardown[1].0, "VpcStackDemo");
    }
}
