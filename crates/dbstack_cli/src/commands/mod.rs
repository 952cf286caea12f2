//! CLI command definitions.
//!
//! Every subcommand assembles the topology of one environment, then acts on
//! it: synthesize templates, list units, or validate.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use thiserror::Error;
use tracing::{debug, warn};

use dbstack_core::{parse_context_pair, ContextMap, CoreError, DeploymentConfig, DEFAULT_CONFIG_FILE, DEFAULT_ENVIRONMENT};
use dbstack_iac::{assemble_environment, Topology};

pub mod list;
pub mod synth;
pub mod validate;

/// dbstack - declarative network and database stacks
#[derive(Parser)]
#[command(name = "dbstack")]
#[command(version, about = "dbstack - declarative network and database stacks")]
#[command(long_about = r#"
dbstack declares a two-tier network and an Aurora database cluster for a
named environment and synthesizes the templates an orchestrator deploys.

COMMANDS:
  synth     → Write templates and manifest for an environment
  list      → Show units in deployment or teardown order
  validate  → Run topology checks without writing anything

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Configuration error
  5 - IaC error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synthesize templates for an environment
    Synth(synth::SynthArgs),

    /// List units in deployment order
    List(list::ListArgs),

    /// Validate an environment's topology
    Validate(validate::ValidateArgs),
}

/// Errors raised by the CLI itself.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Validation failed: {failed} check(s) did not pass")]
    ValidationFailed { failed: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Options selecting and configuring the environment.
#[derive(Args, Debug, Clone)]
pub struct EnvironmentArgs {
    /// Configuration file
    #[arg(long, env = "DBSTACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Environment to assemble
    #[arg(short, long, env = "DBSTACK_ENV", default_value = DEFAULT_ENVIRONMENT)]
    pub env: String,

    /// Context override, e.g. --context ns=Staging
    #[arg(short = 'c', long = "context", value_name = "KEY=VALUE", value_parser = parse_context_arg)]
    pub context: Vec<(String, String)>,
}

impl EnvironmentArgs {
    pub fn overrides(&self) -> ContextMap {
        self.context.iter().cloned().collect()
    }

    /// Load the configuration and assemble the selected environment.
    pub fn assemble(&self) -> Result<Topology> {
        let config = load_config(self.config.as_deref())?;
        assemble_environment(&config, &self.env, &self.overrides())
            .with_context(|| format!("Failed to assemble environment '{}'", self.env))
    }
}

fn parse_context_arg(s: &str) -> Result<(String, String), String> {
    parse_context_pair(s).map_err(|e| e.to_string())
}

/// Read `path`, or `dbstack.yaml` when none is given.
///
/// Without an explicit path a missing default file falls back to the
/// built-in demo environment.
pub fn load_config(path: Option<&Path>) -> Result<DeploymentConfig> {
    match path {
        Some(path) => DeploymentConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => match DeploymentConfig::from_file(Path::new(DEFAULT_CONFIG_FILE)) {
            Ok(config) => Ok(config),
            Err(CoreError::ConfigNotFound(_)) => {
                warn!("{} not found, using built-in demo environment", DEFAULT_CONFIG_FILE);
                Ok(DeploymentConfig::demo())
            }
            Err(e) => {
                debug!("Configuration error: {:?}", e);
                Err(e).context("Failed to load dbstack.yaml")
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_explicit_missing_config_fails() {
        let dir = tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("nope.yaml"))).unwrap_err();
        assert!(matches!(err.downcast_ref::<CoreError>(), Some(CoreError::ConfigNotFound(_))));
    }

    #[test]
    fn test_assemble_with_overrides() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dbstack.yaml");
        fs::write(
            &path,
            "environments:\n  staging:\n    context:\n      ns: Staging\n      ingressCIDR: 198.51.100.0/24\n",
        )
        .unwrap();

        let args = EnvironmentArgs {
            config: Some(path),
            env: "staging".into(),
            context: vec![("ns".into(), "Blue".into())],
        };
        let topology = args.assemble().unwrap();
        assert_eq!(topology.unit_ids(), vec!["RdsStackBlue", "VpcStackBlue"]);
    }

    #[test]
    fn test_parse_context_arg() {
        assert_eq!(parse_context_arg("ns=Demo").unwrap(), ("ns".to_string(), "Demo".to_string()));
        assert!(parse_context_arg("nsDemo").is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "dbstack", "synth", "--env", "demo", "--context", "ns=Blue", "-c", "ingressCIDR=10.1.0.0/16",
        ])
        .unwrap();
        match cli.command {
            Commands::Synth(args) => {
                assert_eq!(args.environment.env, "demo");
                assert_eq!(args.environment.context.len(), 2);
            }
            _ => panic!("expected synth"),
        }
    }
}
