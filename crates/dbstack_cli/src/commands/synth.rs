//! Synth command - Write templates and manifest for an environment.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use dbstack_iac::Synthesizer;

use super::{CliError, EnvironmentArgs};

#[derive(Args)]
pub struct SynthArgs {
    #[command(flatten)]
    pub environment: EnvironmentArgs,

    /// Output directory
    #[arg(short, long, default_value = "dbstack.out")]
    pub out: PathBuf,
}

pub fn execute(args: SynthArgs) -> Result<()> {
    if args.out.is_file() {
        return Err(CliError::InvalidArgument(format!("{} is a file", args.out.display())).into());
    }

    let topology = args.environment.assemble()?;
    info!("Synthesizing environment {}", topology.environment().name);

    let manifest = Synthesizer::new(&args.out)
        .synthesize(&topology)
        .context("Failed to synthesize templates")?;

    println!("Synthesized {} ({}):", manifest.environment, manifest.region);
    for artifact in &manifest.artifacts {
        println!("  {}", args.out.join(&artifact.template_file).display());
    }
    println!("Deploy order: {}", manifest.deployment_order.join(" -> "));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn synth_args(out: PathBuf, context: Vec<(String, String)>) -> SynthArgs {
        SynthArgs {
            environment: EnvironmentArgs {
                config: None,
                env: "demo".into(),
                context,
            },
            out,
        }
    }

    #[test]
    fn test_synth_writes_output() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        execute(synth_args(out.clone(), vec![("ns".into(), "Cli".into())])).unwrap();

        assert!(out.join("VpcStackCli.template.json").exists());
        assert!(out.join("RdsStackCli.template.json").exists());
        assert!(out.join("manifest.json").exists());
    }

    #[test]
    fn test_synth_rejects_file_output() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        std::fs::write(&out, "").unwrap();

        let err = execute(synth_args(out, Vec::new())).unwrap_err();
        assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::InvalidArgument(_))));
    }
}
