//! Validate command - Run topology checks for an environment.

use anyhow::Result;
use clap::Args;
use tracing::info;

use dbstack_iac::{TopologyValidator, ValidationReport};

use super::{CliError, EnvironmentArgs};

#[derive(Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub environment: EnvironmentArgs,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: ValidateArgs) -> Result<()> {
    let topology = args.environment.assemble()?;
    info!("Validating environment: {}", topology.environment().name);

    let report = TopologyValidator::new().validate(&topology);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    finish(&report)
}

fn print_report(report: &ValidationReport) {
    for check in &report.checks {
        let mark = if check.passed { "ok" } else { "FAILED" };
        println!("  [{}] {}: {}", mark, check.name, check.message);
    }
    for warning in &report.warnings {
        println!("  [warn] {}", warning);
    }

    println!();
    if report.passed {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Please fix the issues above.");
    }
}

fn finish(report: &ValidationReport) -> Result<()> {
    if report.passed {
        return Ok(());
    }
    let failed = report.checks.iter().filter(|c| !c.passed).count();
    Err(CliError::ValidationFailed { failed }.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_report_is_error() {
        let mut report = ValidationReport::new();
        report.add_check("context", true, "ok");
        assert!(finish(&report).is_ok());

        report.add_check("exports", false, "missing");
        let err = finish(&report).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::ValidationFailed { failed: 1 })
        ));
    }
}
