//! dbstack CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Configuration error
//! - 5: IaC error

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dbstack_core::{ConfigurationError, CoreError};
use dbstack_iac::IacError;

mod commands;

use commands::{Cli, CliError, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const CONFIGURATION_ERROR: u8 = 3;
    pub const IAC_ERROR: u8 = 5;
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Synth(args) => commands::synth::execute(args),
        Commands::List(args) => commands::list::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "dbstack=debug"
    } else if quiet {
        "dbstack=warn"
    } else {
        "dbstack=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("warn,{}", default_level)));

    // Ignore the error if logging was already initialized.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

/// Map an error to its exit code by the first typed error in the chain.
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(err) = cause.downcast_ref::<IacError>() {
            return if err.is_configuration() {
                ExitCodes::CONFIGURATION_ERROR
            } else {
                ExitCodes::IAC_ERROR
            };
        }
        if let Some(err) = cause.downcast_ref::<CoreError>() {
            return if err.is_configuration() {
                ExitCodes::CONFIGURATION_ERROR
            } else {
                ExitCodes::GENERAL_ERROR
            };
        }
        if cause.downcast_ref::<ConfigurationError>().is_some() {
            return ExitCodes::CONFIGURATION_ERROR;
        }
        if let Some(err) = cause.downcast_ref::<CliError>() {
            return match err {
                CliError::ValidationFailed { .. } => ExitCodes::CONFIGURATION_ERROR,
                CliError::InvalidArgument(_) => ExitCodes::INVALID_ARGS,
            };
        }
    }
    ExitCodes::GENERAL_ERROR
}
