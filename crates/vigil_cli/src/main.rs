//! Vigil CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Gate blocked / non-compliant / not found

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const GATE_BLOCKED: u8 = 3;
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    let log_result = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(
            EnvFilter::from_default_env()
                .add_directive("vigil=info".parse().expect("static directive"))
                .add_directive("warn".parse().expect("static directive")),
        )
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }

    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Policy(args) => commands::policy::execute(args.clone(), &cli.common).await,
        Commands::Exemption(args) => commands::exemption::execute(args.clone(), &cli.common).await,
        Commands::Gate(args) => commands::gate::execute(args.clone(), &cli.common).await,
        Commands::Evaluate(args) => commands::evaluate::execute(args.clone(), &cli.common).await,
        Commands::Compliance(args) => commands::compliance::execute(args.clone(), &cli.common).await,
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

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    let msg = e.to_string().to_lowercase();

    if msg.contains("blocked") || msg.contains("non_compliant") || msg.contains("pending") {
        ExitCodes::GATE_BLOCKED
    } else if msg.contains("argument") || msg.contains("option") {
        ExitCodes::INVALID_ARGS
    } else {
        ExitCodes::GENERAL_ERROR
    }
}
