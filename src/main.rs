//! schemadrift - snapshot-based migration generator
//!
//! Compares the schema exported by the ORM tooling with the last recorded
//! snapshot and writes a reversible migration for the differences.
//!
//! Exit status: 0 on success or when nothing changed, 1 when `--check`
//! finds changes, 2 on any error.

mod cli;

use crate::cli::Cli;
use clap::Parser;
use schemadrift::pipeline::RunOutcome;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();

    let result = cli::execute(&cli);
    match &result {
        Ok(outcome) => report(outcome),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
        }
    }
    ExitCode::from(cli::exit_status(&result))
}

fn report(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::NoChanges => println!("No changes detected in your mapping information."),
        RunOutcome::ChangesDetected => eprintln!("Changes detected in your mapping information!"),
        RunOutcome::Generated { migration_path, .. } => println!(
            "Generated new migration class to \"{}\" from schema differences.",
            migration_path.display()
        ),
    }
}

/// Initialize tracing subscriber; logs go to stderr so stdout stays scriptable
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,schemadrift=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true)
                .compact(),
        )
        .init();
}
