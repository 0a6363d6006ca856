//! # waitread: paced reads of a growing file
//!
//! `waitread <filename> <command> [args...]` runs the command under syscall
//! tracing and stalls its reads of `filename` until a separate writer has
//! appended more data, so the command never sees a premature end of file.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

mod cli;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use waitread_common::constants::EXIT_USAGE;

use crate::cli::Cli;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_tracing(cli.json_logs);

    match cli::execute(&cli) {
        Ok(report) => {
            match serde_json::to_string(&report) {
                Ok(json) => tracing::info!(report = %json, "interception finished"),
                Err(err) => tracing::debug!(%err, "could not serialize session report"),
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}

/// Diagnostics go to stderr; stdout belongs to the traced command.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
