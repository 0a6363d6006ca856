//! Command-line definition and dispatch.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;
use waitread_common::config::WaitreadConfig;
use waitread_common::constants::BIN_NAME;
use waitread_common::error::Result;
use waitread_common::types::SessionReport;
use waitread_core::tracer::TracerSession;
use waitread_runtime::engine::InterceptionEngine;
use waitread_runtime::growth::ThreadSleep;

/// Read a file while another process is still writing it.
///
/// Runs COMMAND under syscall tracing and holds back its reads of FILENAME
/// until the file on disk has grown past what COMMAND has already read.
#[derive(Parser, Debug)]
#[command(name = BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Emit diagnostics as JSON lines.
    #[arg(long)]
    pub json_logs: bool,

    /// File being written by another process.
    pub filename: PathBuf,

    /// Command to run, followed by its arguments.
    #[arg(
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<OsString>,
}

impl Cli {
    /// Session configuration derived from the arguments.
    #[must_use]
    pub fn config(&self) -> WaitreadConfig {
        WaitreadConfig::new(&self.filename)
    }
}

/// Launches the command under tracing and paces its reads of the file.
///
/// # Errors
///
/// Returns an error if the command cannot be started or the tracing
/// protocol fails before interception ends.
pub fn execute(cli: &Cli) -> Result<SessionReport> {
    let config = cli.config();
    let session = TracerSession::launch(&cli.command)?;
    tracing::debug!(pid = session.pid().as_raw(), target = %config.target.display(), "intercepting");
    InterceptionEngine::new(session, &config, ThreadSleep).run()
}
