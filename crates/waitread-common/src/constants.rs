//! System-wide constants.

use std::time::Duration;

/// Application name used in diagnostics.
pub const APP_NAME: &str = "waitread";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "waitread";

/// Fixed wait before re-checking a file that has not grown.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(10);

/// Capacity of the local buffer that receives a remote path, terminator included.
pub const REMOTE_BUFFER_CAPACITY: usize = 1024;

/// Granularity at which remote reads are split.
pub const PAGE_SIZE: usize = 4096;

/// Exit code for missing or malformed arguments.
pub const EXIT_USAGE: u8 = 1;

/// Exit code when the traced child cannot be created.
pub const EXIT_PROCESS_CREATION: u8 = 2;

/// Exit code when the target command cannot be started in the traced child.
pub const EXIT_EXEC: u8 = 3;

/// Exit code when the interception loop fails.
pub const EXIT_TRACE: u8 = 4;
