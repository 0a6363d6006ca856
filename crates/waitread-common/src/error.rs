//! Unified error types for the waitread workspace.
//!
//! Every failure the interception loop can meet is one variant of
//! [`WaitreadError`]. The dispatch loop decides what to do with an error by
//! asking [`WaitreadError::is_fatal`]; the CLI turns fatal errors into exit
//! codes with [`WaitreadError::exit_code`].

use nix::errno::Errno;
use thiserror::Error;

use crate::constants::{EXIT_EXEC, EXIT_PROCESS_CREATION, EXIT_TRACE, EXIT_USAGE};

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum WaitreadError {
    /// A tracing primitive (resume, wait, register fetch, detach) was rejected.
    #[error("{operation}: {source}")]
    TraceProtocol {
        /// Name of the failing primitive, e.g. `ptrace(PTRACE_SYSCALL)`.
        operation: &'static str,
        /// Underlying OS error.
        source: Errno,
    },

    /// The tracee exited while it was still being traced.
    #[error("tracee {pid} exited with status {status} while traced")]
    TraceeExited {
        /// Process id of the tracee.
        pid: i32,
        /// Exit status reported by `waitpid`.
        status: i32,
    },

    /// The tracee was killed by a signal while it was still being traced.
    #[error("tracee {pid} killed by {signal} while traced")]
    TraceeSignaled {
        /// Process id of the tracee.
        pid: i32,
        /// Name of the terminating signal.
        signal: String,
    },

    /// `waitpid` reported a state the stop/resume protocol does not expect.
    #[error("tracee {pid} stopped unexpectedly: {status}")]
    UnexpectedStop {
        /// Process id of the tracee.
        pid: i32,
        /// Debug rendering of the wait status.
        status: String,
    },

    /// Cross-process memory reads are not supported by this kernel.
    #[error("process_vm_readv: {source}")]
    RemoteReadUnavailable {
        /// Underlying OS error (always `ENOSYS`).
        source: Errno,
    },

    /// The traced child process could not be created.
    #[error("fork: {source}")]
    ProcessCreation {
        /// Underlying OS error.
        source: Errno,
    },

    /// The traced child could not start the requested command.
    #[error("could not start {command} (child exited with status {status})")]
    Exec {
        /// Program that was passed to `execvp`.
        command: String,
        /// Exit status of the child.
        status: i32,
    },

    /// The command line to trace is empty or not representable.
    #[error("invalid command: {message}")]
    InvalidCommand {
        /// Description of the problem.
        message: String,
    },

    /// Syscall tracing is not available on this platform.
    #[error("unsupported platform: {message}")]
    Unsupported {
        /// Description of the missing facility.
        message: String,
    },
}

impl WaitreadError {
    /// Shorthand for a rejected tracing primitive.
    #[must_use]
    pub const fn trace(operation: &'static str, source: Errno) -> Self {
        Self::TraceProtocol { operation, source }
    }

    /// Whether this error aborts the interception loop.
    ///
    /// Only an unavailable remote memory read is recoverable: it degrades the
    /// current filename lookup to "no match" and the loop continues.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::RemoteReadUnavailable { .. })
    }

    /// Process exit code reported by the CLI for this error.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidCommand { .. } => EXIT_USAGE,
            Self::ProcessCreation { .. } | Self::Unsupported { .. } => EXIT_PROCESS_CREATION,
            Self::Exec { .. } => EXIT_EXEC,
            Self::TraceProtocol { .. }
            | Self::TraceeExited { .. }
            | Self::TraceeSignaled { .. }
            | Self::UnexpectedStop { .. }
            | Self::RemoteReadUnavailable { .. } => EXIT_TRACE,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, WaitreadError>;
