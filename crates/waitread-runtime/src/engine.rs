//! The interception state machine.
//!
//! [`InterceptionEngine`] drives a [`Tracee`] from one syscall-entry stop to
//! the next and decides, per syscall, whether it runs now, runs after the
//! file has grown, or whether interception ends:
//!
//! - `openat` of the target path adopts the returned descriptor
//!   (last match wins).
//! - `read` on that descriptor is paced by the [`FileGrowthOracle`].
//! - `close` on that descriptor ends interception.
//! - everything else runs unmodified.

use std::os::fd::RawFd;

use waitread_common::config::WaitreadConfig;
use waitread_common::error::Result;
use waitread_common::types::{EndReason, EngineState, SessionReport, TrackedFile};
use waitread_core::memory::RemoteMemoryReader;
use waitread_core::syscall::{Syscall, SyscallFrame};
use waitread_core::tracer::Tracee;

use crate::growth::{Backoff, FileGrowthOracle, Verdict};

enum Flow {
    Continue,
    End(EndReason),
}

/// Paces one traced process's reads of one file.
#[derive(Debug)]
pub struct InterceptionEngine<T, B> {
    tracee: T,
    reader: RemoteMemoryReader,
    oracle: FileGrowthOracle<B>,
    tracked: TrackedFile,
    state: EngineState,
}

impl<T: Tracee, B: Backoff> InterceptionEngine<T, B> {
    /// Creates an engine for `tracee` watching `config.target`.
    pub fn new(tracee: T, config: &WaitreadConfig, backoff: B) -> Self {
        Self {
            tracee,
            reader: RemoteMemoryReader::new(),
            oracle: FileGrowthOracle::new(&config.target, config.backoff, backoff),
            tracked: TrackedFile::new(&config.target),
            state: EngineState::NoFileTracked,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> EngineState {
        self.state
    }

    /// Tracked descriptor and consumption.
    #[must_use]
    pub const fn tracked(&self) -> &TrackedFile {
        &self.tracked
    }

    /// The traced process.
    #[must_use]
    pub const fn tracee(&self) -> &T {
        &self.tracee
    }

    /// Consumes the engine, returning the traced process.
    pub fn into_tracee(self) -> T {
        self.tracee
    }

    /// Runs the interception loop until interception ends.
    ///
    /// On success the tracee has been detached and has run to completion.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error of the tracing protocol, including the
    /// tracee exiting while it is still traced.
    pub fn run(&mut self) -> Result<SessionReport> {
        loop {
            let frame = self.tracee.advance_to_syscall_stop()?;
            if let Flow::End(reason) = self.dispatch(&frame)? {
                tracing::info!(
                    path = %self.oracle.path().display(),
                    state = %self.state,
                    fd = self.tracked.descriptor(),
                    consumed = self.tracked.consumed(),
                    %reason,
                    "ending interception"
                );
                self.tracee.detach_and_run_to_completion()?;
                self.state = EngineState::Ended;
                return Ok(SessionReport::from_tracked(&self.tracked, reason));
            }
        }
    }

    fn dispatch(&mut self, frame: &SyscallFrame) -> Result<Flow> {
        match frame.syscall() {
            Syscall::OpenAt => self.on_openat(frame),
            Syscall::Read => self.on_read(frame),
            Syscall::Close => self.on_close(frame),
            Syscall::Other(_) => self.pass_through(),
        }
    }

    fn pass_through(&mut self) -> Result<Flow> {
        let _ = self.tracee.execute_current_syscall()?;
        Ok(Flow::Continue)
    }

    fn on_openat(&mut self, frame: &SyscallFrame) -> Result<Flow> {
        let matched = match self.reader.read_c_string(&self.tracee, frame.path_address()) {
            Ok(name) => self.tracked.matches_path(name),
            Err(err) if err.is_fatal() => return Err(err),
            Err(_) => false,
        };
        let ret = self.tracee.execute_current_syscall()?;
        if !matched {
            return Ok(Flow::Continue);
        }

        match RawFd::try_from(ret) {
            Ok(fd) if fd >= 0 => {
                let previous = self.tracked.adopt(fd);
                self.state = EngineState::Consuming;
                tracing::info!(fd, ?previous, path = %self.tracked.target().display(), "tracking descriptor");
            }
            _ => tracing::debug!(ret, "open of target failed"),
        }
        Ok(Flow::Continue)
    }

    fn on_read(&mut self, frame: &SyscallFrame) -> Result<Flow> {
        if !self.tracked.is_tracked(frame.descriptor()) {
            return self.pass_through();
        }
        match self.oracle.check(self.tracked.consumed()) {
            Verdict::Exhausted => Ok(Flow::End(EndReason::StalledGrowth)),
            Verdict::Proceed => {
                let ret = self.tracee.execute_current_syscall()?;
                self.tracked.record_read(ret);
                tracing::debug!(ret, consumed = self.tracked.consumed(), "paced read");
                Ok(Flow::Continue)
            }
        }
    }

    fn on_close(&mut self, frame: &SyscallFrame) -> Result<Flow> {
        if self.tracked.is_tracked(frame.descriptor()) {
            Ok(Flow::End(EndReason::Closed))
        } else {
            self.pass_through()
        }
    }
}
