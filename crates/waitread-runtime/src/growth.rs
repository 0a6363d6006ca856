//! File growth checks with a single fixed backoff.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Blocking wait used between the two size checks.
///
/// The tracee stays parked at its syscall-entry stop for the whole wait.
pub trait Backoff {
    /// Blocks the calling thread for `interval`.
    fn wait(&mut self, interval: Duration);
}

/// Production backoff: sleeps the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleep;

impl Backoff for ThreadSleep {
    fn wait(&mut self, interval: Duration) {
        std::thread::sleep(interval);
    }
}

impl<F: FnMut(Duration)> Backoff for F {
    fn wait(&mut self, interval: Duration) {
        self(interval);
    }
}

/// Outcome of a growth check for a pending read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Unread data exists; the read may run now.
    Proceed,
    /// The file stopped growing; interception should end.
    Exhausted,
}

/// Decides whether a pending read on the watched file may run.
#[derive(Debug)]
pub struct FileGrowthOracle<B> {
    path: PathBuf,
    observed_size: u64,
    interval: Duration,
    backoff: B,
}

impl<B: Backoff> FileGrowthOracle<B> {
    /// Creates an oracle for `path` that waits `interval` before its last check.
    pub fn new(path: impl Into<PathBuf>, interval: Duration, backoff: B) -> Self {
        Self {
            path: path.into(),
            observed_size: 0,
            interval,
            backoff,
        }
    }

    /// Watched path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size seen by the most recent stat.
    #[must_use]
    pub const fn observed_size(&self) -> u64 {
        self.observed_size
    }

    /// Checks whether the file holds more than `consumed` bytes.
    ///
    /// A cached size already past `consumed` answers without touching the
    /// filesystem. Otherwise the file is stat'ed, and if it has not grown the
    /// backoff runs once before a final stat.
    pub fn check(&mut self, consumed: u64) -> Verdict {
        if self.observed_size > consumed {
            tracing::trace!(size = self.observed_size, consumed, "cached size ahead of reader");
            return Verdict::Proceed;
        }
        if self.refresh() > consumed {
            tracing::debug!(size = self.observed_size, consumed, "file grew");
            return Verdict::Proceed;
        }

        tracing::warn!(
            path = %self.path.display(),
            consumed,
            wait_secs = self.interval.as_secs_f64(),
            "no new data, waiting before recheck"
        );
        self.backoff.wait(self.interval);

        if self.refresh() > consumed {
            tracing::debug!(size = self.observed_size, consumed, "file grew during backoff");
            Verdict::Proceed
        } else {
            tracing::info!(size = self.observed_size, consumed, "file stopped growing");
            Verdict::Exhausted
        }
    }

    /// Stats the file; an unreadable file counts as empty.
    fn refresh(&mut self) -> u64 {
        self.observed_size = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "stat failed, assuming no data");
                0
            }
        };
        self.observed_size
    }
}
