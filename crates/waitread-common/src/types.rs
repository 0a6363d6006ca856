//! Domain primitive types used across the waitread workspace.

use std::fmt;
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Lifecycle state of the interception engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineState {
    /// No `openat` of the target path has succeeded yet.
    NoFileTracked,
    /// A descriptor of the target path is being paced.
    Consuming,
    /// Interception is over; the tracee runs unmonitored.
    Ended,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFileTracked => write!(f, "no-file-tracked"),
            Self::Consuming => write!(f, "consuming"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

/// Why interception ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The file did not grow across the recheck and the backoff recheck.
    StalledGrowth,
    /// The tracee closed the tracked descriptor.
    Closed,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StalledGrowth => write!(f, "stalled growth"),
            Self::Closed => write!(f, "descriptor closed"),
        }
    }
}

/// The one file whose reads are paced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    target: PathBuf,
    descriptor: Option<RawFd>,
    consumed: u64,
}

impl TrackedFile {
    /// Creates a tracker for `target` with no descriptor adopted yet.
    #[must_use]
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            descriptor: None,
            consumed: 0,
        }
    }

    /// Path being watched.
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Whether `name` (raw bytes read from the tracee) is exactly the target path.
    #[must_use]
    pub fn matches_path(&self, name: &[u8]) -> bool {
        self.target.as_os_str().as_bytes() == name
    }

    /// Currently paced descriptor, if any.
    #[must_use]
    pub const fn descriptor(&self) -> Option<RawFd> {
        self.descriptor
    }

    /// Whether `fd` is the paced descriptor.
    #[must_use]
    pub fn is_tracked(&self, fd: Option<RawFd>) -> bool {
        fd.is_some() && fd == self.descriptor
    }

    /// Bytes returned by executed reads on the current descriptor.
    #[must_use]
    pub const fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Starts pacing `fd`, replacing any previous descriptor.
    ///
    /// Returns the descriptor that was replaced.
    pub const fn adopt(&mut self, fd: RawFd) -> Option<RawFd> {
        let previous = self.descriptor;
        self.descriptor = Some(fd);
        self.consumed = 0;
        previous
    }

    /// Accounts for the return value of an executed read.
    ///
    /// Errors and end-of-file (`ret <= 0`) leave the count untouched.
    pub fn record_read(&mut self, ret: i64) {
        if let Ok(bytes) = u64::try_from(ret) {
            self.consumed = self.consumed.saturating_add(bytes);
        }
    }
}

/// Summary of a finished interception session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    /// Path that was watched.
    pub target: PathBuf,
    /// Descriptor being paced when interception ended.
    pub descriptor: Option<RawFd>,
    /// Bytes consumed on that descriptor.
    pub bytes_consumed: u64,
    /// Why interception ended.
    pub end: EndReason,
}

impl SessionReport {
    /// Builds the report for a tracker at the moment interception ends.
    #[must_use]
    pub fn from_tracked(tracked: &TrackedFile, end: EndReason) -> Self {
        Self {
            target: tracked.target().to_path_buf(),
            descriptor: tracked.descriptor(),
            bytes_consumed: tracked.consumed(),
            end,
        }
    }
}
