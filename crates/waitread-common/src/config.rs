//! Session configuration model.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for one interception session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitreadConfig {
    /// Path whose reads are paced, compared byte for byte with `openat` arguments.
    pub target: PathBuf,
    /// Wait applied once before giving up on a file that has stopped growing.
    pub backoff: Duration,
}

impl WaitreadConfig {
    /// Creates a configuration for `target` with the default backoff.
    #[must_use]
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            backoff: crate::constants::DEFAULT_BACKOFF,
        }
    }

    /// Replaces the backoff interval.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}
