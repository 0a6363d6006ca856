//! Bounded reads of tracee memory.
//!
//! Filenames passed to `openat` live in the tracee's address space. They are
//! copied into a fixed local buffer with `process_vm_readv(2)`; names longer
//! than the buffer are truncated, so comparisons only ever see a prefix.

use nix::errno::Errno;
use waitread_common::constants::{PAGE_SIZE, REMOTE_BUFFER_CAPACITY};
use waitread_common::error::{Result, WaitreadError};

use crate::tracer::Tracee;

/// Splits `[address, address + len)` into spans that never cross a page.
///
/// `process_vm_readv` transfers whole iovec elements, so one span per page
/// keeps the readable prefix of a string that runs into an unmapped page.
#[must_use]
pub fn page_spans(address: usize, len: usize) -> Vec<(usize, usize)> {
    let end = address.saturating_add(len);
    let mut spans = Vec::new();
    let mut cursor = address;
    while cursor < end {
        let next_page = (cursor | (PAGE_SIZE - 1)).saturating_add(1);
        let stop = next_page.min(end);
        spans.push((cursor, stop - cursor));
        cursor = stop;
    }
    spans
}

/// Copies NUL-terminated strings out of a tracee into a fixed buffer.
#[derive(Debug)]
pub struct RemoteMemoryReader {
    buffer: [u8; REMOTE_BUFFER_CAPACITY],
    unavailable_reported: bool,
}

impl Default for RemoteMemoryReader {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteMemoryReader {
    /// Creates a reader with an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: [0; REMOTE_BUFFER_CAPACITY],
            unavailable_reported: false,
        }
    }

    /// Whether the "no cross-process reads" diagnostic has been emitted.
    #[must_use]
    pub const fn unavailable_reported(&self) -> bool {
        self.unavailable_reported
    }

    /// Reads the string at `address` in the tracee.
    ///
    /// At most `REMOTE_BUFFER_CAPACITY - 1` bytes are copied and the last slot
    /// is always a terminator. The returned slice stops at the first NUL.
    /// Faults on the remote side are not failures: whatever was copied before
    /// the fault is returned, possibly nothing.
    ///
    /// # Errors
    ///
    /// Returns [`WaitreadError::RemoteReadUnavailable`] when the kernel has no
    /// `process_vm_readv`. The error is logged on first occurrence only and is
    /// never fatal.
    pub fn read_c_string<T: Tracee + ?Sized>(&mut self, tracee: &T, address: u64) -> Result<&[u8]> {
        self.buffer.fill(0);
        let limit = REMOTE_BUFFER_CAPACITY - 1;
        match tracee.read_memory(address, &mut self.buffer[..limit]) {
            Ok(copied) => tracing::trace!(address, copied, "remote string read"),
            Err(Errno::ENOSYS) => {
                if !self.unavailable_reported {
                    self.unavailable_reported = true;
                    tracing::warn!("process_vm_readv unavailable; opened paths cannot be matched");
                }
                return Err(WaitreadError::RemoteReadUnavailable {
                    source: Errno::ENOSYS,
                });
            }
            Err(errno) => tracing::debug!(address, %errno, "remote string read faulted"),
        }
        self.buffer[limit] = 0;
        let end = self.buffer.iter().position(|&b| b == 0).unwrap_or(limit);
        Ok(&self.buffer[..end])
    }
}
