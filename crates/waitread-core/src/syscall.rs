//! Syscall identification and argument decoding.

use std::os::fd::RawFd;

/// Syscalls the interception engine distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Syscall {
    /// `openat(dirfd, pathname, flags, mode)`.
    OpenAt,
    /// `read(fd, buf, count)`.
    Read,
    /// `close(fd)`.
    Close,
    /// Anything else, by number.
    Other(i64),
}

impl Syscall {
    /// Maps a raw syscall number for the host architecture.
    #[must_use]
    pub const fn from_number(number: i64) -> Self {
        match number {
            libc::SYS_openat => Self::OpenAt,
            libc::SYS_read => Self::Read,
            libc::SYS_close => Self::Close,
            other => Self::Other(other),
        }
    }

    /// Raw syscall number.
    #[must_use]
    pub const fn number(self) -> i64 {
        match self {
            Self::OpenAt => libc::SYS_openat,
            Self::Read => libc::SYS_read,
            Self::Close => libc::SYS_close,
            Self::Other(n) => n,
        }
    }
}

/// Syscall number and the first two arguments, captured at a syscall-entry stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallFrame {
    number: i64,
    args: [u64; 2],
}

impl SyscallFrame {
    /// Builds a frame from a syscall number and its first two arguments.
    #[must_use]
    pub const fn new(number: i64, args: [u64; 2]) -> Self {
        Self { number, args }
    }

    /// Frame for `openat(AT_FDCWD, path_address, ..)`.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub const fn openat(path_address: u64) -> Self {
        Self::new(libc::SYS_openat, [libc::AT_FDCWD as u64, path_address])
    }

    /// Frame for `read(fd, ..)`.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub const fn read(fd: RawFd) -> Self {
        Self::new(libc::SYS_read, [fd as u64, 0])
    }

    /// Frame for `close(fd)`.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub const fn close(fd: RawFd) -> Self {
        Self::new(libc::SYS_close, [fd as u64, 0])
    }

    /// Decodes the x86-64 register snapshot taken at a syscall-entry stop.
    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn from_regs(regs: &libc::user_regs_struct) -> Self {
        Self::new(regs.orig_rax as i64, [regs.rdi, regs.rsi])
    }

    /// Raw syscall number.
    #[must_use]
    pub const fn number(&self) -> i64 {
        self.number
    }

    /// Decoded syscall.
    #[must_use]
    pub const fn syscall(&self) -> Syscall {
        Syscall::from_number(self.number)
    }

    /// Argument `n` (0 or 1); later arguments are not captured.
    #[must_use]
    pub fn argument(&self, n: usize) -> Option<u64> {
        self.args.get(n).copied()
    }

    /// First argument read as a file descriptor.
    ///
    /// Values that do not fit a non-negative `RawFd` cannot name an open file.
    #[must_use]
    pub fn descriptor(&self) -> Option<RawFd> {
        RawFd::try_from(self.args[0]).ok()
    }

    /// Second argument, the `pathname` pointer of `openat`.
    #[must_use]
    pub const fn path_address(&self) -> u64 {
        self.args[1]
    }
}
