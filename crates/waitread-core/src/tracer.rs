//! The ptrace stop/resume protocol.
//!
//! A [`TracerSession`] owns one traced child. The child requests tracing
//! with `PTRACE_TRACEME` before it execs the target command, so every
//! syscall it makes can be inspected at its entry stop, run to its exit
//! stop, or released entirely with `PTRACE_DETACH`.

use std::ffi::{CString, OsString};
use std::os::unix::ffi::OsStrExt;

use nix::errno::Errno;
use nix::unistd::Pid;
use waitread_common::error::{Result, WaitreadError};

use crate::syscall::SyscallFrame;

/// A process stopped at syscall boundaries.
///
/// [`TracerSession`] is the production implementation; the interception
/// engine only depends on this trait.
pub trait Tracee {
    /// Resumes the tracee until the next syscall-entry stop and decodes it.
    ///
    /// # Errors
    ///
    /// Returns a fatal error if a tracing primitive fails or the tracee is gone.
    fn advance_to_syscall_stop(&mut self) -> Result<SyscallFrame>;

    /// Runs the pending syscall to its exit stop and returns its raw result.
    ///
    /// Failed syscalls return a negated errno.
    ///
    /// # Errors
    ///
    /// Returns a fatal error if a tracing primitive fails or the tracee is gone.
    fn execute_current_syscall(&mut self) -> Result<i64>;

    /// Copies tracee memory at `address` into `buf`, returning the bytes copied.
    ///
    /// # Errors
    ///
    /// Returns the OS error of the cross-process read.
    fn read_memory(&self, address: u64, buf: &mut [u8]) -> std::result::Result<usize, Errno>;

    /// Stops intercepting and lets the tracee run to its natural exit.
    ///
    /// Calling it again after a successful detach does nothing.
    ///
    /// # Errors
    ///
    /// Returns a fatal error if the tracee cannot be released.
    fn detach_and_run_to_completion(&mut self) -> Result<()>;
}

/// Converts a command line into `execvp` arguments.
///
/// # Errors
///
/// Returns [`WaitreadError::InvalidCommand`] if the command is empty or an
/// argument contains a NUL byte.
pub fn command_to_argv(command: &[OsString]) -> Result<Vec<CString>> {
    if command.is_empty() {
        return Err(WaitreadError::InvalidCommand {
            message: "no command to run".into(),
        });
    }
    command
        .iter()
        .map(|arg| {
            CString::new(arg.as_bytes()).map_err(|_| WaitreadError::InvalidCommand {
                message: format!("argument contains a NUL byte: {}", arg.to_string_lossy()),
            })
        })
        .collect()
}

/// Handle to a child process traced from its first instruction.
#[derive(Debug)]
pub struct TracerSession {
    pid: Pid,
    frame: Option<SyscallFrame>,
    detached: bool,
}

impl TracerSession {
    /// Process id of the tracee.
    #[must_use]
    pub const fn pid(&self) -> Pid {
        self.pid
    }

    /// Frame captured at the most recent syscall-entry stop.
    #[must_use]
    pub const fn frame(&self) -> Option<&SyscallFrame> {
        self.frame.as_ref()
    }

    /// Whether tracing has been released.
    #[must_use]
    pub const fn is_detached(&self) -> bool {
        self.detached
    }
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
mod linux {
    use std::ffi::{CString, OsString};
    use std::io::IoSliceMut;

    use nix::errno::Errno;
    use nix::sys::ptrace::{self, Options};
    use nix::sys::signal::Signal;
    use nix::sys::uio::{RemoteIoVec, process_vm_readv};
    use nix::sys::wait::{WaitStatus, waitpid};
    use nix::unistd::{ForkResult, Pid, execvp, fork};
    use waitread_common::constants::{APP_NAME, EXIT_EXEC};
    use waitread_common::error::{Result, WaitreadError};

    use super::{Tracee, TracerSession, command_to_argv};
    use crate::memory::page_spans;
    use crate::syscall::SyscallFrame;

    impl TracerSession {
        /// Forks a child that requests tracing and execs `command`.
        ///
        /// Returns once the child is stopped right after its exec, with
        /// syscall stops distinguishable from signal stops.
        ///
        /// # Errors
        ///
        /// Returns [`WaitreadError::ProcessCreation`] if `fork` fails,
        /// [`WaitreadError::Exec`] if the child exits before its first stop
        /// (the command could not be started), or a trace error if the first
        /// stop cannot be configured.
        pub fn launch(command: &[OsString]) -> Result<Self> {
            let argv = command_to_argv(command)?;
            let program = command[0].to_string_lossy().into_owned();

            // SAFETY: the child only calls ptrace(2), execvp(3), writes one
            // diagnostic line and exits; it never returns into the caller.
            match unsafe { fork() } {
                Err(source) => Err(WaitreadError::ProcessCreation { source }),
                Ok(ForkResult::Child) => exec_traced(&argv),
                Ok(ForkResult::Parent { child }) => Self::await_exec_stop(child, program),
            }
        }

        fn await_exec_stop(child: Pid, program: String) -> Result<Self> {
            match waitpid(child, None) {
                Ok(WaitStatus::Stopped(_, Signal::SIGTRAP)) => {}
                Ok(WaitStatus::Exited(_, status)) => {
                    return Err(WaitreadError::Exec {
                        command: program,
                        status,
                    });
                }
                Ok(WaitStatus::Signaled(pid, signal, _)) => {
                    return Err(WaitreadError::TraceeSignaled {
                        pid: pid.as_raw(),
                        signal: signal.as_str().to_owned(),
                    });
                }
                Ok(other) => {
                    return Err(WaitreadError::UnexpectedStop {
                        pid: child.as_raw(),
                        status: format!("{other:?}"),
                    });
                }
                Err(source) => return Err(WaitreadError::trace("waitpid", source)),
            }

            ptrace::setoptions(
                child,
                Options::PTRACE_O_TRACESYSGOOD | Options::PTRACE_O_TRACEEXEC,
            )
            .map_err(|e| WaitreadError::trace("ptrace(PTRACE_SETOPTIONS)", e))?;

            tracing::info!(pid = child.as_raw(), command = %program, "tracee started");
            Ok(Self {
                pid: child,
                frame: None,
                detached: false,
            })
        }

        fn resume(&self, signal: Option<Signal>) -> Result<()> {
            ptrace::syscall(self.pid, signal)
                .map_err(|e| WaitreadError::trace("ptrace(PTRACE_SYSCALL)", e))
        }

        /// Waits for the next syscall stop, stepping over exec events and
        /// re-injecting signals the tracee received meanwhile.
        fn wait_for_syscall_stop(&self) -> Result<()> {
            loop {
                match waitpid(self.pid, None) {
                    Ok(WaitStatus::PtraceSyscall(_)) => return Ok(()),
                    Ok(WaitStatus::PtraceEvent(_, _, event)) => {
                        tracing::trace!(event, "stepping over ptrace event");
                        self.resume(None)?;
                    }
                    Ok(WaitStatus::Stopped(_, signal)) => {
                        tracing::debug!(signal = signal.as_str(), "forwarding signal to tracee");
                        self.resume(Some(signal))?;
                    }
                    Ok(WaitStatus::Exited(pid, status)) => {
                        return Err(WaitreadError::TraceeExited {
                            pid: pid.as_raw(),
                            status,
                        });
                    }
                    Ok(WaitStatus::Signaled(pid, signal, _)) => {
                        return Err(WaitreadError::TraceeSignaled {
                            pid: pid.as_raw(),
                            signal: signal.as_str().to_owned(),
                        });
                    }
                    Ok(other) => {
                        return Err(WaitreadError::UnexpectedStop {
                            pid: self.pid.as_raw(),
                            status: format!("{other:?}"),
                        });
                    }
                    Err(source) => return Err(WaitreadError::trace("waitpid", source)),
                }
            }
        }

        fn registers(&self) -> Result<libc::user_regs_struct> {
            ptrace::getregs(self.pid).map_err(|e| WaitreadError::trace("ptrace(PTRACE_GETREGS)", e))
        }
    }

    impl Tracee for TracerSession {
        fn advance_to_syscall_stop(&mut self) -> Result<SyscallFrame> {
            self.resume(None)?;
            self.wait_for_syscall_stop()?;
            let frame = SyscallFrame::from_regs(&self.registers()?);
            self.frame = Some(frame);
            Ok(frame)
        }

        #[allow(clippy::cast_possible_wrap)]
        fn execute_current_syscall(&mut self) -> Result<i64> {
            self.resume(None)?;
            self.wait_for_syscall_stop()?;
            Ok(self.registers()?.rax as i64)
        }

        fn read_memory(&self, address: u64, buf: &mut [u8]) -> std::result::Result<usize, Errno> {
            let base = usize::try_from(address).map_err(|_| Errno::EFAULT)?;
            let remote: Vec<RemoteIoVec> = page_spans(base, buf.len())
                .into_iter()
                .map(|(base, len)| RemoteIoVec { base, len })
                .collect();
            let mut local = [IoSliceMut::new(buf)];
            process_vm_readv(self.pid, &mut local, &remote)
        }

        fn detach_and_run_to_completion(&mut self) -> Result<()> {
            if self.detached {
                return Ok(());
            }
            ptrace::detach(self.pid, None)
                .map_err(|e| WaitreadError::trace("ptrace(PTRACE_DETACH)", e))?;
            self.detached = true;
            tracing::info!(pid = self.pid.as_raw(), "detached, tracee runs unmonitored");

            match waitpid(self.pid, None) {
                Ok(WaitStatus::Exited(_, status)) => tracing::info!(status, "tracee exited"),
                Ok(WaitStatus::Signaled(_, signal, _)) => {
                    tracing::info!(signal = signal.as_str(), "tracee killed by signal");
                }
                Ok(other) => tracing::debug!(status = ?other, "tracee reaped"),
                Err(err) => tracing::warn!(%err, "could not reap detached tracee"),
            }
            Ok(())
        }
    }

    #[allow(clippy::print_stderr)]
    fn exec_traced(argv: &[CString]) -> ! {
        if let Err(err) = ptrace::traceme() {
            eprintln!("{APP_NAME}: ptrace(PTRACE_TRACEME): {err}");
            std::process::exit(i32::from(EXIT_EXEC));
        }
        let Err(err) = execvp(&argv[0], argv);
        eprintln!("{APP_NAME}: execvp: {err}");
        std::process::exit(i32::from(EXIT_EXEC));
    }
}

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
impl TracerSession {
    /// Stub for platforms without x86-64 ptrace support.
    ///
    /// # Errors
    ///
    /// Always returns an error: syscall interception requires Linux on x86-64.
    pub fn launch(_command: &[OsString]) -> Result<Self> {
        Err(unsupported())
    }
}

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
impl Tracee for TracerSession {
    fn advance_to_syscall_stop(&mut self) -> Result<SyscallFrame> {
        Err(unsupported())
    }

    fn execute_current_syscall(&mut self) -> Result<i64> {
        Err(unsupported())
    }

    fn read_memory(&self, _address: u64, _buf: &mut [u8]) -> std::result::Result<usize, Errno> {
        Err(Errno::ENOSYS)
    }

    fn detach_and_run_to_completion(&mut self) -> Result<()> {
        self.detached = true;
        Ok(())
    }
}

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
fn unsupported() -> WaitreadError {
    WaitreadError::Unsupported {
        message: "syscall interception requires Linux on x86-64".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argv_keeps_every_argument() {
        let command: Vec<OsString> = ["cat", "-n", "/tmp/f"].iter().map(OsString::from).collect();
        let argv = command_to_argv(&command).expect("argv");
        assert_eq!(argv.len(), 3);
        assert_eq!(argv[1].to_bytes(), b"-n");
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = command_to_argv(&[]).unwrap_err();
        assert!(matches!(err, WaitreadError::InvalidCommand { .. }));
        assert_eq!(err.exit_code(), 1);
    }
}
