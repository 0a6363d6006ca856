//! # waitread-core
//!
//! Low-level Linux tracing primitives for waitread.
//!
//! This crate provides safe abstractions over:
//! - **Tracer session**: `fork`/`PTRACE_TRACEME`/`execvp` launch and the
//!   syscall-entry / syscall-exit stop protocol.
//! - **Syscall decoding**: register snapshots to [`syscall::SyscallFrame`].
//! - **Remote memory**: bounded `process_vm_readv` copies of tracee strings.
//!
//! All unsafe system calls are encapsulated in safe wrappers with
//! proper error handling and `// SAFETY:` documentation.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod memory;
pub mod syscall;
pub mod tracer;
