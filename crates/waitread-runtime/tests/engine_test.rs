//! Interception engine scenarios against a scripted tracee.
//!
//! The scripted tracee replays a fixed sequence of syscall-entry stops and
//! records which syscalls the engine let run, so pacing decisions can be
//! checked without tracing a real process. The watched file is a real file
//! in a temporary directory.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::errno::Errno;
use waitread_common::config::WaitreadConfig;
use waitread_common::error::{Result, WaitreadError};
use waitread_common::types::{EndReason, EngineState};
use waitread_core::syscall::{Syscall, SyscallFrame};
use waitread_core::tracer::Tracee;
use waitread_runtime::engine::InterceptionEngine;

const TARGET_ADDR: u64 = 0x7000_1000;
const OTHER_ADDR: u64 = 0x7000_2000;
const ENOENT: i64 = -2;

#[derive(Debug, Clone, Copy)]
struct Step {
    frame: SyscallFrame,
    result: i64,
}

#[derive(Debug, Default)]
struct ScriptedTracee {
    steps: VecDeque<Step>,
    current: Option<Step>,
    memory: HashMap<u64, Vec<u8>>,
    memory_unavailable: bool,
    executed: Vec<(SyscallFrame, i64)>,
    detaches: usize,
}

impl ScriptedTracee {
    fn new(target: &Path) -> Self {
        let mut memory = HashMap::new();
        let mut name = target.as_os_str().as_bytes().to_vec();
        name.push(0);
        let _ = memory.insert(TARGET_ADDR, name);
        let _ = memory.insert(OTHER_ADDR, b"/tmp/other.txt\0".to_vec());
        Self {
            memory,
            ..Self::default()
        }
    }

    fn step(mut self, frame: SyscallFrame, result: i64) -> Self {
        self.steps.push_back(Step { frame, result });
        self
    }

    fn open_target(self, result: i64) -> Self {
        self.step(SyscallFrame::openat(TARGET_ADDR), result)
    }

    fn open_other(self, result: i64) -> Self {
        self.step(SyscallFrame::openat(OTHER_ADDR), result)
    }

    fn read(self, fd: RawFd, result: i64) -> Self {
        self.step(SyscallFrame::read(fd), result)
    }

    fn close(self, fd: RawFd) -> Self {
        self.step(SyscallFrame::close(fd), 0)
    }

    fn executed_reads(&self, fd: RawFd) -> Vec<i64> {
        self.executed
            .iter()
            .filter(|(frame, _)| frame.syscall() == Syscall::Read && frame.descriptor() == Some(fd))
            .map(|(_, ret)| *ret)
            .collect()
    }

    fn executed_close(&self, fd: RawFd) -> bool {
        self.executed
            .iter()
            .any(|(frame, _)| frame.syscall() == Syscall::Close && frame.descriptor() == Some(fd))
    }
}

impl Tracee for ScriptedTracee {
    fn advance_to_syscall_stop(&mut self) -> Result<SyscallFrame> {
        let step = self
            .steps
            .pop_front()
            .ok_or(WaitreadError::TraceeExited { pid: 42, status: 0 })?;
        self.current = Some(step);
        Ok(step.frame)
    }

    fn execute_current_syscall(&mut self) -> Result<i64> {
        let step = self.current.take().ok_or_else(|| WaitreadError::UnexpectedStop {
            pid: 42,
            status: "no pending syscall".into(),
        })?;
        self.executed.push((step.frame, step.result));
        Ok(step.result)
    }

    fn read_memory(&self, address: u64, buf: &mut [u8]) -> std::result::Result<usize, Errno> {
        if self.memory_unavailable {
            return Err(Errno::ENOSYS);
        }
        let bytes = self.memory.get(&address).ok_or(Errno::EFAULT)?;
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        Ok(n)
    }

    fn detach_and_run_to_completion(&mut self) -> Result<()> {
        self.detaches += 1;
        self.current = None;
        Ok(())
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    path: PathBuf,
}

impl Fixture {
    fn with_size(len: usize) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("growing.log");
        std::fs::write(&path, vec![b'a'; len]).expect("write");
        Self { _dir: dir, path }
    }

    fn config(&self) -> WaitreadConfig {
        WaitreadConfig::new(&self.path)
    }

    fn append(path: &Path, len: usize) {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(path)
            .expect("reopen");
        file.write_all(&vec![b'b'; len]).expect("append");
    }
}

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn scenario_a_reads_below_file_size_run_immediately() {
    let fixture = Fixture::with_size(100);
    let tracee = ScriptedTracee::new(&fixture.path)
        .open_target(3)
        .read(3, 50)
        .read(3, 50)
        .close(3);
    let waits = Cell::new(0);
    let mut engine = InterceptionEngine::new(tracee, &fixture.config(), |_: Duration| {
        waits.set(waits.get() + 1);
    });

    let report = engine.run().expect("run");

    assert_eq!(waits.get(), 0);
    assert_eq!(report.bytes_consumed, 100);
    assert_eq!(report.end, EndReason::Closed);
    assert_eq!(engine.tracee().executed_reads(3), vec![50, 50]);
}

#[test]
fn scenario_b_stalled_file_ends_interception_after_backoff() {
    let fixture = Fixture::with_size(100);
    let tracee = ScriptedTracee::new(&fixture.path)
        .open_target(3)
        .read(3, 50)
        .read(3, 50)
        .read(3, 10);
    let waited = Cell::new(Vec::new());
    let mut engine = InterceptionEngine::new(tracee, &fixture.config(), |d: Duration| {
        let mut seen = waited.take();
        seen.push(d);
        waited.set(seen);
    });

    let report = engine.run().expect("run");

    assert_eq!(report.end, EndReason::StalledGrowth);
    assert_eq!(report.bytes_consumed, 100);
    assert_eq!(report.descriptor, Some(3));
    assert_eq!(engine.state(), EngineState::Ended);
    assert_eq!(waited.take(), vec![Duration::from_secs(10)]);

    let tracee = engine.into_tracee();
    assert_eq!(tracee.detaches, 1);
    assert_eq!(tracee.executed_reads(3), vec![50, 50], "third read is never executed by the engine");
}

#[test]
fn scenario_c_growth_during_backoff_lets_read_run() {
    let fixture = Fixture::with_size(100);
    let tracee = ScriptedTracee::new(&fixture.path)
        .open_target(3)
        .read(3, 50)
        .read(3, 50)
        .read(3, 50)
        .close(3);
    let path = fixture.path.clone();
    let waits = Cell::new(0);
    let mut engine = InterceptionEngine::new(tracee, &fixture.config(), |_: Duration| {
        waits.set(waits.get() + 1);
        Fixture::append(&path, 50);
    });

    let report = engine.run().expect("run");

    assert_eq!(waits.get(), 1);
    assert_eq!(report.end, EndReason::Closed);
    assert!(report.bytes_consumed >= 150);
    assert_eq!(engine.tracee().executed_reads(3), vec![50, 50, 50]);
}

#[test]
fn scenario_d_only_target_descriptor_is_paced() {
    let fixture = Fixture::with_size(10);
    let tracee = ScriptedTracee::new(&fixture.path)
        .open_other(3)
        .open_target(4)
        .read(3, 4096)
        .read(3, 4096)
        .read(3, 4096)
        .read(4, 10)
        .close(3)
        .close(4);
    let waits = Cell::new(0);
    let mut engine = InterceptionEngine::new(tracee, &fixture.config(), |_: Duration| {
        waits.set(waits.get() + 1);
    });

    let report = engine.run().expect("run");

    assert_eq!(waits.get(), 0);
    assert_eq!(report.descriptor, Some(4));
    assert_eq!(report.bytes_consumed, 10);
    let tracee = engine.tracee();
    assert_eq!(tracee.executed_reads(3), vec![4096, 4096, 4096]);
    assert!(tracee.executed_close(3));
    assert!(!tracee.executed_close(4));
}

// ── Descriptor tracking ──────────────────────────────────────────────

#[test]
fn other_paths_never_become_tracked() {
    let fixture = Fixture::with_size(0);
    let tracee = ScriptedTracee::new(&fixture.path)
        .open_other(3)
        .read(3, 100)
        .read(3, 0)
        .close(3);
    let mut engine = InterceptionEngine::new(tracee, &fixture.config(), |_: Duration| {
        panic!("untracked reads must not wait");
    });

    let err = engine.run().unwrap_err();

    assert!(matches!(err, WaitreadError::TraceeExited { .. }));
    assert_eq!(engine.state(), EngineState::NoFileTracked);
    assert_eq!(engine.tracked().descriptor(), None);
    assert_eq!(engine.tracee().executed.len(), 4);
}

#[test]
fn failed_open_of_target_is_not_tracked() {
    let fixture = Fixture::with_size(10);
    let tracee = ScriptedTracee::new(&fixture.path).open_target(ENOENT).close(3);
    let mut engine = InterceptionEngine::new(tracee, &fixture.config(), |_: Duration| {});

    let err = engine.run().unwrap_err();

    assert_eq!(err.exit_code(), 4);
    assert_eq!(engine.tracked().descriptor(), None);
    assert!(engine.tracee().executed_close(3));
}

#[test]
fn last_matching_open_wins() {
    let fixture = Fixture::with_size(100);
    let tracee = ScriptedTracee::new(&fixture.path)
        .open_target(3)
        .read(3, 40)
        .open_target(5)
        .read(3, 60)
        .read(5, 30)
        .close(3)
        .close(5);
    let mut engine = InterceptionEngine::new(tracee, &fixture.config(), |_: Duration| {});

    let report = engine.run().expect("run");

    assert_eq!(report.descriptor, Some(5));
    assert_eq!(report.bytes_consumed, 30);
    assert!(engine.tracee().executed_close(3));
}

#[test]
fn close_of_tracked_descriptor_ends_without_checking_growth() {
    let fixture = Fixture::with_size(0);
    let tracee = ScriptedTracee::new(&fixture.path).open_target(3).close(3).read(3, 1);
    let mut engine = InterceptionEngine::new(tracee, &fixture.config(), |_: Duration| {
        panic!("close must not wait");
    });

    let report = engine.run().expect("run");

    assert_eq!(report.end, EndReason::Closed);
    assert_eq!(report.bytes_consumed, 0);
    let tracee = engine.into_tracee();
    assert_eq!(tracee.detaches, 1);
    assert!(!tracee.executed_close(3));
    assert_eq!(tracee.steps.len(), 1, "no syscall is intercepted after detaching");
}

#[test]
fn consumed_counts_only_positive_results() {
    let fixture = Fixture::with_size(100);
    let tracee = ScriptedTracee::new(&fixture.path)
        .open_target(3)
        .read(3, 30)
        .read(3, -4)
        .read(3, 0)
        .read(3, 20)
        .close(3);
    let mut engine = InterceptionEngine::new(tracee, &fixture.config(), |_: Duration| {});

    let report = engine.run().expect("run");

    let executed: i64 = engine
        .tracee()
        .executed_reads(3)
        .into_iter()
        .filter(|ret| *ret > 0)
        .sum();
    assert_eq!(report.bytes_consumed, 50);
    assert_eq!(i64::try_from(report.bytes_consumed).unwrap(), executed);
}

// ── Failure handling ─────────────────────────────────────────────────

#[test]
fn unavailable_remote_reads_disable_matching_but_not_the_loop() {
    let fixture = Fixture::with_size(100);
    let mut tracee = ScriptedTracee::new(&fixture.path)
        .open_target(3)
        .read(3, 50)
        .open_target(4)
        .close(3);
    tracee.memory_unavailable = true;
    let mut engine = InterceptionEngine::new(tracee, &fixture.config(), |_: Duration| {});

    let err = engine.run().unwrap_err();

    assert!(matches!(err, WaitreadError::TraceeExited { .. }));
    assert_eq!(engine.state(), EngineState::NoFileTracked);
    assert_eq!(engine.tracee().executed.len(), 4);
}

#[test]
fn tracee_exit_is_a_protocol_failure() {
    let fixture = Fixture::with_size(100);
    let tracee = ScriptedTracee::new(&fixture.path).open_target(3).read(3, 50);
    let mut engine = InterceptionEngine::new(tracee, &fixture.config(), |_: Duration| {});

    let err = engine.run().unwrap_err();

    assert!(err.is_fatal());
    assert_eq!(err.exit_code(), 4);
    assert_eq!(engine.state(), EngineState::Consuming);
    assert_eq!(engine.tracked().consumed(), 50);
    assert_eq!(engine.tracee().detaches, 0);
}
