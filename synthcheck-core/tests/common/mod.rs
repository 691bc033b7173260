//! Test doubles for driving the coordinator without real processes.
//!
//! `FakeSynth` hands out a scripted stderr stream and a `FakeProcess` whose
//! liveness is fixed up front; `RecordingValidator` records every endpoint it
//! is pointed at and answers with a preset exit code.

#![allow(dead_code)]

use nix::errno::Errno;
use nix::unistd::Pid;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use synthcheck_core::error::{HarnessError, Result};
use synthcheck_core::outcome::{Failure, Stage, StageOutcome};
use synthcheck_core::{DiscoveredEndpoint, Launcher, ProbeOutcome, ProcessHandle, Validator};
use tokio::io::{AsyncWriteExt, BufReader, DuplexStream};

pub const FAKE_PID: i32 = 31337;

/// What the fake child does while the validator runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildBehavior {
    /// Still running at probe time
    KeepsRunning,
    /// Gone by the time it is probed
    Crashes,
    /// Exits right after writing its stderr
    ExitsEarly,
    /// Running, but every signal attempt fails with EPERM
    Unsignalable,
}

#[derive(Debug, Default)]
pub struct ProcessStats {
    pub spawns: AtomicUsize,
    pub probes: AtomicUsize,
    pub kills: AtomicUsize,
}

impl ProcessStats {
    pub fn spawns(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

pub struct FakeSynth {
    stderr: Vec<u8>,
    behavior: ChildBehavior,
    keep_stream_open: bool,
    fail_launch: bool,
    pub stats: Arc<ProcessStats>,
}

impl FakeSynth {
    pub fn new(stderr: &str, behavior: ChildBehavior) -> Self {
        Self {
            stderr: stderr.as_bytes().to_vec(),
            behavior,
            keep_stream_open: false,
            fail_launch: false,
            stats: Arc::new(ProcessStats::default()),
        }
    }

    /// Keep the write end of stderr open after the scripted output
    pub fn hanging(mut self) -> Self {
        self.keep_stream_open = true;
        self
    }

    pub fn unlaunchable(mut self) -> Self {
        self.fail_launch = true;
        self
    }
}

impl Launcher for FakeSynth {
    type Process = FakeProcess;
    type Stream = BufReader<DuplexStream>;

    fn launch(&self) -> Result<(Self::Process, Self::Stream)> {
        if self.fail_launch {
            return Err(HarnessError::Spawn {
                program: "fake-synth".to_owned(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        self.stats.spawns.fetch_add(1, Ordering::SeqCst);

        let (reader, mut writer) = tokio::io::duplex(64 * 1024);
        let bytes = self.stderr.clone();
        let keep_open = self.keep_stream_open;
        tokio::spawn(async move {
            let _ = writer.write_all(&bytes).await;
            if keep_open {
                std::future::pending::<()>().await;
            }
        });

        let process = FakeProcess {
            alive: !matches!(self.behavior, ChildBehavior::Crashes | ChildBehavior::ExitsEarly),
            behavior: self.behavior,
            stats: Arc::clone(&self.stats),
        };
        Ok((process, BufReader::new(reader)))
    }
}

pub struct FakeProcess {
    alive: bool,
    behavior: ChildBehavior,
    stats: Arc<ProcessStats>,
}

impl ProcessHandle for FakeProcess {
    fn pid(&self) -> Pid {
        Pid::from_raw(FAKE_PID)
    }

    fn probe(&mut self) -> ProbeOutcome {
        self.stats.probes.fetch_add(1, Ordering::SeqCst);
        if self.behavior == ChildBehavior::Unsignalable {
            ProbeOutcome::Indeterminate(Errno::EPERM)
        } else if self.alive {
            ProbeOutcome::Alive
        } else {
            ProbeOutcome::Exited(Some(segfault()))
        }
    }

    fn kill(&mut self) -> nix::Result<()> {
        if self.behavior == ChildBehavior::Unsignalable {
            return Err(Errno::EPERM);
        }
        if !self.alive {
            return Err(Errno::ESRCH);
        }
        self.stats.kills.fetch_add(1, Ordering::SeqCst);
        self.alive = false;
        Ok(())
    }

    async fn reap(&mut self) -> std::io::Result<ExitStatus> {
        if self.alive {
            return std::future::pending().await;
        }
        Ok(segfault())
    }
}

/// Raw wait status of a child killed by SIGSEGV
pub fn segfault() -> ExitStatus {
    ExitStatus::from_raw(11)
}

pub struct RecordingValidator {
    exit_code: i32,
    invocations: Mutex<Vec<String>>,
}

impl RecordingValidator {
    pub fn exiting(exit_code: i32) -> Self {
        Self {
            exit_code,
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn invocations(&self) -> Vec<String> {
        self.invocations.lock().unwrap().clone()
    }
}

impl Validator for RecordingValidator {
    async fn validate(&self, endpoint: &DiscoveredEndpoint) -> StageOutcome {
        self.invocations
            .lock()
            .unwrap()
            .push(endpoint.uri().to_owned());

        if self.exit_code == 0 {
            StageOutcome::passed(Stage::Validation, "fake validator passed")
        } else {
            StageOutcome::failed(
                Stage::Validation,
                Failure::ValidationFailed {
                    status: Some(ExitStatus::from_raw(self.exit_code << 8)),
                },
                "fake validator failed",
            )
        }
    }
}
