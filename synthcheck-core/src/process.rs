//! The supervised synthesizer process
//!
//! This module provides:
//! - `ProcessHandle`: probe, kill and reap operations on a child
//! - `SupervisedProcess`: the real implementation backed by a tokio child
//! - `Launcher` / `SynthLauncher`: spawning the child with stderr piped

use crate::config::SynthConfig;
use crate::error::{HarnessError, Result};
use camino::Utf8PathBuf;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::future::Future;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufRead, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tracing::{debug, info, warn};

/// Result of a non-destructive existence check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Alive,
    /// The process is gone; the exit status is known if we reaped it
    Exited(Option<ExitStatus>),
    /// The probe itself failed for a reason other than "no such process"
    Indeterminate(Errno),
}

/// Operations the coordinator needs on the supervised child
pub trait ProcessHandle {
    fn pid(&self) -> Pid;

    /// Check whether the process still exists without disturbing it
    fn probe(&mut self) -> ProbeOutcome;

    /// Send SIGKILL
    fn kill(&mut self) -> nix::Result<()>;

    /// Wait for the process to exit and collect its status
    fn reap(&mut self) -> impl Future<Output = std::io::Result<ExitStatus>> + Send;
}

/// Spawns the supervised child and hands back its diagnostic stream
pub trait Launcher {
    type Process: ProcessHandle + Send;
    type Stream: AsyncBufRead + Unpin + Send;

    fn launch(&self) -> Result<(Self::Process, Self::Stream)>;
}

/// A spawned synthesizer
#[derive(Debug)]
pub struct SupervisedProcess {
    child: Child,
    pid: Pid,
}

impl SupervisedProcess {
    pub fn new(child: Child) -> Option<Self> {
        let pid = child.id().and_then(|id| i32::try_from(id).ok())?;
        Some(Self {
            child,
            pid: Pid::from_raw(pid),
        })
    }
}

impl ProcessHandle for SupervisedProcess {
    fn pid(&self) -> Pid {
        self.pid
    }

    fn probe(&mut self) -> ProbeOutcome {
        // An exited but unreaped child still answers signal 0, so look for
        // a pending exit status first.
        match self.child.try_wait() {
            Ok(Some(status)) => return ProbeOutcome::Exited(Some(status)),
            Ok(None) => {}
            Err(e) => warn!("Failed to poll process {} for exit: {}", self.pid, e),
        }

        match signal::kill(self.pid, None) {
            Ok(()) => ProbeOutcome::Alive,
            Err(Errno::ESRCH) => ProbeOutcome::Exited(None),
            Err(errno) => ProbeOutcome::Indeterminate(errno),
        }
    }

    fn kill(&mut self) -> nix::Result<()> {
        debug!("Sending SIGKILL to process {}", self.pid);
        signal::kill(self.pid, Signal::SIGKILL)
    }

    async fn reap(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }
}

/// Launches the synthesizer with audio output and the GUI disabled
#[derive(Debug, Clone)]
pub struct SynthLauncher {
    program: Utf8PathBuf,
    args: Vec<String>,
}

impl SynthLauncher {
    pub fn new(program: impl Into<Utf8PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &SynthConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(self.program.as_std_path());
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Launcher for SynthLauncher {
    type Process = SupervisedProcess;
    type Stream = BufReader<ChildStderr>;

    fn launch(&self) -> Result<(Self::Process, Self::Stream)> {
        let mut child = self.command().spawn().map_err(|source| HarnessError::Spawn {
            program: self.program.to_string(),
            source,
        })?;

        let stderr = child
            .stderr
            .take()
            .ok_or(HarnessError::MissingStream("stderr"))?;

        let process = SupervisedProcess::new(child).ok_or_else(|| HarnessError::Spawn {
            program: self.program.to_string(),
            source: std::io::Error::other("child exited before its pid could be read"),
        })?;

        info!("Started {} (pid {})", self.program, process.pid());
        Ok((process, BufReader::new(stderr)))
    }
}
