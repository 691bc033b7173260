//! Stage outcomes and the aggregate run result

use crate::coordinator::RunState;
use crate::endpoint::DiscoveredEndpoint;
use nix::errno::Errno;
use nix::unistd::Pid;
use std::fmt;
use std::process::ExitStatus;

/// Why discovery gave up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryFailure {
    /// The diagnostic stream closed before the marker appeared
    StreamClosed { lines_seen: usize },
    /// The configured startup timeout expired
    TimedOut { lines_seen: usize },
    /// Reading the stream failed
    Io(String),
}

impl fmt::Display for DiscoveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StreamClosed { lines_seen } => write!(
                f,
                "diagnostic stream closed after {lines_seen} line(s) without a startup marker"
            ),
            Self::TimedOut { lines_seen } => write!(
                f,
                "no startup marker within the startup timeout ({lines_seen} line(s) read)"
            ),
            Self::Io(e) => write!(f, "failed to read diagnostic stream: {e}"),
        }
    }
}

/// A failure recorded against one stage of the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// No endpoint could be discovered; aborts the run
    DiscoveryFailed(DiscoveryFailure),
    /// The validator reported failure or could not be launched
    ValidationFailed { status: Option<ExitStatus> },
    /// The supervised child was gone when the liveness probe ran
    CrashDetected { pid: Pid, status: Option<ExitStatus> },
    /// The child could not be probed or signalled
    SignalError { pid: Pid, errno: Errno },
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DiscoveryFailed(reason) => write!(f, "discovery failed: {reason}"),
            Self::ValidationFailed { status: Some(status) } => {
                write!(f, "validation failed ({status})")
            }
            Self::ValidationFailed { status: None } => write!(f, "validation failed"),
            Self::CrashDetected {
                pid,
                status: Some(status),
            } => write!(f, "crash detected: process {pid} is gone ({status})"),
            Self::CrashDetected { pid, status: None } => {
                write!(f, "crash detected: process {pid} is gone")
            }
            Self::SignalError { pid, errno } => {
                write!(f, "could not signal process {pid}: {errno}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Discovery,
    Validation,
    Liveness,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Discovery => "discovery",
            Self::Validation => "validation",
            Self::Liveness => "liveness",
        };
        f.write_str(name)
    }
}

/// Result of a single stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub stage: Stage,
    pub failure: Option<Failure>,
    pub message: String,
}

impl StageOutcome {
    pub fn passed(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            failure: None,
            message: message.into(),
        }
    }

    pub fn failed(stage: Stage, failure: Failure, message: impl Into<String>) -> Self {
        Self {
            stage,
            failure: Some(failure),
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failure {
            None => write!(f, "[{}] ok: {}", self.stage, self.message),
            Some(failure) => write!(f, "[{}] FAILED: {}: {}", self.stage, failure, self.message),
        }
    }
}

/// Everything a run produced, folded from its stage outcomes
#[derive(Debug, Clone)]
pub struct RunResult {
    pub outcomes: Vec<StageOutcome>,
    pub endpoint: Option<DiscoveredEndpoint>,
    pub final_state: RunState,
    /// Forced-termination signals delivered to the child
    pub kills_sent: usize,
}

impl RunResult {
    pub fn new() -> Self {
        Self {
            outcomes: Vec::new(),
            endpoint: None,
            final_state: RunState::Spawning,
            kills_sent: 0,
        }
    }

    pub fn record(&mut self, outcome: StageOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn failures(&self) -> impl Iterator<Item = &Failure> {
        self.outcomes.iter().filter_map(|o| o.failure.as_ref())
    }

    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|o| o.stage == stage)
    }

    pub fn is_success(&self) -> bool {
        // A run that never got past discovery has nothing to vouch for it
        self.failures().next().is_none() && self.endpoint.is_some()
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_success() { 0 } else { 1 }
    }

    pub fn discovery_failed(&self) -> bool {
        self.endpoint.is_none()
            || self
                .failures()
                .any(|f| matches!(f, Failure::DiscoveryFailed(_)))
    }

    pub fn validation_failed(&self) -> bool {
        self.failures()
            .any(|f| matches!(f, Failure::ValidationFailed { .. }))
    }

    pub fn crash_detected(&self) -> bool {
        self.failures()
            .any(|f| matches!(f, Failure::CrashDetected { .. }))
    }

    pub fn signal_error(&self) -> bool {
        self.failures()
            .any(|f| matches!(f, Failure::SignalError { .. }))
    }
}

impl Default for RunResult {
    fn default() -> Self {
        Self::new()
    }
}
