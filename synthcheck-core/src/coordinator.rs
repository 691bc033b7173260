//! Run sequencing
//!
//! One run spawns the synthesizer, waits for its startup marker, points the
//! validator at the announced port, checks the synthesizer survived and
//! kills it. Only a missing endpoint cuts the sequence short; every other
//! failure is recorded and the run carries on.

use crate::config::Config;
use crate::endpoint::DiscoveredEndpoint;
use crate::error::Result;
use crate::liveness::LivenessProber;
use crate::outcome::{DiscoveryFailure, Failure, RunResult, Stage, StageOutcome};
use crate::process::{Launcher, ProcessHandle};
use crate::scanner::LineScanner;
use crate::validator::Validator;
use std::time::Duration;
use tokio::io::AsyncBufRead;
use tracing::{debug, error, info, warn};

/// How long a child whose stream closed early gets to exit on its own
/// before it is killed
const EXIT_WAIT: Duration = Duration::from_millis(500);

/// Coordinator states, in the only order they can occur
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunState {
    Spawning,
    AwaitingEndpoint,
    Validating,
    Settling,
    ProbingLiveness,
    Terminating,
    Done,
}

#[derive(Debug)]
pub struct Coordinator {
    settle: Duration,
    startup_timeout: Option<Duration>,
    prober: LivenessProber,
    state: RunState,
}

impl Coordinator {
    pub fn new(settle: Duration, grace: Duration) -> Self {
        Self {
            settle,
            startup_timeout: None,
            prober: LivenessProber::new(grace),
            state: RunState::Spawning,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.timing.settle(), config.timing.grace())
            .with_startup_timeout(config.synth.startup_timeout())
    }

    pub fn with_startup_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(
            next > self.state,
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!("{:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Perform one complete run
    ///
    /// Only a failure to launch the synthesizer is returned as an error;
    /// everything that goes wrong afterwards ends up in the `RunResult`.
    pub async fn run<L, V>(&mut self, launcher: &L, validator: &V) -> Result<RunResult>
    where
        L: Launcher,
        V: Validator,
    {
        self.state = RunState::Spawning;
        let mut result = RunResult::new();

        let (mut process, stream) = launcher.launch()?;
        self.advance(RunState::AwaitingEndpoint);

        // Holds the read end of the child's stderr until the run is over
        let mut scanner = LineScanner::new(stream);

        let port = match self.discover(&mut scanner).await {
            Ok(port) => port,
            Err(reason) => {
                let outcome = StageOutcome::failed(
                    Stage::Discovery,
                    Failure::DiscoveryFailed(reason),
                    "no endpoint to validate",
                );
                report(&mut result, outcome);
                result.kills_sent = teardown(&mut process).await;
                self.advance(RunState::Done);
                result.final_state = self.state;
                return Ok(result);
            }
        };

        let endpoint = DiscoveredEndpoint::new(port);
        let outcome = StageOutcome::passed(
            Stage::Discovery,
            format!("synthesizer listening on {endpoint}"),
        );
        report(&mut result, outcome);
        result.endpoint = Some(endpoint.clone());

        if !self.settle.is_zero() {
            debug!("Letting the synthesizer settle for {:?}", self.settle);
            tokio::time::sleep(self.settle).await;
        }

        self.advance(RunState::Validating);
        let outcome = validator.validate(&endpoint).await;
        report(&mut result, outcome);

        self.advance(RunState::Settling);
        self.prober.settle().await;

        self.advance(RunState::ProbingLiveness);
        let probed = self.prober.probe(&mut process);

        self.advance(RunState::Terminating);
        let (outcome, killed) = self.prober.terminate(&mut process, probed).await;
        if killed {
            result.kills_sent += 1;
        }
        report(&mut result, outcome);

        self.advance(RunState::Done);
        result.final_state = self.state;
        drop(scanner);

        Ok(result)
    }

    async fn discover<R>(
        &self,
        scanner: &mut LineScanner<R>,
    ) -> std::result::Result<u16, DiscoveryFailure>
    where
        R: AsyncBufRead + Unpin,
    {
        let scanned = match self.startup_timeout {
            Some(limit) => match tokio::time::timeout(limit, scanner.scan()).await {
                Ok(scanned) => scanned,
                Err(_) => {
                    return Err(DiscoveryFailure::TimedOut {
                        lines_seen: scanner.lines_seen(),
                    });
                }
            },
            None => scanner.scan().await,
        };

        match scanned {
            Ok(Some(port)) => Ok(port),
            Ok(None) => Err(DiscoveryFailure::StreamClosed {
                lines_seen: scanner.lines_seen(),
            }),
            Err(e) => Err(DiscoveryFailure::Io(e.to_string())),
        }
    }
}

fn report(result: &mut RunResult, outcome: StageOutcome) {
    if outcome.is_success() {
        info!("{}", outcome);
    } else {
        error!("{}", outcome);
    }
    result.record(outcome);
}

/// Dispose of a child after discovery failed. Returns the number of kill
/// signals delivered.
async fn teardown<P: ProcessHandle>(process: &mut P) -> usize {
    let pid = process.pid();

    match tokio::time::timeout(EXIT_WAIT, process.reap()).await {
        Ok(Ok(status)) => {
            info!("Process {} exited on its own ({})", pid, status);
            return 0;
        }
        Ok(Err(e)) => {
            warn!("Failed to wait for process {}: {}", pid, e);
            return 0;
        }
        Err(_) => {}
    }

    match process.kill() {
        Ok(()) => {
            if let Err(e) = process.reap().await {
                warn!("Failed to reap process {}: {}", pid, e);
            }
            info!("Killed process {} after failed discovery", pid);
            1
        }
        Err(errno) => {
            warn!("Could not kill process {}: {}", pid, errno);
            0
        }
    }
}
