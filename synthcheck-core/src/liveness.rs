//! Post-validation liveness check
//!
//! After the validator has hammered the synthesizer we give it a moment,
//! check that it is still around, and then kill it. A vanished child is the
//! most likely explanation for any validator failure, so it is reported as
//! a crash. A probe that cannot tell either way is reported separately.

use crate::outcome::{Failure, Stage, StageOutcome};
use crate::process::{ProbeOutcome, ProcessHandle};
use nix::errno::Errno;
use nix::unistd::Pid;
use std::process::ExitStatus;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct LivenessProber {
    grace: Duration,
}

impl LivenessProber {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    /// Wait out the grace period
    pub async fn settle(&self) {
        if !self.grace.is_zero() {
            debug!("Waiting {:?} before probing", self.grace);
            tokio::time::sleep(self.grace).await;
        }
    }

    pub fn probe<P: ProcessHandle>(&self, process: &mut P) -> ProbeOutcome {
        let outcome = process.probe();
        debug!("Probe of process {}: {:?}", process.pid(), outcome);
        outcome
    }

    /// Turn a probe result into the liveness outcome, killing the child if it
    /// is still alive. Returns the outcome and whether a kill was delivered.
    pub async fn terminate<P: ProcessHandle>(
        &self,
        process: &mut P,
        probed: ProbeOutcome,
    ) -> (StageOutcome, bool) {
        let pid = process.pid();

        match probed {
            ProbeOutcome::Alive => match process.kill() {
                Ok(()) => {
                    if let Err(e) = process.reap().await {
                        warn!("Failed to reap process {}: {}", pid, e);
                    }
                    (
                        StageOutcome::passed(
                            Stage::Liveness,
                            format!("process {pid} still alive, now terminated"),
                        ),
                        true,
                    )
                }
                Err(Errno::ESRCH) => {
                    let status = process.reap().await.ok();
                    (crashed(pid, status), false)
                }
                Err(errno) => (signal_error(pid, errno), false),
            },
            ProbeOutcome::Exited(status) => {
                let status = match status {
                    Some(status) => Some(status),
                    None => process.reap().await.ok(),
                };
                (crashed(pid, status), false)
            }
            ProbeOutcome::Indeterminate(errno) => (signal_error(pid, errno), false),
        }
    }
}

fn crashed(pid: Pid, status: Option<ExitStatus>) -> StageOutcome {
    StageOutcome::failed(
        Stage::Liveness,
        Failure::CrashDetected { pid, status },
        "synthesizer died during the run, likely the cause of any validation failure",
    )
}

fn signal_error(pid: Pid, errno: Errno) -> StageOutcome {
    StageOutcome::failed(
        Stage::Liveness,
        Failure::SignalError { pid, errno },
        "unable to determine whether the synthesizer terminated",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    struct FakeProcess {
        probe: ProbeOutcome,
        kill_error: Option<Errno>,
        kills: usize,
    }

    impl FakeProcess {
        fn new(probe: ProbeOutcome) -> Self {
            Self {
                probe,
                kill_error: None,
                kills: 0,
            }
        }
    }

    impl ProcessHandle for FakeProcess {
        fn pid(&self) -> Pid {
            Pid::from_raw(4242)
        }

        fn probe(&mut self) -> ProbeOutcome {
            self.probe
        }

        fn kill(&mut self) -> nix::Result<()> {
            if let Some(errno) = self.kill_error {
                return Err(errno);
            }
            self.kills += 1;
            Ok(())
        }

        async fn reap(&mut self) -> std::io::Result<ExitStatus> {
            Ok(ExitStatus::from_raw(9))
        }
    }

    async fn check(process: &mut FakeProcess) -> (StageOutcome, bool) {
        let prober = LivenessProber::new(Duration::ZERO);
        prober.settle().await;
        let probed = prober.probe(process);
        prober.terminate(process, probed).await
    }

    #[tokio::test]
    async fn test_alive_child_is_killed_once() {
        let mut process = FakeProcess::new(ProbeOutcome::Alive);
        let (outcome, killed) = check(&mut process).await;

        assert!(outcome.is_success());
        assert!(killed);
        assert_eq!(process.kills, 1);
        assert!(outcome.message.contains("still alive"));
    }

    #[tokio::test]
    async fn test_exited_child_is_a_crash() {
        let status = ExitStatus::from_raw(11);
        let mut process = FakeProcess::new(ProbeOutcome::Exited(Some(status)));
        let (outcome, killed) = check(&mut process).await;

        assert!(!killed);
        assert_eq!(process.kills, 0);
        assert_eq!(
            outcome.failure,
            Some(Failure::CrashDetected {
                pid: Pid::from_raw(4242),
                status: Some(status),
            })
        );
    }

    #[tokio::test]
    async fn test_vanished_child_is_reaped_for_status() {
        let mut process = FakeProcess::new(ProbeOutcome::Exited(None));
        let (outcome, _) = check(&mut process).await;

        match outcome.failure {
            Some(Failure::CrashDetected { status, .. }) => {
                assert_eq!(status, Some(ExitStatus::from_raw(9)));
            }
            other => panic!("expected crash, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_indeterminate_probe_is_not_a_crash() {
        let mut process = FakeProcess::new(ProbeOutcome::Indeterminate(Errno::EPERM));
        let (outcome, killed) = check(&mut process).await;

        assert!(!killed);
        assert_eq!(process.kills, 0);
        assert_eq!(
            outcome.failure,
            Some(Failure::SignalError {
                pid: Pid::from_raw(4242),
                errno: Errno::EPERM,
            })
        );
    }

    #[tokio::test]
    async fn test_child_dying_before_kill_is_a_crash() {
        let mut process = FakeProcess::new(ProbeOutcome::Alive);
        process.kill_error = Some(Errno::ESRCH);
        let (outcome, killed) = check(&mut process).await;

        assert!(!killed);
        assert!(matches!(outcome.failure, Some(Failure::CrashDetected { .. })));
    }

    #[tokio::test]
    async fn test_kill_refused() {
        let mut process = FakeProcess::new(ProbeOutcome::Alive);
        process.kill_error = Some(Errno::EPERM);
        let (outcome, killed) = check(&mut process).await;

        assert!(!killed);
        assert!(matches!(outcome.failure, Some(Failure::SignalError { .. })));
    }
}
