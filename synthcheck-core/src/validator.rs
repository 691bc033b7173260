//! External protocol validator invocation
//!
//! The validator is run to completion against the discovered endpoint. Any
//! bound on how long that takes is delegated to the validator's own timeout
//! flag: a synthesizer too busy to answer can still stall it.

use crate::config::ValidatorConfig;
use crate::endpoint::DiscoveredEndpoint;
use crate::outcome::{Failure, Stage, StageOutcome};
use camino::Utf8PathBuf;
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error};

pub trait Validator {
    fn validate(&self, endpoint: &DiscoveredEndpoint) -> impl Future<Output = StageOutcome> + Send;
}

#[derive(Debug, Clone)]
pub struct ExternalValidator {
    program: Utf8PathBuf,
    args: Vec<String>,
    timeout_flag: String,
    timeout: Option<Duration>,
}

impl ExternalValidator {
    pub fn new(program: impl Into<Utf8PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout_flag: "--timeout".to_owned(),
            timeout: None,
        }
    }

    pub fn from_config(config: &ValidatorConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            timeout_flag: config.timeout_flag.clone(),
            timeout: config.timeout(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, flag: impl Into<String>, timeout: Duration) -> Self {
        self.timeout_flag = flag.into();
        self.timeout = Some(timeout);
        self
    }

    /// Build `<program> [args..] [<flag> <ms>] <endpoint>`
    pub fn command(&self, endpoint: &DiscoveredEndpoint) -> Command {
        let mut cmd = Command::new(self.program.as_std_path());
        cmd.args(&self.args);
        if let Some(timeout) = self.timeout {
            cmd.arg(&self.timeout_flag).arg(timeout.as_millis().to_string());
        }
        cmd.arg(endpoint.uri())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        cmd
    }
}

impl Validator for ExternalValidator {
    async fn validate(&self, endpoint: &DiscoveredEndpoint) -> StageOutcome {
        debug!("Running {} against {}", self.program, endpoint);

        match self.command(endpoint).status().await {
            Ok(status) if status.success() => StageOutcome::passed(
                Stage::Validation,
                format!("{} passed for {endpoint}", self.program),
            ),
            Ok(status) => StageOutcome::failed(
                Stage::Validation,
                Failure::ValidationFailed {
                    status: Some(status),
                },
                format!("{} reported failures for {endpoint}", self.program),
            ),
            Err(e) => {
                error!("Failed to run validator {}: {}", self.program, e);
                StageOutcome::failed(
                    Stage::Validation,
                    Failure::ValidationFailed { status: None },
                    format!("could not run {}: {e}", self.program),
                )
            }
        }
    }
}
