#![allow(clippy::cargo_common_metadata)]

pub mod config;
pub mod coordinator;
pub mod endpoint;
pub mod error;
pub mod liveness;
pub mod outcome;
pub mod process;
pub mod scanner;
pub mod validator;

pub use coordinator::{Coordinator, RunState};
pub use endpoint::{DiscoveredEndpoint, build_endpoint};
pub use outcome::{Failure, RunResult, Stage, StageOutcome};
pub use process::{Launcher, ProbeOutcome, ProcessHandle, SupervisedProcess, SynthLauncher};
pub use scanner::{LineScanner, parse_marker};
pub use validator::{ExternalValidator, Validator};
