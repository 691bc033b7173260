use anyhow::{Context, Result};
use synthcheck_core::config::Config;
use synthcheck_core::{Coordinator, ExternalValidator, RunResult, SynthLauncher};
use tracing::{error, info};

pub async fn run(config: &Config) -> Result<RunResult> {
    let launcher = SynthLauncher::from_config(&config.synth);
    let validator = ExternalValidator::from_config(&config.validator);
    let mut coordinator = Coordinator::from_config(config);

    let result = coordinator
        .run(&launcher, &validator)
        .await
        .with_context(|| format!("Could not start {}", config.synth.program))?;

    summarize(&result);
    Ok(result)
}

fn summarize(result: &RunResult) {
    if result.is_success() {
        info!("All checks passed");
        return;
    }

    if result.discovery_failed() {
        error!("Synthesizer never announced its OSC port");
    }
    if result.crash_detected() {
        error!("Synthesizer crashed during the run");
    }
    if result.validation_failed() {
        error!("Port checker reported failures");
    }
    if result.signal_error() {
        error!("Synthesizer could not be signalled, it may still be running");
    }
}
