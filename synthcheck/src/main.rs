use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Parser;
use std::process::ExitCode;
use synthcheck_core::config::Config;
use tracing::info;

mod app;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "synthcheck - OSC port checker harness for zynaddsubfx",
    long_about = None
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<Utf8PathBuf>,

    /// Synthesizer executable
    #[arg(short, long)]
    synth: Option<Utf8PathBuf>,

    /// Port checker executable
    #[arg(long)]
    validator: Option<Utf8PathBuf>,

    /// Timeout passed to the port checker, in milliseconds
    #[arg(long, value_name = "MS", conflicts_with = "no_validator_timeout")]
    validator_timeout: Option<u64>,

    /// Do not pass a timeout to the port checker
    #[arg(long)]
    no_validator_timeout: bool,

    /// Delay between port discovery and validation, in milliseconds
    #[arg(long, value_name = "MS")]
    settle: Option<u64>,

    /// Delay between validation and the liveness probe, in milliseconds
    #[arg(long, value_name = "MS")]
    grace: Option<u64>,

    /// Give up if the synthesizer has not announced its port after this many milliseconds
    #[arg(long, value_name = "MS")]
    startup_timeout: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(program) = self.synth {
            config.synth.program = program;
        }
        if let Some(program) = self.validator {
            config.validator.program = program;
        }
        if self.no_validator_timeout {
            config.validator.timeout_ms = None;
        } else if let Some(ms) = self.validator_timeout {
            config.validator.timeout_ms = Some(ms);
        }
        if let Some(ms) = self.settle {
            config.timing.settle_ms = ms;
        }
        if let Some(ms) = self.grace {
            config.timing.grace_ms = ms;
        }
        if let Some(ms) = self.startup_timeout {
            config.synth.startup_timeout_ms = Some(ms);
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    info!("Starting synthcheck v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_default()?
    };

    // Override with CLI arguments
    args.apply(&mut config);
    config.validate()?;

    info!("Synthesizer: {}", config.synth.program);
    info!("Validator: {}", config.validator.program);

    let result = app::run(&config).await?;
    Ok(ExitCode::from(result.exit_code()))
}
