use crate::error::{HarnessError, Result};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub synth: SynthConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

/// How the supervised synthesizer is launched
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SynthConfig {
    #[serde(default = "default_synth_program")]
    pub program: Utf8PathBuf,
    #[serde(default = "default_synth_args")]
    pub args: Vec<String>,
    /// Upper bound on waiting for the startup marker.
    /// Absent means wait until the stream closes.
    #[serde(default)]
    pub startup_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ValidatorConfig {
    #[serde(default = "default_validator_program")]
    pub program: Utf8PathBuf,
    /// Extra arguments placed before the timeout flag and the endpoint
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_flag")]
    pub timeout_flag: String,
    /// Timeout handed to the validator; `None` omits the flag entirely
    #[serde(default = "default_validator_timeout")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TimingConfig {
    /// Pause between discovering the port and starting the validator
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Pause between the validator exiting and the liveness probe
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            program: default_synth_program(),
            args: default_synth_args(),
            startup_timeout_ms: None,
        }
    }
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            program: default_validator_program(),
            args: Vec::new(),
            timeout_flag: default_timeout_flag(),
            timeout_ms: default_validator_timeout(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
            grace_ms: default_grace_ms(),
        }
    }
}

impl SynthConfig {
    pub fn startup_timeout(&self) -> Option<Duration> {
        self.startup_timeout_ms.map(Duration::from_millis)
    }
}

impl ValidatorConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl TimingConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

// Default value functions
fn default_synth_program() -> Utf8PathBuf {
    Utf8PathBuf::from("zynaddsubfx")
}

fn default_synth_args() -> Vec<String> {
    // No audio output, no GUI
    vec!["-O".to_owned(), "null".to_owned(), "--no-gui".to_owned()]
}

fn default_validator_program() -> Utf8PathBuf {
    Utf8PathBuf::from("port-checker")
}

fn default_timeout_flag() -> String {
    "--timeout".to_owned()
}

const fn default_validator_timeout() -> Option<u64> {
    Some(1000)
}

const fn default_settle_ms() -> u64 {
    1000
}

const fn default_grace_ms() -> u64 {
    3000
}

impl Config {
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| HarnessError::Config(format!("Failed to read config: {e}")))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)
            .map_err(|e| HarnessError::Config(format!("Failed to parse config: {e}")))?;

        config.expand_paths();
        config.validate()?;
        Ok(config)
    }

    /// Load the first config file that exists, or the defaults if there is
    /// none. A file that exists but is broken is an error.
    pub fn load_or_default() -> Result<Self> {
        Self::load_first_of(Self::config_candidates())
    }

    pub fn load_first_of<I>(candidates: I) -> Result<Self>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        match candidates.into_iter().find(|candidate| candidate.exists()) {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::load_from_path(&path)
            }
            None => {
                debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn config_candidates() -> Vec<PathBuf> {
        [
            dirs::config_dir().map(|p| p.join("synthcheck/synthcheck.toml")),
            Some(PathBuf::from("/etc/synthcheck/synthcheck.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn expand_paths(&mut self) {
        fn expand_tilde(path: &Utf8PathBuf) -> Utf8PathBuf {
            let path_str = path.as_str();
            if path_str.starts_with("~/") {
                if let Some(home) = dirs::home_dir() {
                    if let Some(home_str) = home.to_str() {
                        return Utf8PathBuf::from(path_str.replacen('~', home_str, 1));
                    }
                }
            }
            path.clone()
        }

        self.synth.program = expand_tilde(&self.synth.program);
        self.validator.program = expand_tilde(&self.validator.program);
    }

    pub fn validate(&self) -> Result<()> {
        if self.synth.program.as_str().is_empty() {
            return Err(HarnessError::Config(
                "Synthesizer program must not be empty".to_owned(),
            ));
        }
        if self.validator.program.as_str().is_empty() {
            return Err(HarnessError::Config(
                "Validator program must not be empty".to_owned(),
            ));
        }
        if self.validator.timeout_ms.is_some() && self.validator.timeout_flag.is_empty() {
            return Err(HarnessError::Config(
                "A validator timeout needs a timeout flag".to_owned(),
            ));
        }
        Ok(())
    }
}
