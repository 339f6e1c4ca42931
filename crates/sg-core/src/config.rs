//! Gateway configuration.
//!
//! Loaded from a JSON file whose path comes from `SOAR_GATE_CONFIG`
//! (default `config/soar-gate.json`). A missing file yields the defaults; a
//! present but malformed file is an error. `SOAR_BIN` overrides `soarBin`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub const CONFIG_PATH_ENV: &str = "SOAR_GATE_CONFIG";
pub const SOAR_BIN_ENV: &str = "SOAR_BIN";
pub const DEFAULT_CONFIG_PATH: &str = "config/soar-gate.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GateConfig {
    /// Path or name of the `soar` executable.
    #[serde(default = "default_soar_bin")]
    pub soar_bin: PathBuf,

    /// Flags removed from the allow-list discovered from `soar --help`.
    #[serde(default)]
    pub soar_args_deny_list: Vec<String>,

    /// PEM PKCS#1 RSA private key used to unwrap request AES keys.
    #[serde(default = "default_private_key_path")]
    pub private_key_path: PathBuf,

    /// Directory for request scratch files. System temp dir when absent.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    #[serde(default = "default_soar_timeout_secs")]
    pub soar_timeout_secs: u64,

    #[serde(default = "default_help_timeout_secs")]
    pub help_timeout_secs: u64,

    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

fn default_soar_bin() -> PathBuf {
    PathBuf::from("soar")
}

fn default_private_key_path() -> PathBuf {
    PathBuf::from("data/private.rsa")
}

fn default_soar_timeout_secs() -> u64 {
    60
}

fn default_help_timeout_secs() -> u64 {
    10
}

fn default_probe_timeout_secs() -> u64 {
    5
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            soar_bin: default_soar_bin(),
            soar_args_deny_list: Vec::new(),
            private_key_path: default_private_key_path(),
            scratch_dir: None,
            soar_timeout_secs: default_soar_timeout_secs(),
            help_timeout_secs: default_help_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl GateConfig {
    /// Load from `SOAR_GATE_CONFIG` (or the default path) and apply env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = Self::load_from(&path)?;
        if let Some(bin) = env_override(SOAR_BIN_ENV) {
            debug!(bin = %bin, "soarBin overridden by {}", SOAR_BIN_ENV);
            config.soar_bin = PathBuf::from(bin);
        }
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.soar_bin.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("soarBin must not be empty".into()));
        }
        for (name, secs) in [
            ("soarTimeoutSecs", self.soar_timeout_secs),
            ("helpTimeoutSecs", self.help_timeout_secs),
            ("probeTimeoutSecs", self.probe_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }

    pub fn soar_timeout(&self) -> Duration {
        Duration::from_secs(self.soar_timeout_secs)
    }

    pub fn help_timeout(&self) -> Duration {
        Duration::from_secs(self.help_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

fn env_override(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
