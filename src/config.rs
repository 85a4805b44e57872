use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Top-level configuration loaded from procsampler.toml.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub sampling: SamplingConfig,
    pub launch: LaunchConfig,
    pub log: LogConfig,
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Interval used when only a path is given on the command line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<f64>,
    /// Keep accumulating run time after an operator-confirmed restart
    /// instead of starting the new run at zero.
    pub carry_run_time: bool,
    /// Stop after this many samples in a single run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_samples: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// Accepted file extensions, without the dot. Empty means any file
    /// carrying an executable permission bit.
    pub executable_extensions: Vec<String>,
    pub discovery_attempts: u32,
    pub discovery_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Defaults to `data/` beside the executable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    pub write_baseline_row: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// File name inside the data directory whose appearance stops the run.
    pub stop_file: PathBuf,
    pub escape_key: bool,
}

// --- Default implementations ---

impl Default for LaunchConfig {
    fn default() -> Self {
        let executable_extensions = if cfg!(windows) {
            vec!["exe".to_string()]
        } else {
            Vec::new()
        };
        Self {
            executable_extensions,
            discovery_attempts: 5,
            discovery_delay_ms: 200,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            write_baseline_row: true,
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            stop_file: PathBuf::from("STOP"),
            escape_key: true,
        }
    }
}

/// Errors from loading the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Load config from `path`. A missing file yields the defaults.
pub fn load(path: &Path) -> Result<MonitorConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(MonitorConfig::default());
        }
        Err(e) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}
