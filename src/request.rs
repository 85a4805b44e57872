/// Launch requests: the validated pair of executable path and sampling interval.
use crate::config::LaunchConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// A validated request to launch and sample one executable.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRequest {
    executable_path: PathBuf,
    interval: Duration,
}

/// Reasons a path/interval pair is rejected. Messages are shown to the operator verbatim.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Interval should be a number.")]
    IntervalNotNumber { input: String },
    #[error("Interval should have a value greater than 0.")]
    IntervalNotPositive { value: f64 },
    #[error("Interval is too large.")]
    IntervalTooLarge { value: f64 },
    #[error("Path '{}' is not absolute.", path.display())]
    NotAbsolute { path: PathBuf },
    #[error("Path '{}' does not exist.", path.display())]
    NotFound { path: PathBuf },
    #[error("'{}' is not an executable file.", path.display())]
    NotExecutable { path: PathBuf },
}

impl LaunchRequest {
    #[cfg(test)]
    pub(crate) fn unchecked(path: impl Into<PathBuf>, interval: f64) -> Self {
        Self {
            executable_path: path.into(),
            interval: Duration::from_secs_f64(interval),
        }
    }

    pub fn executable_path(&self) -> &Path {
        &self.executable_path
    }

    /// Sampling interval in seconds.
    pub fn interval(&self) -> f64 {
        self.interval.as_secs_f64()
    }

    pub fn interval_duration(&self) -> Duration {
        self.interval
    }

    /// Lower-cased file name, the key used to match OS processes.
    pub fn process_name(&self) -> String {
        self.executable_path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }

    /// File name up to the first dot, used to name the log file.
    pub fn log_stem(&self) -> String {
        let name = self.process_name();
        match name.split('.').next() {
            Some(stem) if !stem.is_empty() => stem.to_string(),
            _ => name,
        }
    }
}

/// Validate raw operator input into a `LaunchRequest`.
///
/// Double quotes are stripped from the path, since paths copied from a file
/// manager often arrive wrapped in them.
pub fn validate(
    raw_path: &str,
    raw_interval: &str,
    config: &LaunchConfig,
) -> Result<LaunchRequest, ValidationError> {
    let path = PathBuf::from(raw_path.trim().replace('"', ""));

    if !path.is_absolute() {
        return Err(ValidationError::NotAbsolute { path });
    }
    if !path.exists() {
        return Err(ValidationError::NotFound { path });
    }
    if !path.is_file() || !is_executable(&path, &config.executable_extensions) {
        return Err(ValidationError::NotExecutable { path });
    }

    let interval: f64 =
        raw_interval
            .trim()
            .parse()
            .map_err(|_| ValidationError::IntervalNotNumber {
                input: raw_interval.trim().to_string(),
            })?;
    if !interval.is_finite() || interval <= 0.0 {
        return Err(ValidationError::IntervalNotPositive { value: interval });
    }
    let interval = Duration::try_from_secs_f64(interval)
        .map_err(|_| ValidationError::IntervalTooLarge { value: interval })?;

    Ok(LaunchRequest {
        executable_path: path,
        interval,
    })
}

fn is_executable(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return has_exec_bit(path);
    }
    let Some(ext) = path.extension().map(|e| e.to_string_lossy().to_lowercase()) else {
        return false;
    };
    extensions
        .iter()
        .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(&ext))
}

#[cfg(unix)]
fn has_exec_bit(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn has_exec_bit(_path: &Path) -> bool {
    false
}
