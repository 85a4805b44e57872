use chrono::{DateTime, TimeZone};
use std::fmt::Display;
use std::path::{Path, PathBuf};

/// Timestamp layout used in log file names.
const LOG_TIMESTAMP_FORMAT: &str = "%d-%m-%Y_%H-%M-%S";

/// Manages the `data/` directory layout.
///
/// Sample logs, the status file and the STOP file all live under a single
/// data directory (default `data/` beside the executable).
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Create a new DataDir referencing the given root path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory (e.g. `data/`).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the loop status file.
    pub fn status(&self) -> PathBuf {
        self.root.join("status.json")
    }

    /// Path to the STOP file with the configured name.
    pub fn stop_file(&self, name: &Path) -> PathBuf {
        self.root.join(name)
    }

    /// Path to a sample log, e.g. `data/app_16-10-2026_09-30-00.csv`.
    pub fn log_file<Tz>(&self, stem: &str, created: &DateTime<Tz>) -> PathBuf
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        self.root.join(format!(
            "{stem}_{}.csv",
            created.format(LOG_TIMESTAMP_FORMAT)
        ))
    }

    /// Create the root directory.
    /// Returns Ok(true) if it was created, Ok(false) if it already existed.
    pub fn init(&self) -> std::io::Result<bool> {
        let created = !self.root.exists();
        std::fs::create_dir_all(&self.root)?;
        Ok(created)
    }
}

/// `data/` next to the running executable, falling back to `./data`.
pub fn default_root() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("data")))
        .unwrap_or_else(|| PathBuf::from("data"))
}
