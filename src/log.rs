//! Sample log: a CSV file per run, rewritten on every append.

use crate::data_dir::DataDir;
use crate::request::LaunchRequest;
use crate::sample::Sample;
use chrono::Local;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from reading or writing a sample log.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("I/O error on log {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed log {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Durable destination for samples of one run.
pub trait LogSink {
    fn append(&mut self, sample: &Sample) -> Result<(), LogError>;

    /// Human-readable location, for console output.
    fn location(&self) -> String;
}

/// Creates a fresh sink for each launch request.
pub trait LogStore {
    type Sink: LogSink;

    fn create(&mut self, request: &LaunchRequest) -> Result<Self::Sink, LogError>;
}

/// A CSV sample log.
///
/// Appending reads every existing row, adds the new one and rewrites the
/// file through a temp file in the same directory, so readers never see a
/// half-written log. There must be a single writer per file.
#[derive(Debug, Clone)]
pub struct CsvLog {
    path: PathBuf,
}

impl CsvLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All rows currently in the log; empty if the file does not exist.
    pub fn read_rows(&self) -> Result<Vec<Sample>, LogError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path).map_err(|e| self.csv_error(e))?;
        reader
            .deserialize()
            .collect::<Result<Vec<Sample>, _>>()
            .map_err(|e| self.csv_error(e))
    }

    fn csv_error(&self, source: csv::Error) -> LogError {
        LogError::Csv {
            path: self.path.clone(),
            source,
        }
    }

    fn io_error(&self, source: std::io::Error) -> LogError {
        LogError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn write_rows(&self, rows: &[Sample]) -> Result<(), LogError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| self.io_error(e))?;
        {
            let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
            for row in rows {
                writer.serialize(row).map_err(|e| self.csv_error(e))?;
            }
            writer.flush().map_err(|e| self.io_error(e))?;
        }
        tmp.persist(&self.path).map_err(|e| self.io_error(e.error))?;
        Ok(())
    }
}

impl LogSink for CsvLog {
    fn append(&mut self, sample: &Sample) -> Result<(), LogError> {
        let mut rows = self.read_rows()?;
        rows.push(sample.clone());
        self.write_rows(&rows)?;
        tracing::debug!(
            path = %self.path.display(),
            rows = rows.len(),
            run_time = sample.run_time_secs,
            "sample appended"
        );
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Creates one timestamped CSV log per launch request under the data directory.
#[derive(Debug, Clone)]
pub struct CsvLogStore {
    data_dir: DataDir,
}

impl CsvLogStore {
    pub fn new(data_dir: DataDir) -> Self {
        Self { data_dir }
    }

    /// Claim a file name that no earlier run used, adding `-N` when two runs
    /// start within the same second.
    fn reserve(&self, request: &LaunchRequest) -> Result<PathBuf, LogError> {
        let base = self.data_dir.log_file(&request.log_stem(), &Local::now());
        let mut candidate = base.clone();
        for n in 1u32.. {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(_) => return Ok(candidate),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let stem = base
                        .file_stem()
                        .map(|s| s.to_string_lossy().to_string())
                        .unwrap_or_default();
                    candidate = base.with_file_name(format!("{stem}-{n}.csv"));
                }
                Err(e) => {
                    return Err(LogError::Io {
                        path: candidate,
                        source: e,
                    })
                }
            }
        }
        Err(LogError::Io {
            path: base,
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "no free log file name",
            ),
        })
    }
}

impl LogStore for CsvLogStore {
    type Sink = CsvLog;

    fn create(&mut self, request: &LaunchRequest) -> Result<CsvLog, LogError> {
        self.data_dir.init().map_err(|e| LogError::Io {
            path: self.data_dir.root().to_path_buf(),
            source: e,
        })?;
        let path = self.reserve(request)?;
        tracing::info!(path = %path.display(), "sample log created");
        Ok(CsvLog::new(path))
    }
}
