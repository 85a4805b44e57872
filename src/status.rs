//! `status.json`: a snapshot of the sampling loop for anyone watching the
//! data directory. Replaced as a whole on every state change.

use crate::registry::TrackedProcess;
use crate::request::LaunchRequest;
use crate::sampler::LoopState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("failed to encode status: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to replace {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Contents of `status.json`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// PID of the sampler itself, not of a sampled process.
    pub pid: u32,
    pub state: LoopState,
    pub launch_path: Option<String>,
    pub interval_secs: Option<f64>,
    pub log_file: Option<String>,
    pub tracked_pids: Vec<u32>,
    pub run_time_secs: f64,
    pub samples_written: u64,
    pub restarts: u32,
    pub run_start: Option<DateTime<Utc>>,
    pub last_update: DateTime<Utc>,
}

impl StatusSnapshot {
    fn idle() -> Self {
        Self {
            pid: std::process::id(),
            state: LoopState::Idle,
            launch_path: None,
            interval_secs: None,
            log_file: None,
            tracked_pids: Vec::new(),
            run_time_secs: 0.0,
            samples_written: 0,
            restarts: 0,
            run_start: None,
            last_update: Utc::now(),
        }
    }
}

/// Owns the snapshot and the file it is published to. Publishing never
/// fails the loop; a write error is logged and the next transition retries.
pub struct StatusTracker {
    path: PathBuf,
    snapshot: StatusSnapshot,
}

impl StatusTracker {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            snapshot: StatusSnapshot::idle(),
        }
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> &StatusSnapshot {
        &self.snapshot
    }

    pub fn publish(&mut self, state: LoopState) {
        self.snapshot.state = state;
        self.snapshot.last_update = Utc::now();
        if let Err(e) = self.write() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to publish status");
        }
    }

    /// A sub-run started sampling `tracked` into `log_file`.
    pub fn run_started(
        &mut self,
        request: &LaunchRequest,
        log_file: &str,
        tracked: &[TrackedProcess],
        run_time_secs: f64,
    ) {
        self.snapshot.launch_path = Some(request.executable_path().display().to_string());
        self.snapshot.interval_secs = Some(request.interval());
        self.snapshot.log_file = Some(log_file.to_string());
        self.snapshot.tracked_pids = tracked.iter().map(|p| p.pid).collect();
        self.snapshot.run_time_secs = run_time_secs;
        self.snapshot.run_start = Some(Utc::now());
    }

    pub fn sample_recorded(&mut self, run_time_secs: f64, samples_written: u64) {
        self.snapshot.run_time_secs = run_time_secs;
        self.snapshot.samples_written = samples_written;
    }

    /// Processes of the current sub-run are gone (terminated or vanished).
    pub fn processes_released(&mut self) {
        self.snapshot.tracked_pids.clear();
    }

    pub fn restarted(&mut self, restarts: u32) {
        self.snapshot.restarts = restarts;
        self.processes_released();
    }

    pub fn remove(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove status file")
            }
        }
    }

    fn write(&self) -> Result<(), StatusError> {
        let io_error = |source| StatusError::Io {
            path: self.path.clone(),
            source,
        };
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_error)?;
        serde_json::to_writer_pretty(tmp.as_file_mut(), &self.snapshot)?;
        tmp.persist(&self.path).map_err(|e| io_error(e.error))?;
        Ok(())
    }
}
