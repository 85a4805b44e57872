/// Starting the executable and discovering the processes it produces.
use crate::inspector::ProcessInspector;
use crate::registry::{self, TrackedProcess};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when starting an executable.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The OS refused to execute the file.
    #[error("permission denied: cannot launch '{}'", path.display())]
    PermissionDenied { path: PathBuf },
    #[error("failed to launch '{}': {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Start the executable at `path`. Failures are not retried.
pub fn launch<I: ProcessInspector + ?Sized>(inspector: &mut I, path: &Path) -> Result<u32, LaunchError> {
    match inspector.launch(path) {
        Ok(pid) => Ok(pid),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            tracing::warn!(path = %path.display(), "launch denied by the OS");
            Err(LaunchError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(e) => Err(LaunchError::Spawn {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Collect every process named `name` after a launch.
///
/// One executable may start several processes sharing its name (a stub
/// plus workers), so all matches are tracked. A freshly spawned process can
/// take a moment to show up in the table; the scan is repeated up to
/// `attempts` times, `delay` apart, until something matches.
pub async fn discover<I: ProcessInspector + ?Sized>(
    inspector: &mut I,
    name: &str,
    attempts: u32,
    delay: Duration,
) -> Vec<TrackedProcess> {
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        let found = registry::find_all(inspector, name);
        if !found.is_empty() {
            let tracked: Vec<TrackedProcess> = found.into_iter().map(TrackedProcess::from).collect();
            tracing::info!(
                name,
                pids = ?tracked.iter().map(|p| p.pid).collect::<Vec<_>>(),
                attempt,
                "tracking processes"
            );
            return tracked;
        }
        if attempt < attempts {
            tracing::debug!(name, attempt, "launched process not visible yet");
            tokio::time::sleep(delay).await;
        }
    }
    Vec::new()
}
