/// One sampling round: aggregate resource usage across every tracked process.
use crate::inspector::{InspectError, ProcessInspector, ProcessUsage};
use crate::registry::TrackedProcess;
use std::time::Duration;
use thiserror::Error;

/// Errors that void a sampling round.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollectError {
    /// A tracked process exited before the round finished.
    #[error("The process '{name}' (PID: {pid}) is no longer running")]
    Vanished { pid: u32, name: String },
    #[error(transparent)]
    Inspect(InspectError),
}

impl CollectError {
    fn from_inspect(err: InspectError, tracked: &[TrackedProcess]) -> Self {
        match err {
            InspectError::Vanished { pid } => CollectError::Vanished {
                pid,
                name: tracked
                    .iter()
                    .find(|p| p.pid == pid)
                    .map(|p| p.name.clone())
                    .unwrap_or_default(),
            },
            other => CollectError::Inspect(other),
        }
    }
}

/// Measure every tracked process over one shared `interval` window and sum the results.
///
/// The wait inside the window is what paces the sampling loop. If any
/// process fails the whole round fails; no partial totals are returned.
pub async fn collect<I: ProcessInspector + ?Sized>(
    inspector: &mut I,
    tracked: &[TrackedProcess],
    interval: Duration,
) -> Result<ProcessUsage, CollectError> {
    for process in tracked {
        inspector
            .begin_round(process.pid)
            .map_err(|e| CollectError::from_inspect(e, tracked))?;
    }

    tokio::time::sleep(interval).await;

    let mut total = ProcessUsage::default();
    for process in tracked {
        let usage = inspector
            .measure(process.pid)
            .map_err(|e| CollectError::from_inspect(e, tracked))?;
        tracing::trace!(pid = process.pid, ?usage, "process measured");
        total += usage;
    }
    Ok(total)
}
