pub mod procfs;
pub mod system;

#[cfg(test)]
pub mod fake;

use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use system::SystemInspector;

/// One entry of the OS process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    /// Short process name as reported by the OS.
    pub name: String,
    /// Full executable path, when the OS exposes it.
    pub exe: Option<PathBuf>,
}

/// Resource usage of one process over a measurement window, or the sum over several.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProcessUsage {
    /// CPU usage in percent of one core; exceeds 100 on multi-core load.
    pub cpu_percent: f64,
    pub working_set_bytes: u64,
    pub private_bytes: u64,
    pub open_handles: u64,
}

impl AddAssign for ProcessUsage {
    fn add_assign(&mut self, other: Self) {
        self.cpu_percent += other.cpu_percent;
        self.working_set_bytes += other.working_set_bytes;
        self.private_bytes += other.private_bytes;
        self.open_handles += other.open_handles;
    }
}

/// Errors produced by inspector operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InspectError {
    /// The process exited; its handle is no longer valid.
    #[error("process no longer exists (pid={pid})")]
    Vanished { pid: u32 },
    #[error("failed to inspect process {pid}: {message}")]
    Os { pid: u32, message: String },
}

/// Capability interface over the OS process APIs.
///
/// Sampling a process takes two calls: `begin_round` marks the start of a
/// CPU measurement window and `measure` closes it and reads every metric.
pub trait ProcessInspector {
    /// Snapshot of the live process table. Processes that exit while the
    /// table is being read are simply absent.
    fn processes(&mut self) -> Vec<ProcessInfo>;

    /// Start the executable at `path`, returning the PID of the spawned process.
    fn launch(&mut self, path: &Path) -> std::io::Result<u32>;

    fn begin_round(&mut self, pid: u32) -> Result<(), InspectError>;

    fn measure(&mut self, pid: u32) -> Result<ProcessUsage, InspectError>;

    /// Forcibly stop the process. Returns `Vanished` if it had already exited.
    fn terminate(&mut self, pid: u32) -> Result<(), InspectError>;
}
