/// Name-based lookup over the OS process table.
use crate::inspector::{ProcessInfo, ProcessInspector};

/// A process the sampling loop owns for the current run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedProcess {
    pub pid: u32,
    pub name: String,
}

impl From<ProcessInfo> for TrackedProcess {
    fn from(info: ProcessInfo) -> Self {
        Self {
            pid: info.pid,
            name: info.name,
        }
    }
}

/// True if the process's short name or executable file name equals `name`,
/// ignoring case. The executable path is checked as well because some
/// platforms truncate the short name.
fn matches_name(info: &ProcessInfo, name: &str) -> bool {
    let wanted = name.to_lowercase();
    if info.name.to_lowercase() == wanted {
        return true;
    }
    info.exe
        .as_deref()
        .and_then(|exe| exe.file_name())
        .is_some_and(|file| file.to_string_lossy().to_lowercase() == wanted)
}

/// Every live process matching `name`, lowest PID first.
pub fn find_all<I: ProcessInspector + ?Sized>(inspector: &mut I, name: &str) -> Vec<ProcessInfo> {
    let mut found: Vec<ProcessInfo> = inspector
        .processes()
        .into_iter()
        .filter(|info| matches_name(info, name))
        .collect();
    found.sort_by_key(|info| info.pid);
    tracing::debug!(name, count = found.len(), "process table scanned");
    found
}

/// The first live process matching `name`, if any.
pub fn find_running<I: ProcessInspector + ?Sized>(
    inspector: &mut I,
    name: &str,
) -> Option<ProcessInfo> {
    find_all(inspector, name).into_iter().next()
}
