//! Scripted inspector for tests: a process table, launch outcomes,
//! per-process usage and vanish events, with a record of every call.

use super::{InspectError, ProcessInfo, ProcessInspector, ProcessUsage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct FakeInspector {
    table: Vec<ProcessInfo>,
    spawns: HashMap<PathBuf, Vec<ProcessInfo>>,
    deny_launch: bool,
    usage: HashMap<u32, ProcessUsage>,
    /// pid -> 1-based `measure` call on which the process dies.
    vanish_on_measure: HashMap<u32, usize>,
    measure_calls: HashMap<u32, usize>,
    pub launched: Vec<PathBuf>,
    pub terminated: Vec<u32>,
    pub begin_round_calls: usize,
}

fn info(pid: u32, name: &str) -> ProcessInfo {
    ProcessInfo {
        pid,
        name: name.to_string(),
        exe: None,
    }
}

impl FakeInspector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A process that is already running.
    pub fn with_running(mut self, pid: u32, name: &str) -> Self {
        self.table.push(info(pid, name));
        self
    }

    /// Processes that appear when `path` is launched.
    pub fn on_launch(mut self, path: impl Into<PathBuf>, spawned: &[(u32, &str)]) -> Self {
        self.spawns.insert(
            path.into(),
            spawned.iter().map(|(pid, name)| info(*pid, name)).collect(),
        );
        self
    }

    pub fn deny_launch(mut self) -> Self {
        self.deny_launch = true;
        self
    }

    pub fn with_usage(mut self, pid: u32, usage: ProcessUsage) -> Self {
        self.usage.insert(pid, usage);
        self
    }

    /// Kill `pid` during its `call`-th measurement.
    pub fn vanish_on_measure(mut self, pid: u32, call: usize) -> Self {
        self.vanish_on_measure.insert(pid, call);
        self
    }

    pub fn is_alive(&self, pid: u32) -> bool {
        self.table.iter().any(|p| p.pid == pid)
    }

    fn remove(&mut self, pid: u32) -> bool {
        let before = self.table.len();
        self.table.retain(|p| p.pid != pid);
        self.table.len() != before
    }
}

impl ProcessInspector for FakeInspector {
    fn processes(&mut self) -> Vec<ProcessInfo> {
        self.table.clone()
    }

    fn launch(&mut self, path: &Path) -> std::io::Result<u32> {
        if self.deny_launch {
            return Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        }
        self.launched.push(path.to_path_buf());
        let spawned = self.spawns.get(path).cloned().unwrap_or_default();
        let first = spawned.first().map(|p| p.pid).unwrap_or(0);
        for process in spawned {
            if !self.is_alive(process.pid) {
                self.table.push(process);
            }
        }
        Ok(first)
    }

    fn begin_round(&mut self, pid: u32) -> Result<(), InspectError> {
        self.begin_round_calls += 1;
        if self.is_alive(pid) {
            Ok(())
        } else {
            Err(InspectError::Vanished { pid })
        }
    }

    fn measure(&mut self, pid: u32) -> Result<ProcessUsage, InspectError> {
        let calls = {
            let counter = self.measure_calls.entry(pid).or_insert(0);
            *counter += 1;
            *counter
        };
        if self.vanish_on_measure.get(&pid) == Some(&calls) {
            self.remove(pid);
        }
        if !self.is_alive(pid) {
            return Err(InspectError::Vanished { pid });
        }
        Ok(self.usage.get(&pid).copied().unwrap_or_default())
    }

    fn terminate(&mut self, pid: u32) -> Result<(), InspectError> {
        if self.remove(pid) {
            self.terminated.push(pid);
            Ok(())
        } else {
            Err(InspectError::Vanished { pid })
        }
    }
}
