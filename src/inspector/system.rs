//! Process inspection backed by `sysinfo`, with `/proc` reads for the
//! metrics it does not cover.

use super::{procfs, InspectError, ProcessInfo, ProcessInspector, ProcessUsage};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use sysinfo::{Pid, Process, ProcessStatus, System};

/// Inspector for the local OS process table.
///
/// A single `System` is kept across calls so CPU usage can be computed
/// between `begin_round` and `measure`. Children spawned through `launch`
/// are reaped on every call so they do not linger as zombies once they exit.
pub struct SystemInspector {
    system: System,
    children: Vec<Child>,
}

impl SystemInspector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            children: Vec::new(),
        }
    }

    fn reap_children(&mut self) {
        self.children.retain_mut(|child| match child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(pid = child.id(), %status, "launched process exited");
                false
            }
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(pid = child.id(), error = %e, "failed to poll launched process");
                false
            }
        });
    }

    /// Refresh one process and return it, treating zombies as gone.
    fn refresh(&mut self, pid: u32) -> Result<&Process, InspectError> {
        self.reap_children();
        let sys_pid = Pid::from_u32(pid);
        self.system.refresh_cpu();
        if !self.system.refresh_process(sys_pid) {
            return Err(InspectError::Vanished { pid });
        }
        match self.system.process(sys_pid) {
            Some(process) if is_alive(process) => Ok(process),
            _ => Err(InspectError::Vanished { pid }),
        }
    }
}

impl Default for SystemInspector {
    fn default() -> Self {
        Self::new()
    }
}

fn is_alive(process: &Process) -> bool {
    !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead)
}

impl ProcessInspector for SystemInspector {
    fn processes(&mut self) -> Vec<ProcessInfo> {
        self.reap_children();
        self.system.refresh_processes();
        self.system
            .processes()
            .iter()
            .filter(|(pid, process)| is_alive(process) && !procfs::is_thread(pid.as_u32()))
            .map(|(pid, process)| ProcessInfo {
                pid: pid.as_u32(),
                name: process.name().to_string(),
                exe: process.exe().map(Path::to_path_buf),
            })
            .collect()
    }

    /// The child gets its own process group so a Ctrl-C aimed at the
    /// sampler does not also reach the sampled program.
    fn launch(&mut self, path: &Path) -> std::io::Result<u32> {
        let mut command = Command::new(path);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let child = command.spawn()?;
        let pid = child.id();
        tracing::info!(pid, path = %path.display(), "process spawned");
        self.children.push(child);
        Ok(pid)
    }

    fn begin_round(&mut self, pid: u32) -> Result<(), InspectError> {
        self.refresh(pid).map(|_| ())
    }

    fn measure(&mut self, pid: u32) -> Result<ProcessUsage, InspectError> {
        let (cpu_percent, working_set_bytes) = {
            let process = self.refresh(pid)?;
            (f64::from(process.cpu_usage()), process.memory())
        };
        let private_bytes = procfs::private_bytes(pid)?;
        let open_handles = procfs::open_handles(pid)?;

        Ok(ProcessUsage {
            cpu_percent,
            working_set_bytes,
            private_bytes,
            open_handles,
        })
    }

    #[cfg(unix)]
    fn terminate(&mut self, pid: u32) -> Result<(), InspectError> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};

        if let Ok(process) = self.refresh(pid) {
            tracing::debug!(pid, name = process.name(), "sending SIGKILL");
        }
        let raw = i32::try_from(pid).map_err(|_| InspectError::Os {
            pid,
            message: "pid out of range".to_string(),
        })?;
        let result = match kill(nix::unistd::Pid::from_raw(raw), Signal::SIGKILL) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => Err(InspectError::Vanished { pid }),
            Err(e) => Err(InspectError::Os {
                pid,
                message: e.to_string(),
            }),
        };
        self.reap_children();
        result
    }

    #[cfg(not(unix))]
    fn terminate(&mut self, pid: u32) -> Result<(), InspectError> {
        let process = self.refresh(pid)?;
        if process.kill() {
            Ok(())
        } else {
            Err(InspectError::Os {
                pid,
                message: "kill request was refused".to_string(),
            })
        }
    }
}
