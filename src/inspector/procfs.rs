/// Per-process metrics that `sysinfo` does not expose: private (unique)
/// memory and the number of open descriptors.
///
/// Linux reads them from `/proc`; other platforms report 0.
use super::InspectError;

/// Sum of the `Private_Clean` and `Private_Dirty` lines of an smaps file, in bytes.
pub fn parse_private_bytes(smaps: &str) -> u64 {
    smaps
        .lines()
        .filter_map(|line| {
            let rest = line
                .strip_prefix("Private_Clean:")
                .or_else(|| line.strip_prefix("Private_Dirty:"))?;
            let kib: u64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
            Some(kib * 1024)
        })
        .sum()
}

/// Value of the `Tgid:` line of a `/proc/<pid>/status` file.
pub fn parse_tgid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Tgid:"))
        .and_then(|value| value.trim().parse().ok())
}

#[cfg(target_os = "linux")]
fn map_io_error(pid: u32, e: std::io::Error) -> InspectError {
    if e.kind() == std::io::ErrorKind::NotFound {
        InspectError::Vanished { pid }
    } else {
        InspectError::Os {
            pid,
            message: e.to_string(),
        }
    }
}

#[cfg(target_os = "linux")]
pub fn private_bytes(pid: u32) -> Result<u64, InspectError> {
    let proc_dir = std::path::PathBuf::from(format!("/proc/{pid}"));
    let contents = match std::fs::read_to_string(proc_dir.join("smaps_rollup")) {
        Ok(contents) => contents,
        // Kernels before 4.14 only have the per-mapping file.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && proc_dir.exists() => {
            std::fs::read_to_string(proc_dir.join("smaps")).map_err(|e| map_io_error(pid, e))?
        }
        Err(e) => return Err(map_io_error(pid, e)),
    };
    Ok(parse_private_bytes(&contents))
}

#[cfg(target_os = "linux")]
pub fn open_handles(pid: u32) -> Result<u64, InspectError> {
    let entries = std::fs::read_dir(format!("/proc/{pid}/fd")).map_err(|e| map_io_error(pid, e))?;
    Ok(entries.filter(|entry| entry.is_ok()).count() as u64)
}

/// Whether `pid` names a thread rather than a thread-group leader. Threads
/// have their own `/proc/<tid>` entries and must not be sampled as processes.
#[cfg(target_os = "linux")]
pub fn is_thread(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/status"))
        .ok()
        .and_then(|status| parse_tgid(&status))
        .is_some_and(|tgid| tgid != pid)
}

#[cfg(not(target_os = "linux"))]
pub fn is_thread(_pid: u32) -> bool {
    false
}

#[cfg(not(target_os = "linux"))]
pub fn private_bytes(_pid: u32) -> Result<u64, InspectError> {
    Ok(0)
}

#[cfg(not(target_os = "linux"))]
pub fn open_handles(_pid: u32) -> Result<u64, InspectError> {
    Ok(0)
}
