use crate::inspector::ProcessUsage;
use crate::request::LaunchRequest;
use serde::{Deserialize, Serialize};

/// Column titles of the sample log, in order.
pub const HEADER: [&str; 6] = [
    "Process Path",
    "Run Time (s)",
    "CPU Usage (%)",
    "Memory Consumption: Working Set (bytes)",
    "Memory Consumption: Private Bytes (bytes)",
    "Number of Open Handles",
];

/// One aggregated measurement across all tracked processes, i.e. one log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(rename = "Process Path")]
    pub launch_path: String,
    #[serde(rename = "Run Time (s)")]
    pub run_time_secs: f64,
    #[serde(rename = "CPU Usage (%)")]
    pub cpu_percent: f64,
    #[serde(rename = "Memory Consumption: Working Set (bytes)")]
    pub working_set_bytes: u64,
    #[serde(rename = "Memory Consumption: Private Bytes (bytes)")]
    pub private_bytes: u64,
    #[serde(rename = "Number of Open Handles")]
    pub open_handles: u64,
}

impl Sample {
    /// The zero-valued row written when a log is started.
    pub fn baseline(request: &LaunchRequest) -> Self {
        Self::from_usage(request, 0.0, ProcessUsage::default())
    }

    pub fn from_usage(request: &LaunchRequest, run_time_secs: f64, usage: ProcessUsage) -> Self {
        Self {
            launch_path: request.executable_path().display().to_string(),
            run_time_secs,
            cpu_percent: usage.cpu_percent,
            working_set_bytes: usage.working_set_bytes,
            private_bytes: usage.private_bytes,
            open_handles: usage.open_handles,
        }
    }
}
