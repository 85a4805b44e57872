//! The sampling loop: launch, sample on an interval, recover or stop.
//!
//! ```text
//! Idle ──► Running ──► Stopping ──► Terminated
//!  ▲          │
//!  └─ yes ─ Recovering ─ no ─► Stopping
//! ```
//!
//! Each pass through `Idle` is a sub-run with its own log and its own set of
//! tracked processes. Restarts are loop transitions, never recursion.

use crate::collector::{self, CollectError};
use crate::config::MonitorConfig;
use crate::inspector::{InspectError, ProcessInspector};
use crate::launcher;
use crate::log::{LogError, LogSink, LogStore};
use crate::operator::{Operator, OperatorError};
use crate::registry::{self, TrackedProcess};
use crate::request::LaunchRequest;
use crate::sample::Sample;
use crate::signals::{StopReason, StopSignal};
use crate::status::StatusTracker;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Running,
    Recovering,
    Stopping,
    Terminated,
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoopState::Idle => "idle",
            LoopState::Running => "running",
            LoopState::Recovering => "recovering",
            LoopState::Stopping => "stopping",
            LoopState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Loop tunables, resolved from `MonitorConfig`.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerOptions {
    pub carry_run_time: bool,
    pub max_samples: Option<u64>,
    pub write_baseline_row: bool,
    pub discovery_attempts: u32,
    pub discovery_delay: Duration,
}

impl From<&MonitorConfig> for SamplerOptions {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            carry_run_time: config.sampling.carry_run_time,
            max_samples: config.sampling.max_samples,
            write_baseline_row: config.log.write_baseline_row,
            discovery_attempts: config.launch.discovery_attempts,
            discovery_delay: Duration::from_millis(config.launch.discovery_delay_ms),
        }
    }
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self::from(&MonitorConfig::default())
    }
}

/// How the loop came to an end without an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RunOutcome {
    /// Escape, SIGINT, STOP file, or Escape typed at a prompt.
    #[default]
    Cancelled,
    /// The operator chose not to restart after a process vanished.
    Declined,
    /// A process with the requested name was already running; nothing was launched.
    AlreadyRunning { pid: u32, name: String },
    LaunchFailed,
    /// The launch succeeded but no process with the expected name showed up.
    NothingTracked,
    /// `max_samples` was reached.
    SampleLimit,
    /// A repeated interrupt abandoned the round in progress.
    Interrupted,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Collected samples across all sub-runs. Baseline rows are not counted.
    pub samples_written: u64,
    pub restarts: u32,
    pub outcome: RunOutcome,
}

#[derive(Debug, Error)]
pub enum SamplerError {
    #[error(transparent)]
    Operator(#[from] OperatorError),
    #[error(transparent)]
    Log(#[from] LogError),
    #[error(transparent)]
    Collect(#[from] CollectError),
}

/// State of the current sub-run.
struct ActiveRun<S> {
    request: LaunchRequest,
    sink: S,
    tracked: Vec<TrackedProcess>,
    /// Run time the sub-run started from (non-zero only with `carry_run_time`).
    base_run_time: f64,
    samples: u64,
}

impl<S> ActiveRun<S> {
    /// Derived from the sample count so repeated intervals do not accumulate
    /// floating-point drift.
    fn run_time(&self) -> f64 {
        self.base_run_time + self.samples as f64 * self.request.interval()
    }
}

pub struct SamplingLoop<I, O, L: LogStore> {
    inspector: I,
    operator: O,
    logs: L,
    stop: StopSignal,
    options: SamplerOptions,
    status: Option<StatusTracker>,
    run: Option<ActiveRun<L::Sink>>,
    carried_run_time: f64,
    recover_reason: Option<String>,
    summary: RunSummary,
}

impl<I, O, L> SamplingLoop<I, O, L>
where
    I: ProcessInspector,
    O: Operator,
    L: LogStore,
{
    pub fn new(inspector: I, operator: O, logs: L, stop: StopSignal, options: SamplerOptions) -> Self {
        Self {
            inspector,
            operator,
            logs,
            stop,
            options,
            status: None,
            run: None,
            carried_run_time: 0.0,
            recover_reason: None,
            summary: RunSummary::default(),
        }
    }

    /// Publish every state transition to a status file.
    pub fn with_status(mut self, status: StatusTracker) -> Self {
        self.status = Some(status);
        self
    }

    pub fn inspector(&self) -> &I {
        &self.inspector
    }

    pub fn operator(&self) -> &O {
        &self.operator
    }

    /// Drive the loop until it terminates.
    ///
    /// Errors recorded on the way (log writes, inspection failures, a closed
    /// console while idle) still pass through `Stopping`, so every tracked
    /// process is terminated before the error is returned. A forced stop
    /// abandons the round in progress instead of waiting for it.
    pub async fn run(&mut self) -> Result<RunSummary, SamplerError> {
        let mut state = LoopState::Idle;
        let mut failure: Option<SamplerError> = None;

        while state != LoopState::Terminated {
            self.publish(state);
            let step = match state {
                LoopState::Idle => self.idle().await,
                LoopState::Running => {
                    let stop = self.stop.clone();
                    let step = tokio::select! {
                        step = self.running() => Some(step),
                        () = stop.forced() => None,
                    };
                    step.unwrap_or_else(|| Ok(self.interrupted()))
                }
                LoopState::Recovering => self.recovering(),
                LoopState::Stopping => Ok(self.stopping()),
                LoopState::Terminated => Ok(LoopState::Terminated),
            };
            let next = match step {
                Ok(next) => next,
                Err(e) => {
                    tracing::error!(state = %state, error = %e, "sampling loop failed");
                    failure = Some(e);
                    LoopState::Stopping
                }
            };
            if next != state {
                tracing::debug!(from = %state, to = %next, "state transition");
            }
            state = next;
        }

        self.publish(LoopState::Terminated);
        if let Some(status) = &self.status {
            status.remove();
        }

        match failure {
            Some(e) => Err(e),
            None => {
                tracing::info!(
                    samples = self.summary.samples_written,
                    restarts = self.summary.restarts,
                    outcome = ?self.summary.outcome,
                    "sampling finished"
                );
                Ok(self.summary.clone())
            }
        }
    }

    async fn idle(&mut self) -> Result<LoopState, SamplerError> {
        if self.stop_requested() {
            return Ok(LoopState::Terminated);
        }

        let request = match self.operator.request_launch() {
            Ok(request) => request,
            Err(OperatorError::Cancelled) => {
                self.summary.outcome = RunOutcome::Cancelled;
                return Ok(LoopState::Terminated);
            }
            Err(e) => return Err(e.into()),
        };
        let name = request.process_name();

        if let Some(existing) = registry::find_running(&mut self.inspector, &name) {
            tracing::warn!(pid = existing.pid, name = %existing.name, "process already running");
            self.operator.notify(&format!(
                "The process '{}' (PID: {}) has already been launched. Close the process and try again.",
                existing.name, existing.pid
            ));
            self.summary.outcome = RunOutcome::AlreadyRunning {
                pid: existing.pid,
                name: existing.name,
            };
            return Ok(LoopState::Terminated);
        }

        let mut sink = self.logs.create(&request)?;
        if self.options.write_baseline_row {
            sink.append(&Sample::baseline(&request))?;
        }

        let path = request.executable_path();
        let pid = match launcher::launch(&mut self.inspector, path) {
            Ok(pid) => pid,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "launch failed");
                self.operator.notify(&format!("Failed to launch the process: {e}"));
                self.summary.outcome = RunOutcome::LaunchFailed;
                return Ok(LoopState::Terminated);
            }
        };
        tracing::info!(path = %path.display(), pid, interval = request.interval(), "process launched");
        self.operator.notify(&format!(
            "The process '{}' has been successfully launched",
            path.display()
        ));

        let tracked = launcher::discover(
            &mut self.inspector,
            &name,
            self.options.discovery_attempts,
            self.options.discovery_delay,
        )
        .await;
        if tracked.is_empty() {
            tracing::warn!(name = %name, pid, "no process found after launch");
            self.operator.notify(&format!(
                "No running process named '{name}' was found after launch."
            ));
            if pid != 0 {
                self.terminate(pid, &name);
            }
            self.summary.outcome = RunOutcome::NothingTracked;
            return Ok(LoopState::Terminated);
        }

        self.operator
            .notify(&format!("Logging samples to {}", sink.location()));

        let base_run_time = if self.options.carry_run_time {
            self.carried_run_time
        } else {
            0.0
        };
        let run = ActiveRun {
            request,
            sink,
            tracked,
            base_run_time,
            samples: 0,
        };
        if let Some(status) = &mut self.status {
            status.run_started(&run.request, &run.sink.location(), &run.tracked, run.run_time());
        }
        self.run = Some(run);
        Ok(LoopState::Running)
    }

    async fn running(&mut self) -> Result<LoopState, SamplerError> {
        if self.stop_requested() {
            return Ok(LoopState::Stopping);
        }
        let Some(run) = self.run.as_mut() else {
            return Ok(LoopState::Idle);
        };
        if let Some(max) = self.options.max_samples {
            if run.samples >= max {
                tracing::info!(max, "sample limit reached");
                self.summary.outcome = RunOutcome::SampleLimit;
                return Ok(LoopState::Stopping);
            }
        }

        let interval = run.request.interval_duration();
        match collector::collect(&mut self.inspector, &run.tracked, interval).await {
            Ok(usage) => {
                run.samples += 1;
                let sample = Sample::from_usage(&run.request, run.run_time(), usage);
                run.sink.append(&sample)?;
                self.summary.samples_written += 1;
                tracing::debug!(
                    run_time = sample.run_time_secs,
                    cpu = sample.cpu_percent,
                    working_set = sample.working_set_bytes,
                    "sample recorded"
                );
                if let Some(status) = &mut self.status {
                    status.sample_recorded(run.run_time(), self.summary.samples_written);
                }
                Ok(LoopState::Running)
            }
            Err(e @ CollectError::Vanished { pid, .. }) => {
                tracing::warn!(pid, error = %e, "tracked process vanished");
                run.tracked.retain(|p| p.pid != pid);
                self.recover_reason = Some(e.to_string());
                Ok(LoopState::Recovering)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn recovering(&mut self) -> Result<LoopState, SamplerError> {
        let reason = self.recover_reason.take().unwrap_or_default();
        let restart = match self.operator.confirm_continue(&reason) {
            Ok(answer) => answer,
            Err(OperatorError::Closed | OperatorError::Cancelled) => false,
            Err(e) => return Err(e.into()),
        };

        if !restart {
            self.summary.outcome = RunOutcome::Declined;
            return Ok(LoopState::Stopping);
        }

        if let Some(run) = self.run.take() {
            self.carried_run_time = run.run_time();
            self.terminate_all(&run.tracked);
        }
        self.summary.restarts += 1;
        if let Some(status) = &mut self.status {
            status.restarted(self.summary.restarts);
        }
        tracing::info!(restarts = self.summary.restarts, "restarting");
        Ok(LoopState::Idle)
    }

    fn stopping(&mut self) -> LoopState {
        if let Some(run) = self.run.take() {
            self.terminate_all(&run.tracked);
        }
        if let Some(status) = &mut self.status {
            status.processes_released();
        }
        LoopState::Terminated
    }

    fn interrupted(&mut self) -> LoopState {
        tracing::warn!("sampling round abandoned");
        self.summary.outcome = RunOutcome::Interrupted;
        LoopState::Stopping
    }

    /// Best effort: processes that already exited are skipped.
    fn terminate_all(&mut self, tracked: &[TrackedProcess]) {
        for process in tracked {
            self.terminate(process.pid, &process.name);
        }
    }

    fn terminate(&mut self, pid: u32, name: &str) {
        match self.inspector.terminate(pid) {
            Ok(()) => tracing::info!(pid, name, "process terminated"),
            Err(InspectError::Vanished { .. }) => {}
            Err(e) => tracing::warn!(pid, name, error = %e, "failed to terminate process"),
        }
    }

    fn stop_requested(&mut self) -> bool {
        match self.stop.requested() {
            Some(reason) => {
                self.summary.outcome = match &reason {
                    StopReason::Cancelled => {
                        tracing::info!("stop requested");
                        RunOutcome::Cancelled
                    }
                    StopReason::Forced => RunOutcome::Interrupted,
                    StopReason::StopFile(path) => {
                        tracing::info!(path = %path.display(), "STOP file detected");
                        RunOutcome::Cancelled
                    }
                };
                true
            }
            None => false,
        }
    }

    fn publish(&mut self, state: LoopState) {
        if let Some(status) = &mut self.status {
            status.publish(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::fake::FakeInspector;
    use crate::inspector::ProcessUsage;
    use crate::log::memory::MemoryLogStore;
    use crate::operator::scripted::ScriptedOperator;
    use crate::signals::CancelFlag;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    const APP: &str = "/bin/app.exe";

    type Loop = SamplingLoop<FakeInspector, ScriptedOperator, MemoryLogStore>;

    fn options() -> SamplerOptions {
        SamplerOptions {
            carry_run_time: false,
            max_samples: None,
            write_baseline_row: false,
            discovery_attempts: 1,
            discovery_delay: Duration::from_millis(10),
        }
    }

    fn usage(cpu: f64) -> ProcessUsage {
        ProcessUsage {
            cpu_percent: cpu,
            working_set_bytes: 4096,
            private_bytes: 2048,
            open_handles: 3,
        }
    }

    fn app_inspector() -> FakeInspector {
        FakeInspector::new()
            .with_running(1, "init")
            .on_launch(APP, &[(100, "app.exe")])
            .with_usage(100, usage(12.5))
    }

    /// Logs that raise `flag` once log `index` holds `rows` rows.
    fn cancel_at(flag: &CancelFlag, index: usize, rows: usize) -> MemoryLogStore {
        let flag = flag.clone();
        let counts = Arc::new(Mutex::new(Vec::<usize>::new()));
        MemoryLogStore::new().with_hook(move |log, _sample| {
            let mut counts = counts.lock().unwrap();
            if counts.len() <= log {
                counts.resize(log + 1, 0);
            }
            counts[log] += 1;
            if log == index && counts[log] == rows {
                flag.cancel();
            }
        })
    }

    fn run_times(logs: &MemoryLogStore, index: usize) -> Vec<f64> {
        logs.snapshot()[index]
            .iter()
            .map(|s| s.run_time_secs)
            .collect()
    }

    fn sampler(
        inspector: FakeInspector,
        operator: ScriptedOperator,
        logs: MemoryLogStore,
        flag: &CancelFlag,
        options: SamplerOptions,
    ) -> Loop {
        SamplingLoop::new(
            inspector,
            operator,
            logs,
            StopSignal::new(flag.clone()),
            options,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_round_appends_one_sample() {
        let flag = CancelFlag::new();
        let logs = cancel_at(&flag, 0, 1);
        let mut sampler = sampler(
            app_inspector(),
            ScriptedOperator::new().request(APP, 2.0),
            logs.clone(),
            &flag,
            options(),
        );

        let summary = sampler.run().await.unwrap();
        assert_eq!(summary.samples_written, 1);
        assert_eq!(summary.outcome, RunOutcome::Cancelled);

        let rows = &logs.snapshot()[0];
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].launch_path, APP);
        assert_eq!(rows[0].run_time_secs, 2.0);
        assert_eq!(rows[0].cpu_percent, 12.5);
        assert_eq!(rows[0].open_handles, 3);

        assert_eq!(sampler.inspector().launched, vec![PathBuf::from(APP)]);
        assert!(sampler
            .operator()
            .noticed("The process '/bin/app.exe' has been successfully launched"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_vanish_then_decline_keeps_one_sample() {
        let flag = CancelFlag::new();
        let logs = MemoryLogStore::new();
        let inspector = app_inspector().vanish_on_measure(100, 2);
        let mut sampler = sampler(
            inspector,
            ScriptedOperator::new().request(APP, 2.0).answer(false),
            logs.clone(),
            &flag,
            options(),
        );

        let summary = sampler.run().await.unwrap();
        assert_eq!(summary.outcome, RunOutcome::Declined);
        assert_eq!(summary.restarts, 0);
        assert_eq!(run_times(&logs, 0), vec![2.0]);

        let questions = &sampler.operator().questions;
        assert_eq!(questions.len(), 1);
        assert!(questions[0].contains("(PID: 100) is no longer running"));
        // The vanished process is not terminated again.
        assert!(sampler.inspector().terminated.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_third_sample() {
        let flag = CancelFlag::new();
        let logs = cancel_at(&flag, 0, 3);
        let mut sampler = sampler(
            app_inspector(),
            ScriptedOperator::new().request(APP, 2.0),
            logs.clone(),
            &flag,
            options(),
        );

        let summary = sampler.run().await.unwrap();
        assert_eq!(summary.outcome, RunOutcome::Cancelled);
        assert_eq!(run_times(&logs, 0), vec![2.0, 4.0, 6.0]);
        // A fourth round was never started.
        assert_eq!(sampler.inspector().begin_round_calls, 3);
        assert_eq!(sampler.inspector().terminated, vec![100]);
        assert!(!sampler.inspector().is_alive(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_stop_abandons_round_and_terminates() {
        let flag = CancelFlag::new();
        let logs = MemoryLogStore::new();
        let inspector = FakeInspector::new()
            .on_launch(APP, &[(100, "app.exe"), (101, "app.exe")])
            .with_usage(100, usage(10.0))
            .with_usage(101, usage(5.0));
        let mut sampler = sampler(
            inspector,
            ScriptedOperator::new().request(APP, 10.0),
            logs.clone(),
            &flag,
            options(),
        );

        let forcer = flag.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            forcer.cancel();
            forcer.force();
        });

        let started = tokio::time::Instant::now();
        let summary = sampler.run().await.unwrap();
        assert_eq!(summary.outcome, RunOutcome::Interrupted);
        assert_eq!(summary.samples_written, 0);
        assert!(run_times(&logs, 0).is_empty());
        // The first round was cut short instead of waiting out its 10s.
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(sampler.inspector().terminated, vec![100, 101]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_between_rounds_is_interrupted() {
        let flag = CancelFlag::new();
        let logs = {
            let flag = flag.clone();
            MemoryLogStore::new().with_hook(move |_log, _sample| flag.force())
        };
        let mut sampler = sampler(
            app_inspector(),
            ScriptedOperator::new().request(APP, 2.0),
            logs.clone(),
            &flag,
            options(),
        );

        let summary = sampler.run().await.unwrap();
        assert_eq!(summary.outcome, RunOutcome::Interrupted);
        assert_eq!(run_times(&logs, 0), vec![2.0]);
        assert_eq!(sampler.inspector().terminated, vec![100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_duplicate_is_never_launched() {
        let flag = CancelFlag::new();
        let logs = MemoryLogStore::new();
        let inspector = app_inspector().with_running(55, "app.exe");
        let mut sampler = sampler(
            inspector,
            ScriptedOperator::new().request(APP, 2.0),
            logs.clone(),
            &flag,
            options(),
        );

        let summary = sampler.run().await.unwrap();
        assert_eq!(
            summary.outcome,
            RunOutcome::AlreadyRunning {
                pid: 55,
                name: "app.exe".to_string()
            }
        );
        assert!(sampler.inspector().launched.is_empty());
        assert!(sampler.inspector().terminated.is_empty());
        assert!(logs.snapshot().is_empty());
        assert!(sampler.operator().noticed(
            "The process 'app.exe' (PID: 55) has already been launched. Close the process and try again."
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_stops_before_sampling() {
        let flag = CancelFlag::new();
        let logs = MemoryLogStore::new();
        let mut sampler = sampler(
            app_inspector().deny_launch(),
            ScriptedOperator::new().request(APP, 2.0),
            logs.clone(),
            &flag,
            SamplerOptions {
                write_baseline_row: true,
                ..options()
            },
        );

        let summary = sampler.run().await.unwrap();
        assert_eq!(summary.outcome, RunOutcome::LaunchFailed);
        assert_eq!(summary.samples_written, 0);
        assert_eq!(sampler.inspector().begin_round_calls, 0);
        assert!(sampler.operator().noticed("permission denied"));
        // Only the baseline row.
        assert_eq!(run_times(&logs, 0), vec![0.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_baseline_row_precedes_samples() {
        let flag = CancelFlag::new();
        let logs = cancel_at(&flag, 0, 3);
        let mut sampler = sampler(
            app_inspector(),
            ScriptedOperator::new().request(APP, 2.0),
            logs.clone(),
            &flag,
            SamplerOptions {
                write_baseline_row: true,
                ..options()
            },
        );

        let summary = sampler.run().await.unwrap();
        assert_eq!(summary.samples_written, 2);
        let rows = &logs.snapshot()[0];
        assert_eq!(rows[0], Sample::baseline(&LaunchRequest::unchecked(APP, 2.0)));
        assert_eq!(run_times(&logs, 0), vec![0.0, 2.0, 4.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launched_but_nothing_found() {
        let flag = CancelFlag::new();
        let inspector = FakeInspector::new().on_launch(APP, &[]);
        let mut sampler = sampler(
            inspector,
            ScriptedOperator::new().request(APP, 2.0),
            MemoryLogStore::new(),
            &flag,
            SamplerOptions {
                discovery_attempts: 3,
                ..options()
            },
        );

        let summary = sampler.run().await.unwrap();
        assert_eq!(summary.outcome, RunOutcome::NothingTracked);
        assert!(sampler.operator().noticed("No running process named 'app.exe'"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmatched_launch_is_killed() {
        let flag = CancelFlag::new();
        let inspector = FakeInspector::new().on_launch(APP, &[(200, "launcher.exe")]);
        let mut sampler = sampler(
            inspector,
            ScriptedOperator::new().request(APP, 2.0),
            MemoryLogStore::new(),
            &flag,
            options(),
        );

        let summary = sampler.run().await.unwrap();
        assert_eq!(summary.outcome, RunOutcome::NothingTracked);
        assert_eq!(sampler.inspector().terminated, vec![200]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_resets_run_time() {
        let flag = CancelFlag::new();
        let logs = cancel_at(&flag, 1, 2);
        let inspector = app_inspector().vanish_on_measure(100, 3);
        let mut sampler = sampler(
            inspector,
            ScriptedOperator::new()
                .request(APP, 2.0)
                .answer(true)
                .request(APP, 2.0),
            logs.clone(),
            &flag,
            options(),
        );

        let summary = sampler.run().await.unwrap();
        assert_eq!(summary.restarts, 1);
        assert_eq!(summary.samples_written, 4);
        assert_eq!(run_times(&logs, 0), vec![2.0, 4.0]);
        assert_eq!(run_times(&logs, 1), vec![2.0, 4.0]);
        assert_eq!(sampler.inspector().launched.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_can_carry_run_time() {
        let flag = CancelFlag::new();
        let logs = cancel_at(&flag, 1, 1);
        let inspector = app_inspector().vanish_on_measure(100, 3);
        let mut sampler = sampler(
            inspector,
            ScriptedOperator::new()
                .request(APP, 2.0)
                .answer(true)
                .request(APP, 2.0),
            logs.clone(),
            &flag,
            SamplerOptions {
                carry_run_time: true,
                ..options()
            },
        );

        sampler.run().await.unwrap();
        assert_eq!(run_times(&logs, 0), vec![2.0, 4.0]);
        assert_eq!(run_times(&logs, 1), vec![6.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_terminates_survivors() {
        let flag = CancelFlag::new();
        let logs = cancel_at(&flag, 1, 1);
        let inspector = FakeInspector::new()
            .on_launch(APP, &[(100, "app.exe"), (101, "app.exe")])
            .vanish_on_measure(100, 1);
        let mut sampler = sampler(
            inspector,
            ScriptedOperator::new()
                .request(APP, 1.0)
                .answer(true)
                .request(APP, 1.0),
            logs.clone(),
            &flag,
            options(),
        );

        let summary = sampler.run().await.unwrap();
        assert_eq!(summary.restarts, 1);
        // 101 survived the first run and was killed before the relaunch,
        // so the duplicate check did not trip on it.
        assert_eq!(sampler.inspector().terminated, vec![101, 100, 101]);
        assert!(run_times(&logs, 0).is_empty());
        assert_eq!(run_times(&logs, 1), vec![1.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_n_rounds_accumulate_n_intervals() {
        let flag = CancelFlag::new();
        let logs = MemoryLogStore::new();
        let mut sampler = sampler(
            app_inspector(),
            ScriptedOperator::new().request(APP, 0.5),
            logs.clone(),
            &flag,
            SamplerOptions {
                max_samples: Some(4),
                ..options()
            },
        );

        let started = tokio::time::Instant::now();
        let summary = sampler.run().await.unwrap();
        assert_eq!(summary.outcome, RunOutcome::SampleLimit);
        assert_eq!(run_times(&logs, 0), vec![0.5, 1.0, 1.5, 2.0]);
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(sampler.inspector().terminated, vec![100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_failure_still_terminates() {
        let flag = CancelFlag::new();
        let mut sampler = sampler(
            app_inspector(),
            ScriptedOperator::new().request(APP, 2.0),
            MemoryLogStore::new().failing(),
            &flag,
            options(),
        );

        let err = sampler.run().await.unwrap_err();
        assert!(matches!(err, SamplerError::Log(_)));
        assert_eq!(sampler.inspector().terminated, vec![100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_console_while_idle_is_error() {
        let flag = CancelFlag::new();
        let mut sampler = sampler(
            app_inspector(),
            ScriptedOperator::new(),
            MemoryLogStore::new(),
            &flag,
            options(),
        );

        let err = sampler.run().await.unwrap_err();
        assert!(matches!(err, SamplerError::Operator(OperatorError::Closed)));
        assert!(sampler.inspector().launched.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_console_while_recovering_declines() {
        let flag = CancelFlag::new();
        let mut sampler = sampler(
            app_inspector().vanish_on_measure(100, 1),
            ScriptedOperator::new().request(APP, 2.0),
            MemoryLogStore::new(),
            &flag,
            options(),
        );

        let summary = sampler.run().await.unwrap();
        assert_eq!(summary.outcome, RunOutcome::Declined);
    }

    #[tokio::test(start_paused = true)]
    async fn test_escape_at_prompt_is_cancel() {
        let flag = CancelFlag::new();
        let mut sampler = sampler(
            app_inspector(),
            ScriptedOperator::new().request_error(OperatorError::Cancelled),
            MemoryLogStore::new(),
            &flag,
            options(),
        );

        let summary = sampler.run().await.unwrap();
        assert_eq!(summary.outcome, RunOutcome::Cancelled);
        assert!(sampler.inspector().launched.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_file_before_launch() {
        let dir = tempfile::tempdir().unwrap();
        let stop_file = dir.path().join("STOP");
        std::fs::write(&stop_file, "").unwrap();

        let mut sampler = SamplingLoop::new(
            app_inspector(),
            ScriptedOperator::new().request(APP, 2.0),
            MemoryLogStore::new(),
            StopSignal::new(CancelFlag::new()).with_stop_file(stop_file.clone()),
            options(),
        );

        let summary = sampler.run().await.unwrap();
        assert_eq!(summary.outcome, RunOutcome::Cancelled);
        assert!(sampler.inspector().launched.is_empty());
        assert!(!stop_file.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_file_follows_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let status_path = dir.path().join("status.json");

        let flag = CancelFlag::new();
        let seen = Arc::new(Mutex::new(Vec::<serde_json::Value>::new()));
        let logs = {
            let flag = flag.clone();
            let seen = Arc::clone(&seen);
            let status_path = status_path.clone();
            MemoryLogStore::new().with_hook(move |_log, _sample| {
                let text = std::fs::read_to_string(&status_path).unwrap();
                seen.lock().unwrap().push(serde_json::from_str(&text).unwrap());
                flag.cancel();
            })
        };

        let mut sampler = sampler(
            app_inspector(),
            ScriptedOperator::new().request(APP, 2.0),
            logs,
            &flag,
            options(),
        )
        .with_status(StatusTracker::new(status_path.clone()));

        sampler.run().await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["state"], "running");
        assert_eq!(seen[0]["launch_path"], APP);
        assert_eq!(seen[0]["tracked_pids"], serde_json::json!([100]));
        assert_eq!(seen[0]["log_file"], "memory://0");
        assert!(!status_path.exists());
    }

    #[test]
    fn test_options_from_config() {
        let mut config = MonitorConfig::default();
        config.sampling.carry_run_time = true;
        config.sampling.max_samples = Some(10);
        config.launch.discovery_delay_ms = 50;

        let options = SamplerOptions::from(&config);
        assert!(options.carry_run_time);
        assert_eq!(options.max_samples, Some(10));
        assert!(options.write_baseline_row);
        assert_eq!(options.discovery_attempts, 5);
        assert_eq!(options.discovery_delay, Duration::from_millis(50));
    }
}
