mod collector;
mod config;
mod data_dir;
mod inspector;
mod launcher;
mod log;
mod logging;
mod operator;
mod registry;
mod request;
mod sample;
mod sampler;
mod signals;
mod status;

use clap::Parser;
use config::MonitorConfig;
use data_dir::DataDir;
use inspector::SystemInspector;
use log::CsvLogStore;
use operator::ConsoleOperator;
use sampler::{RunOutcome, RunSummary, SamplerError, SamplerOptions, SamplingLoop};
use signals::{CancelFlag, EscapeListener, StopSignal};
use status::StatusTracker;
use std::io::IsTerminal;
use std::path::PathBuf;

const WELCOME: &str =
    "Welcome back! Provide some data below or press Esc to quit and save the data";

/// Launch an executable, sample the CPU, memory and handle usage of every
/// process it starts on a fixed interval, and log the samples to CSV.
#[derive(Parser, Debug)]
#[command(name = "procsampler", version, about)]
pub struct Cli {
    /// Absolute path of the executable to launch (skips the first prompt)
    #[arg(long)]
    path: Option<String>,

    /// Sampling interval in seconds (used with --path)
    #[arg(long)]
    interval: Option<String>,

    /// Config file path
    #[arg(short, long, default_value = "procsampler.toml")]
    config: PathBuf,

    /// Directory for sample logs and status.json (overrides config)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Stop each run after this many samples (overrides config)
    #[arg(long)]
    max_samples: Option<u64>,

    /// Do not listen for the Escape key
    #[arg(long)]
    no_escape: bool,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    /// Layer command-line overrides on top of the loaded config.
    fn apply(&self, mut config: MonitorConfig) -> MonitorConfig {
        if let Some(dir) = &self.data_dir {
            config.log.data_dir = Some(dir.clone());
        }
        if let Some(max) = self.max_samples {
            config.sampling.max_samples = Some(max);
        }
        if self.no_escape {
            config.shutdown.escape_key = false;
        }
        config
    }

    /// The path/interval pair to try before prompting, if a path was given.
    fn preset(&self, config: &MonitorConfig) -> Option<(String, String)> {
        let path = self.path.clone()?;
        let interval = self
            .interval
            .clone()
            .or_else(|| config.sampling.interval_secs.map(|secs| secs.to_string()))
            .unwrap_or_default();
        Some((path, interval))
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match config::load(&cli.config) {
        Ok(config) => cli.apply(config),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    if cli.dry_run {
        match toml::to_string_pretty(&config) {
            Ok(text) => print!("{text}"),
            Err(e) => {
                eprintln!("error: failed to render config: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    let escape = config.shutdown.escape_key && std::io::stdin().is_terminal();
    logging::init(cli.verbose, cli.quiet, escape);
    tracing::debug!(?cli, "parsed CLI arguments");

    let code = match run(&cli, &config, escape).await {
        Ok(summary) => {
            report(&summary);
            exit_code(&summary)
        }
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    };
    std::process::exit(code);
}

/// Wire the real collaborators together and drive the loop. Everything that
/// touches the terminal is dropped before this returns.
async fn run(cli: &Cli, config: &MonitorConfig, escape: bool) -> Result<RunSummary, SamplerError> {
    let data_dir = DataDir::new(
        config
            .log
            .data_dir
            .clone()
            .unwrap_or_else(data_dir::default_root),
    );
    if let Err(e) = data_dir.init() {
        tracing::warn!(path = %data_dir.root().display(), error = %e, "failed to create data directory");
    }
    tracing::info!(data_dir = %data_dir.root().display(), "procsampler starting");

    let flag = CancelFlag::new();
    let _interrupts = signals::install_interrupt_handler(flag.clone());
    let stop = StopSignal::new(flag.clone())
        .with_stop_file(data_dir.stop_file(&config.shutdown.stop_file));

    println!("{WELCOME}");

    let mut operator = ConsoleOperator::new(
        std::io::stdin().lock(),
        std::io::stdout(),
        config.launch.clone(),
    );
    if let Some((path, interval)) = cli.preset(config) {
        operator = operator.with_preset(path, interval);
    }
    if escape {
        match EscapeListener::spawn(flag.clone()) {
            Ok(listener) => operator = operator.with_listener(listener),
            Err(e) => tracing::warn!(error = %e, "escape key unavailable, use Ctrl-C to stop"),
        }
    }

    let mut sampler = SamplingLoop::new(
        SystemInspector::new(),
        operator,
        CsvLogStore::new(data_dir.clone()),
        stop,
        SamplerOptions::from(config),
    )
    .with_status(StatusTracker::new(data_dir.status()));

    sampler.run().await
}

fn report(summary: &RunSummary) {
    let how = match &summary.outcome {
        RunOutcome::Cancelled => "stopped",
        RunOutcome::Declined => "stopped after the process exited",
        RunOutcome::AlreadyRunning { .. } => "not started",
        RunOutcome::LaunchFailed => "launch failed",
        RunOutcome::NothingTracked => "nothing to sample",
        RunOutcome::SampleLimit => "sample limit reached",
        RunOutcome::Interrupted => "interrupted",
    };
    println!(
        "Sampling {how}: {} samples written, {} restarts.",
        summary.samples_written, summary.restarts
    );
}

/// 130 after a forced stop, as a shell reports a process killed by SIGINT.
fn exit_code(summary: &RunSummary) -> i32 {
    match summary.outcome {
        RunOutcome::Interrupted => 130,
        _ => 0,
    }
}
