//! Cancellation for the sampling loop.
//!
//! Every source (Escape key, SIGINT, STOP file) ends up setting one shared
//! flag. The loop only reads it between sampling rounds, so an in-flight
//! round always completes before the stop is honored. A repeated interrupt
//! forces the stop: the round is abandoned and the tracked processes are
//! terminated straight away.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Second SIGINT within this window forces an immediate stop.
const DOUBLE_INTERRUPT_WINDOW: Duration = Duration::from_secs(3);

/// How long a forced stop may take to clean up before the process exits anyway
/// (the loop cannot observe it while blocked on a prompt).
const FORCED_EXIT_GRACE: Duration = Duration::from_secs(5);

/// How long the key listener blocks waiting for input before re-checking its state.
const KEY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shared stop flag. Clones observe the same flag.
///
/// `cancel` asks for a stop at the next round boundary. `force` also wakes
/// anyone waiting in `forced`, so an in-flight round can be abandoned.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag {
    inner: Arc<FlagState>,
}

#[derive(Debug, Default)]
struct FlagState {
    cancelled: AtomicBool,
    forced: AtomicBool,
    wake: Notify,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn force(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.forced.store(true, Ordering::SeqCst);
        self.inner.wake.notify_one();
    }

    pub fn is_forced(&self) -> bool {
        self.inner.forced.load(Ordering::SeqCst)
    }

    /// Resolves once `force` has been called.
    pub async fn forced(&self) {
        loop {
            let woken = self.inner.wake.notified();
            if self.is_forced() {
                return;
            }
            woken.await;
        }
    }
}

/// Why the loop was asked to stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Escape key or SIGINT.
    Cancelled,
    /// A second SIGINT arrived in quick succession.
    Forced,
    /// The STOP file appeared.
    StopFile(PathBuf),
}

/// Everything the loop checks at an iteration boundary.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    flag: CancelFlag,
    stop_file: Option<PathBuf>,
}

impl StopSignal {
    pub fn new(flag: CancelFlag) -> Self {
        Self {
            flag,
            stop_file: None,
        }
    }

    pub fn with_stop_file(mut self, path: PathBuf) -> Self {
        self.stop_file = Some(path);
        self
    }

    /// Check every source. A STOP file is consumed when seen so the next
    /// run does not stop immediately.
    pub fn requested(&self) -> Option<StopReason> {
        if self.flag.is_forced() {
            return Some(StopReason::Forced);
        }
        if self.flag.is_cancelled() {
            return Some(StopReason::Cancelled);
        }
        let path = self.stop_file.as_ref()?;
        if !path.exists() {
            return None;
        }
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove STOP file");
        }
        Some(StopReason::StopFile(path.clone()))
    }

    pub async fn forced(&self) {
        self.flag.forced().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InterruptAction {
    Cancel,
    Force,
}

/// Tells a first SIGINT from a repeated one.
#[derive(Debug, Default)]
struct InterruptTracker {
    last: Option<Instant>,
}

impl InterruptTracker {
    fn record(&mut self, now: Instant) -> InterruptAction {
        let repeated = self
            .last
            .is_some_and(|at| now.saturating_duration_since(at) < DOUBLE_INTERRUPT_WINDOW);
        self.last = Some(now);
        if repeated {
            InterruptAction::Force
        } else {
            InterruptAction::Cancel
        }
    }
}

/// Route SIGINT and SIGTERM to the cancel flag.
///
/// First SIGINT: finish the current round, then stop.
/// Second SIGINT within 3s: abandon the round, terminate the tracked
/// processes and exit with status 130. If the loop has not exited within
/// a short grace period the process exits regardless.
/// SIGTERM: same as a single SIGINT.
pub fn install_interrupt_handler(flag: CancelFlag) -> tokio::task::JoinHandle<()> {
    #[cfg(unix)]
    install_terminate_handler(flag.clone());

    tokio::spawn(async move {
        let mut tracker = InterruptTracker::default();
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for SIGINT");
                return;
            }
            match tracker.record(Instant::now()) {
                InterruptAction::Cancel => {
                    tracing::info!("interrupt received, stopping after the current round");
                    flag.cancel();
                }
                InterruptAction::Force => {
                    tracing::warn!("second interrupt received, terminating tracked processes");
                    flag.force();
                    tokio::spawn(async {
                        tokio::time::sleep(FORCED_EXIT_GRACE).await;
                        tracing::error!("forced stop did not finish in time, exiting");
                        std::process::exit(130);
                    });
                }
            }
        }
    })
}

#[cfg(unix)]
fn install_terminate_handler(flag: CancelFlag) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "failed to listen for SIGTERM");
            return;
        }
    };
    tokio::spawn(async move {
        while terminate.recv().await.is_some() {
            tracing::info!("SIGTERM received, stopping after the current round");
            flag.cancel();
        }
    });
}

/// Listens for the Escape key on the terminal and raises the cancel flag.
///
/// Keys can only be read one at a time with the terminal in raw mode, which
/// breaks line-based prompts. `pause` hands the terminal back in line mode
/// and parks the listener; `resume` puts it back. Dropping the listener
/// stops the thread and restores the terminal.
pub struct EscapeListener {
    paused: Arc<AtomicBool>,
    parked: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EscapeListener {
    pub fn spawn(flag: CancelFlag) -> std::io::Result<Self> {
        crossterm::terminal::enable_raw_mode()?;

        let paused = Arc::new(AtomicBool::new(false));
        let parked = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));

        let handle = {
            let paused = Arc::clone(&paused);
            let parked = Arc::clone(&parked);
            let done = Arc::clone(&done);
            std::thread::Builder::new()
                .name("escape-listener".to_string())
                .spawn(move || listen(flag, paused, parked, done))?
        };

        Ok(Self {
            paused,
            parked,
            done,
            handle: Some(handle),
        })
    }

    /// Stop reading keys and restore line mode. Returns once the listener
    /// thread is no longer reading from the terminal.
    pub fn pause(&self) -> std::io::Result<()> {
        self.paused.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + KEY_POLL_INTERVAL * 5;
        while !self.parked.load(Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        crossterm::terminal::disable_raw_mode()
    }

    pub fn resume(&self) -> std::io::Result<()> {
        crossterm::terminal::enable_raw_mode()?;
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for EscapeListener {
    fn drop(&mut self) {
        self.done.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        let _ = crossterm::terminal::disable_raw_mode();
    }
}

fn listen(
    flag: CancelFlag,
    paused: Arc<AtomicBool>,
    parked: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
) {
    use crossterm::event::{self, Event};

    let mut tracker = InterruptTracker::default();
    while !done.load(Ordering::SeqCst) {
        if paused.load(Ordering::SeqCst) {
            parked.store(true, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            continue;
        }
        parked.store(false, Ordering::SeqCst);

        match event::poll(KEY_POLL_INTERVAL) {
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) if is_cancel_key(&key) => {
                    match tracker.record(Instant::now()) {
                        InterruptAction::Cancel => {
                            tracing::info!(code = ?key.code, "cancel key pressed, stopping after the current round");
                            flag.cancel();
                        }
                        InterruptAction::Force => {
                            tracing::warn!(code = ?key.code, "cancel key pressed again, terminating tracked processes");
                            flag.force();
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read terminal event");
                    return;
                }
            },
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(error = %e, "failed to poll terminal events");
                return;
            }
        }
    }
}

/// Escape, or Ctrl-C (which raw mode delivers as a key instead of SIGINT).
fn is_cancel_key(key: &crossterm::event::KeyEvent) -> bool {
    use crossterm::event::{KeyCode, KeyEventKind, KeyModifiers};

    if key.kind != KeyEventKind::Press {
        return false;
    }
    match key.code {
        KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}
