//! The person at the console: supplies launch requests and decides whether
//! to restart after a tracked process disappears.

use crate::config::LaunchConfig;
use crate::request::{self, LaunchRequest};
use crate::signals::EscapeListener;
use std::io::{BufRead, Write};
use thiserror::Error;

pub const PATH_PROMPT: &str = "Type in an absolute path of the process to launch: ";
pub const INTERVAL_PROMPT: &str = "Type in an interval in seconds: ";
pub const CONTINUE_PROMPT: &str = "Do you want to continue? (YES/NO)";

#[derive(Debug, Error)]
pub enum OperatorError {
    /// Input reached end-of-file.
    #[error("console input closed")]
    Closed,
    /// Escape was typed at a prompt.
    #[error("cancelled at the prompt")]
    Cancelled,
    #[error("console I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

pub trait Operator {
    /// Block until a valid request is supplied. Invalid input is reported
    /// and asked for again; it never surfaces as an error.
    fn request_launch(&mut self) -> Result<LaunchRequest, OperatorError>;

    /// Show `reason` and ask whether to start over.
    fn confirm_continue(&mut self, reason: &str) -> Result<bool, OperatorError>;

    /// One line of console output.
    fn notify(&mut self, message: &str);
}

/// Line-oriented operator over any reader/writer pair (stdin/stdout in `main`).
pub struct ConsoleOperator<R, W> {
    input: R,
    output: W,
    launch: LaunchConfig,
    preset: Option<(String, String)>,
    listener: Option<EscapeListener>,
}

impl<R: BufRead, W: Write> ConsoleOperator<R, W> {
    pub fn new(input: R, output: W, launch: LaunchConfig) -> Self {
        Self {
            input,
            output,
            launch,
            preset: None,
            listener: None,
        }
    }

    /// Answers to use for the first request instead of prompting.
    pub fn with_preset(mut self, path: String, interval: String) -> Self {
        self.preset = Some((path, interval));
        self
    }

    /// Pause `listener` around every prompt; it is dropped with the operator.
    pub fn with_listener(mut self, listener: EscapeListener) -> Self {
        self.listener = Some(listener);
        self
    }

    #[cfg(test)]
    pub fn output(&self) -> &W {
        &self.output
    }

    /// Raw mode does not translate `\n`, so lines need an explicit carriage return.
    fn line_ending(&self) -> &'static str {
        if self.listener.is_some() {
            "\r\n"
        } else {
            "\n"
        }
    }

    fn say(&mut self, message: &str) -> std::io::Result<()> {
        let ending = self.line_ending();
        write!(self.output, "{message}{ending}")?;
        self.output.flush()
    }

    fn prompt(&mut self, text: &str) -> Result<String, OperatorError> {
        if let Some(listener) = &self.listener {
            listener.pause()?;
        }
        let answer = self.read_answer(text);
        if let Some(listener) = &self.listener {
            if let Err(e) = listener.resume() {
                tracing::warn!(error = %e, "failed to re-enable the escape listener");
            }
        }
        answer
    }

    fn read_answer(&mut self, text: &str) -> Result<String, OperatorError> {
        write!(self.output, "{text}")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(OperatorError::Closed);
        }
        // In line mode Escape arrives as a literal ESC character.
        if line.contains('\u{1b}') {
            return Err(OperatorError::Cancelled);
        }
        Ok(line.trim().to_string())
    }
}

impl<R: BufRead, W: Write> Operator for ConsoleOperator<R, W> {
    fn request_launch(&mut self) -> Result<LaunchRequest, OperatorError> {
        loop {
            let (path, interval) = match self.preset.take() {
                Some(preset) => preset,
                None => {
                    let path = self.prompt(PATH_PROMPT)?;
                    let interval = self.prompt(INTERVAL_PROMPT)?;
                    (path, interval)
                }
            };

            match request::validate(&path, &interval, &self.launch) {
                Ok(request) => {
                    tracing::debug!(
                        path = %request.executable_path().display(),
                        interval = request.interval(),
                        "launch request accepted"
                    );
                    return Ok(request);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "launch request rejected");
                    self.say(&e.to_string())?;
                }
            }
        }
    }

    fn confirm_continue(&mut self, reason: &str) -> Result<bool, OperatorError> {
        self.say(reason)?;
        let question = format!("{CONTINUE_PROMPT}{}", self.line_ending());
        let answer = self.prompt(&question)?;
        Ok(answer.eq_ignore_ascii_case("yes"))
    }

    fn notify(&mut self, message: &str) {
        if let Err(e) = self.say(message) {
            tracing::warn!(error = %e, "failed to write to the console");
        }
    }
}
