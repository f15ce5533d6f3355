//! User-facing console output and pause acknowledgment.
//!
//! Progress lines go through a [`Console`] sink with three severity channels
//! (info, success, error) plus indented field details. Diagnostic logging
//! goes through `tracing` separately.

use colored::Colorize;
use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use std::rc::Rc;
use std::time::Duration;

use crate::script::Step;

/// Sink for progress messages.
pub trait Console {
    fn info(&self, message: &str);
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    /// One resolved field of the step being executed.
    fn detail(&self, label: &str, value: &str);
}

/// Colored terminal output.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConsole;

impl Console for TerminalConsole {
    fn info(&self, message: &str) {
        println!("{}", message.cyan());
    }

    fn success(&self, message: &str) {
        println!("{}", message.green());
    }

    fn error(&self, message: &str) {
        eprintln!("{}", message.red());
    }

    fn detail(&self, label: &str, value: &str) {
        println!("\t\t{label}: {value}");
    }
}

/// A line captured by [`RecordingConsole`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleLine {
    Info(String),
    Success(String),
    Error(String),
    Detail(String, String),
}

/// Console that keeps every line in memory. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct RecordingConsole {
    lines: Rc<RefCell<Vec<ConsoleLine>>>,
}

impl RecordingConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<ConsoleLine> {
        self.lines.borrow().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.lines
            .borrow()
            .iter()
            .filter_map(|line| match line {
                ConsoleLine::Error(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, line: ConsoleLine) {
        self.lines.borrow_mut().push(line);
    }
}

impl Console for RecordingConsole {
    fn info(&self, message: &str) {
        self.push(ConsoleLine::Info(message.to_string()));
    }

    fn success(&self, message: &str) {
        self.push(ConsoleLine::Success(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.push(ConsoleLine::Error(message.to_string()));
    }

    fn detail(&self, label: &str, value: &str) {
        self.push(ConsoleLine::Detail(label.to_string(), value.to_string()));
    }
}

/// Source of the "continue" signal after a paused step.
///
/// The interpreter blocks inside `acknowledge` until it returns.
pub trait Acknowledge {
    fn acknowledge(&mut self, step: &Step) -> io::Result<()>;
}

impl<F> Acknowledge for F
where
    F: FnMut(&Step) -> io::Result<()>,
{
    fn acknowledge(&mut self, step: &Step) -> io::Result<()> {
        self(step)
    }
}

/// Waits for Enter on standard input. End of input counts as acknowledgment.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinAcknowledger;

impl Acknowledge for StdinAcknowledger {
    fn acknowledge(&mut self, _step: &Step) -> io::Result<()> {
        print!("Press Enter to continue..");
        io::stdout().flush()?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(())
    }
}

/// Format a duration as `HH:MM:SS.ss`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs_f64();
    let hours = (total / 3600.0).floor();
    let minutes = ((total - hours * 3600.0) / 60.0).floor();
    let seconds = total - hours * 3600.0 - minutes * 60.0;
    format!("{:0>2}:{:0>2}:{:05.2}", hours as u64, minutes as u64, seconds)
}

/// Print the run's wall-clock time on the info channel.
pub fn report_elapsed(console: &dyn Console, elapsed: Duration) {
    console.info(&format!("Elapsed time: {}", format_elapsed(elapsed)));
}
