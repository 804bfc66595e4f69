use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Controls how operation output is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Spinner + ring-buffer of recent driver output, collapsed when done.
    Normal,
    /// Like Normal but keeps the output lines after the operation settles.
    Verbose,
    /// Spinner only, no output lines.
    Quiet,
    /// No ANSI: plain println output (for piped/non-TTY).
    Plain,
}

/// Where long-running driver invocations report their output.
pub trait ProgressSurface: Send + Sync {
    /// Open a titled entry for one operation.
    fn begin(&self, title: &str) -> Box<dyn ProgressHandle>;

    /// A standalone line outside of any operation.
    fn note(&self, line: &str);
}

/// A single open operation on a [`ProgressSurface`].
pub trait ProgressHandle: Send + Sync {
    fn log(&self, line: &str);

    /// Close the entry, marking it as succeeded or failed.
    fn dismiss(self: Box<Self>, success: bool);
}

const MAX_LOG_LINES: usize = 10;

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn done_style(success: bool) -> ProgressStyle {
    let template = if success {
        "\u{2713} {msg:.green}"
    } else {
        "\u{2717} {msg:.red}"
    };
    ProgressStyle::default_spinner()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Terminal rendering via indicatif (or plain lines when not on a TTY).
pub struct TerminalSurface {
    multi: MultiProgress,
    mode: OutputMode,
}

impl TerminalSurface {
    pub fn new(mode: OutputMode) -> Self {
        let multi = if mode == OutputMode::Plain {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        Self { multi, mode }
    }
}

impl ProgressSurface for TerminalSurface {
    fn begin(&self, title: &str) -> Box<dyn ProgressHandle> {
        if self.mode == OutputMode::Plain {
            println!("==> {title}");
            return Box::new(PlainHandle {
                title: title.to_string(),
            });
        }

        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(spinner_style());
        bar.set_message(title.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));

        Box::new(SpinnerHandle {
            bar,
            multi: self.multi.clone(),
            lines: Mutex::new(VecDeque::new()),
            title: title.to_string(),
            mode: self.mode,
        })
    }

    fn note(&self, line: &str) {
        if self.mode == OutputMode::Plain {
            println!("    {line}");
        } else {
            self.multi.println(format!("    {line}")).ok();
        }
    }
}

struct PlainHandle {
    title: String,
}

impl ProgressHandle for PlainHandle {
    fn log(&self, line: &str) {
        for sub in line.split('\n') {
            println!("    {sub}");
        }
    }

    fn dismiss(self: Box<Self>, success: bool) {
        let mark = if success { "\u{2713}" } else { "\u{2717}" };
        println!("{mark} {}", self.title);
    }
}

/// Output lines are encoded as extra lines of the spinner's message so the
/// bar count in the `MultiProgress` never changes mid-operation.
struct SpinnerHandle {
    bar: ProgressBar,
    multi: MultiProgress,
    lines: Mutex<VecDeque<String>>,
    title: String,
    mode: OutputMode,
}

impl ProgressHandle for SpinnerHandle {
    fn log(&self, line: &str) {
        if self.mode == OutputMode::Quiet {
            return;
        }

        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        for sub in line.split('\n') {
            if lines.len() >= MAX_LOG_LINES {
                lines.pop_front();
            }
            lines.push_back(sub.to_string());
        }

        let mut msg = self.title.clone();
        for l in lines.iter() {
            msg.push_str("\n    ");
            msg.push_str(l);
        }
        self.bar.set_message(msg);
    }

    fn dismiss(self: Box<Self>, success: bool) {
        if self.mode == OutputMode::Verbose {
            let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
            for line in lines.iter() {
                self.multi.println(format!("    {line}")).ok();
            }
        }
        self.bar.set_style(done_style(success));
        self.bar.finish_with_message(self.title.clone());
    }
}

/// Discards everything. Used for JSON output.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSurface;

impl ProgressSurface for SilentSurface {
    fn begin(&self, _title: &str) -> Box<dyn ProgressHandle> {
        Box::new(SilentHandle)
    }

    fn note(&self, _line: &str) {}
}

struct SilentHandle;

impl ProgressHandle for SilentHandle {
    fn log(&self, _line: &str) {}

    fn dismiss(self: Box<Self>, _success: bool) {}
}
