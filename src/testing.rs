//! Fakes shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::error::HomesteadError;
use crate::process::{CommandSpec, LineSink, ProcessOutput, ProcessRunner};
use crate::progress::{ProgressHandle, ProgressSurface};
use crate::prompt::{Prompter, RecoveryChoice};

type Handler = dyn Fn(&CommandSpec) -> (i32, String) + Send + Sync;

/// Answers every command with `handler(spec)` = `(exit code, output)`.
pub struct ScriptedRunner {
    handler: Box<Handler>,
    calls: Mutex<Vec<CommandSpec>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
}

impl ScriptedRunner {
    pub fn new(handler: impl Fn(&CommandSpec) -> (i32, String) + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Every command takes `delay` to finish.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Rendered command lines, e.g. `vagrant status d21e8e6`.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(ToString::to_string).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run<'a>(
        &'a self,
        spec: &'a CommandSpec,
        on_line: LineSink<'a>,
    ) -> BoxFuture<'a, Result<ProcessOutput, HomesteadError>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(spec.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let (code, output) = (self.handler)(spec);
            for line in output.lines() {
                on_line(line);
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(ProcessOutput {
                code: Some(code),
                output,
            })
        })
    }
}

/// Replays queued answers; `Cancel` / `None` once they run out.
pub struct ScriptedPrompter {
    choices: Mutex<VecDeque<RecoveryChoice>>,
    directories: Mutex<VecDeque<Option<String>>>,
}

impl ScriptedPrompter {
    pub fn new(choices: Vec<RecoveryChoice>, directories: Vec<Option<String>>) -> Self {
        Self {
            choices: Mutex::new(choices.into()),
            directories: Mutex::new(directories.into()),
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn choose_recovery(&self, _resource: &str) -> Result<RecoveryChoice, HomesteadError> {
        Ok(self
            .choices
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RecoveryChoice::Cancel))
    }

    fn directory(&self) -> Result<Option<String>, HomesteadError> {
        Ok(self.directories.lock().unwrap().pop_front().flatten())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    Begin(String),
    Log(String),
    Dismiss(bool),
    Note(String),
}

/// Records everything shown on it.
#[derive(Default, Clone)]
pub struct RecordingSurface {
    events: Arc<Mutex<Vec<SurfaceEvent>>>,
}

impl RecordingSurface {
    pub fn events(&self) -> Vec<SurfaceEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SurfaceEvent::Begin(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn lines(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SurfaceEvent::Log(l) => Some(l),
                _ => None,
            })
            .collect()
    }

    pub fn notes(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SurfaceEvent::Note(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    pub fn dismissals(&self) -> Vec<bool> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SurfaceEvent::Dismiss(ok) => Some(ok),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSurface for RecordingSurface {
    fn begin(&self, title: &str) -> Box<dyn ProgressHandle> {
        self.events.lock().unwrap().push(SurfaceEvent::Begin(title.to_string()));
        Box::new(RecordingHandle {
            events: Arc::clone(&self.events),
        })
    }

    fn note(&self, line: &str) {
        self.events.lock().unwrap().push(SurfaceEvent::Note(line.to_string()));
    }
}

struct RecordingHandle {
    events: Arc<Mutex<Vec<SurfaceEvent>>>,
}

impl ProgressHandle for RecordingHandle {
    fn log(&self, line: &str) {
        self.events.lock().unwrap().push(SurfaceEvent::Log(line.to_string()));
    }

    fn dismiss(self: Box<Self>, success: bool) {
        self.events.lock().unwrap().push(SurfaceEvent::Dismiss(success));
    }
}
