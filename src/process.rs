//! External command execution with line-streamed, combined output.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;

use futures_util::future::BoxFuture;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::HomesteadError;

/// Program + arguments + optional working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Exit code plus everything the process wrote to stdout and stderr.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub output: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Receives each output line as it is produced.
pub type LineSink<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Runs external commands.
///
/// Uses boxed futures so the controller can hold an `Arc<dyn ProcessRunner>`
/// and tests can swap in a scripted runner.
pub trait ProcessRunner: Send + Sync {
    fn run<'a>(
        &'a self,
        spec: &'a CommandSpec,
        on_line: LineSink<'a>,
    ) -> BoxFuture<'a, Result<ProcessOutput, HomesteadError>>;
}

/// Spawns real processes through `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run<'a>(
        &'a self,
        spec: &'a CommandSpec,
        on_line: LineSink<'a>,
    ) -> BoxFuture<'a, Result<ProcessOutput, HomesteadError>> {
        Box::pin(run_streaming(spec, on_line))
    }
}

async fn run_streaming(
    spec: &CommandSpec,
    on_line: LineSink<'_>,
) -> Result<ProcessOutput, HomesteadError> {
    let mut cmd = tokio::process::Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.cwd {
        cmd.current_dir(dir);
    }

    tracing::debug!(command = %spec, cwd = ?spec.cwd, "spawning");

    let mut child = cmd.spawn().map_err(|source| HomesteadError::Spawn {
        program: spec.program.clone(),
        source,
    })?;

    let stdout = child.stdout.take().ok_or_else(|| missing_pipe(spec, "stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing_pipe(spec, "stderr"))?;
    let mut out = BufReader::new(stdout);
    let mut err = BufReader::new(stderr);
    let (mut out_buf, mut err_buf) = (Vec::new(), Vec::new());

    let mut combined = String::new();
    let mut emit = |buf: &mut Vec<u8>| {
        let line = decode_line(buf);
        buf.clear();
        on_line(&line);
        combined.push_str(&line);
        combined.push('\n');
    };

    let read_err = |e: std::io::Error| HomesteadError::Io {
        context: format!("reading output of {}", spec.program),
        source: e,
    };

    // `read_until` keeps partial reads in the buffer when the other branch wins.
    let (mut out_done, mut err_done) = (false, false);
    while !(out_done && err_done) {
        tokio::select! {
            n = out.read_until(b'\n', &mut out_buf), if !out_done => match n.map_err(read_err)? {
                0 => out_done = true,
                _ => emit(&mut out_buf),
            },
            n = err.read_until(b'\n', &mut err_buf), if !err_done => match n.map_err(read_err)? {
                0 => err_done = true,
                _ => emit(&mut err_buf),
            },
        }
    }

    let status = child.wait().await.map_err(|e| HomesteadError::Io {
        context: format!("waiting for {}", spec.program),
        source: e,
    })?;

    tracing::debug!(command = %spec, code = ?status.code(), "process exited");

    Ok(ProcessOutput {
        code: status.code(),
        output: combined,
    })
}

/// One output line without its terminator. Invalid UTF-8 is replaced, not an error.
fn decode_line(buf: &[u8]) -> String {
    let line = buf.strip_suffix(b"\n").unwrap_or(buf);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

fn missing_pipe(spec: &CommandSpec, which: &str) -> HomesteadError {
    HomesteadError::Io {
        context: format!("capturing {which} of {}", spec.program),
        source: std::io::Error::other("pipe not available"),
    }
}
