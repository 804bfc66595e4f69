use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use tracing_subscriber::fmt::MakeWriter;

/// How many finished logs to keep per driver sub-command.
pub const KEEP_OPERATION_LOGS: usize = 10;

// ── DeferredFileWriter ───────────────────────────────────

type SharedFile = Arc<Mutex<Option<File>>>;

/// A `MakeWriter` that discards until [`DeferredFileHandle::set_file`] is
/// called. The subscriber is installed before the config (and therefore
/// the data directory) is known.
#[derive(Clone)]
pub struct DeferredFileWriter {
    inner: SharedFile,
}

#[derive(Clone)]
pub struct DeferredFileHandle {
    inner: SharedFile,
}

impl DeferredFileWriter {
    pub fn new() -> (Self, DeferredFileHandle) {
        let inner: SharedFile = Arc::new(Mutex::new(None));
        (
            Self {
                inner: Arc::clone(&inner),
            },
            DeferredFileHandle { inner },
        )
    }
}

impl DeferredFileHandle {
    /// Start appending to `path`, creating parent directories.
    pub fn set_file(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = Some(file);
        Ok(())
    }
}

pub struct DeferredWriter {
    inner: SharedFile,
}

impl Write for DeferredWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.inner.lock().unwrap_or_else(PoisonError::into_inner).as_mut() {
            Some(f) => f.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.inner.lock().unwrap_or_else(PoisonError::into_inner).as_mut() {
            Some(f) => f.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for DeferredFileWriter {
    type Writer = DeferredWriter;

    fn make_writer(&'a self) -> Self::Writer {
        DeferredWriter {
            inner: Arc::clone(&self.inner),
        }
    }
}

// ── OperationLog ─────────────────────────────────────────

/// Full driver output of one control operation.
///
/// Written to `<timestamp>_<subcommand>_running.log`; [`finish`](Self::finish)
/// renames it to `_ok.log` or `_failed.log`.
pub struct OperationLog {
    file: Mutex<File>,
    path: PathBuf,
}

impl OperationLog {
    pub fn create(logs_dir: &Path, subcommand: &str) -> std::io::Result<Self> {
        fs::create_dir_all(logs_dir)?;
        let path = logs_dir.join(format!("{}_{subcommand}_running.log", utc_timestamp()));
        let file = File::create(&path)?;
        Ok(Self {
            file: Mutex::new(file),
            path,
        })
    }

    pub fn write_line(&self, line: &str) {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writeln!(file, "{line}");
    }

    /// Rename to the final name and return it.
    pub fn finish(self, success: bool) -> PathBuf {
        let outcome = if success { Outcome::Ok } else { Outcome::Failed };
        let renamed = self
            .path
            .file_name()
            .and_then(|f| f.to_str())
            .map(|f| f.replace("_running.log", &format!("_{}.log", outcome.as_str())))
            .map(|name| self.path.with_file_name(name));
        match renamed {
            Some(target) if fs::rename(&self.path, &target).is_ok() => target,
            _ => self.path,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Failed,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "ok" => Some(Outcome::Ok),
            "failed" => Some(Outcome::Failed),
            _ => None,
        }
    }
}

/// A finished operation log, parsed from its filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationLogEntry {
    pub path: PathBuf,
    pub timestamp: String,
    pub subcommand: String,
    pub outcome: Outcome,
}

fn parse_entry(path: PathBuf) -> Option<OperationLogEntry> {
    let stem = path.file_name()?.to_str()?.strip_suffix(".log")?;
    let (timestamp, rest) = stem.split_once('_')?;
    let (subcommand, outcome) = rest.rsplit_once('_')?;
    let outcome = Outcome::parse(outcome)?;
    Some(OperationLogEntry {
        timestamp: timestamp.to_string(),
        subcommand: subcommand.to_string(),
        outcome,
        path,
    })
}

/// Finished operation logs, oldest first. In-progress logs are skipped.
pub fn list_operation_logs(logs_dir: &Path) -> Vec<OperationLogEntry> {
    let Ok(entries) = fs::read_dir(logs_dir) else {
        return Vec::new();
    };
    let mut logs: Vec<OperationLogEntry> = entries
        .filter_map(Result::ok)
        .filter_map(|e| parse_entry(e.path()))
        .collect();
    logs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    logs
}

pub fn latest_operation_log(logs_dir: &Path, failed_only: bool) -> Option<PathBuf> {
    list_operation_logs(logs_dir)
        .into_iter()
        .rev()
        .find(|e| !failed_only || e.outcome == Outcome::Failed)
        .map(|e| e.path)
}

/// Delete the oldest finished logs of `subcommand`, keeping at most `keep`.
pub fn rotate_operation_logs(logs_dir: &Path, subcommand: &str, keep: usize) {
    let matching: Vec<PathBuf> = list_operation_logs(logs_dir)
        .into_iter()
        .filter(|e| e.subcommand == subcommand)
        .map(|e| e.path)
        .collect();
    if matching.len() > keep {
        for old in &matching[..matching.len() - keep] {
            let _ = fs::remove_file(old);
        }
    }
}

// ── Timestamp helper ─────────────────────────────────────

/// Current UTC time as `YYYY-MM-DDTHH-MM-SS` (sortable, filename-safe).
pub fn utc_timestamp() -> String {
    let secs = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format_timestamp(secs)
}

fn format_timestamp(secs: u64) -> String {
    let days = (secs / 86400) as i64;
    let time_of_day = secs % 86400;
    let (hours, minutes, seconds) = (time_of_day / 3600, (time_of_day % 3600) / 60, time_of_day % 60);

    // civil_from_days (Howard Hinnant)
    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = yoe as i64 + era * 400 + i64::from(m <= 2);

    format!("{y:04}-{m:02}-{d:02}T{hours:02}-{minutes:02}-{seconds:02}")
}
