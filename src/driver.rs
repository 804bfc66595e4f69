//! Command lines for the hypervisor driver and parsers for its output.

use std::fmt;
use std::path::Path;

use crate::config::Config;
use crate::error::HomesteadError;
use crate::paths;
use crate::process::CommandSpec;

/// The four mutually exclusive control operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOp {
    Start,
    Stop,
    Provision,
    Reload,
}

impl ControlOp {
    pub fn subcommand(self) -> &'static str {
        match self {
            ControlOp::Start => "up",
            ControlOp::Stop => "halt",
            ControlOp::Provision => "provision",
            ControlOp::Reload => "reload",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ControlOp::Start => "Starting VM",
            ControlOp::Stop => "Stopping VM",
            ControlOp::Provision => "Re-provisioning VM",
            ControlOp::Reload => "Reloading VM",
        }
    }
}

impl fmt::Display for ControlOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subcommand())
    }
}

// ── command builders ─────────────────────────────────────

pub fn global_status(config: &Config) -> CommandSpec {
    CommandSpec::new(&config.driver.binary).arg("global-status")
}

pub fn status(config: &Config, id: &str) -> CommandSpec {
    CommandSpec::new(&config.driver.binary).args(["status", id])
}

pub fn version(config: &Config) -> CommandSpec {
    CommandSpec::new(&config.driver.binary).arg("--version")
}

/// `[sudo -S] vagrant <subcommand> <name>`, run from the VM's home directory.
pub fn control(config: &Config, op: ControlOp, home: &Path) -> CommandSpec {
    let name = &config.resource.name;
    let spec = if config.driver.elevate {
        CommandSpec::new(&config.driver.sudo).args([
            "-S",
            config.driver.binary.as_str(),
            op.subcommand(),
            name.as_str(),
        ])
    } else {
        CommandSpec::new(&config.driver.binary).args([op.subcommand(), name.as_str()])
    };
    spec.current_dir(home)
}

/// `target` is left out of the reported command when empty.
pub fn invocation_error(config: &Config, subcommand: &str, target: &str) -> HomesteadError {
    let mut command = format!("{} {subcommand}", config.driver.binary);
    if !target.is_empty() {
        command.push(' ');
        command.push_str(target);
    }
    HomesteadError::DriverInvocation {
        command,
        subcommand: subcommand.to_string(),
    }
}

// ── output parsing ───────────────────────────────────────

/// One row of `vagrant global-status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalStatusEntry {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub state: String,
    pub home: String,
}

impl GlobalStatusEntry {
    pub fn running(&self) -> bool {
        self.state == "running"
    }
}

/// Find the first row whose name column equals `name`.
///
/// Rows look like `d21e8e6  homestead virtualbox poweroff /home/jon/My Project`;
/// everything from the fifth column on is the directory, so paths with spaces
/// survive.
pub fn find_in_global_status(output: &str, name: &str) -> Option<GlobalStatusEntry> {
    output.lines().find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 || fields[1] != name {
            return None;
        }
        Some(GlobalStatusEntry {
            id: fields[0].to_string(),
            name: fields[1].to_string(),
            provider: fields[2].to_string(),
            state: fields[3].to_string(),
            home: fields[4..].join(" ").trim().to_string(),
        })
    })
}

/// Whether `vagrant status <id>` output reports the machine as running.
pub fn status_reports_running(output: &str) -> bool {
    output.split_whitespace().any(|token| token == "running")
}

// ── elevation ────────────────────────────────────────────

/// Reset every `creator_uid` marker of the machine to `0`.
///
/// The driver refuses to touch a machine created by another uid, and control
/// sub-commands run as root. Returns how many markers were rewritten; a
/// machine directory that does not exist yet is not an error.
pub async fn reset_creator_uid(home: &Path, resource: &str) -> Result<usize, HomesteadError> {
    let machine_dir = home.join(".vagrant").join("machines").join(resource);
    let mut entries = match tokio::fs::read_dir(&machine_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(HomesteadError::Io {
                context: format!("reading {}", machine_dir.display()),
                source: e,
            });
        }
    };

    let mut reset = 0;
    while let Some(entry) = entries.next_entry().await.map_err(|e| HomesteadError::Io {
        context: format!("reading {}", machine_dir.display()),
        source: e,
    })? {
        let provider = entry.file_name();
        let marker = paths::creator_uid_path(home, resource, &provider.to_string_lossy());
        if !marker.is_file() {
            continue;
        }
        tokio::fs::write(&marker, "0")
            .await
            .map_err(|e| HomesteadError::Io {
                context: format!("writing {}", marker.display()),
                source: e,
            })?;
        tracing::debug!(path = %marker.display(), "reset creator_uid");
        reset += 1;
    }
    Ok(reset)
}
