//! Locating the VM through the driver's global status listing.

use std::fmt;
use std::path::PathBuf;

use crate::config::Config;
use crate::driver;
use crate::error::HomesteadError;
use crate::process::ProcessRunner;
use crate::recovery::Recovery;

/// Which machine the driver knows as our resource, and where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmIdentity {
    pub id: String,
    pub name: String,
    /// `None` when found through recovery rather than the driver.
    pub provider: Option<String>,
    pub home: PathBuf,
}

impl fmt::Display for VmIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) in {}", self.name, self.id, self.home.display())
    }
}

#[derive(Debug, Clone)]
pub struct Detected {
    pub identity: VmIdentity,
    /// Reported state, or `None` when the identity came from recovery.
    pub running: Option<bool>,
}

/// Run `global-status` and pick our row; fall back to `recovery` on a miss.
pub async fn detect(
    config: &Config,
    runner: &dyn ProcessRunner,
    recovery: Recovery<'_>,
) -> Result<Detected, HomesteadError> {
    let name = &config.resource.name;
    let spec = driver::global_status(config);
    let output = runner.run(&spec, &|line: &str| tracing::trace!("{line}")).await?;
    if !output.success() {
        return Err(driver::invocation_error(config, "global-status", ""));
    }

    if let Some(entry) = driver::find_in_global_status(&output.output, name) {
        tracing::info!(id = %entry.id, state = %entry.state, home = %entry.home, "found VM");
        let running = entry.running();
        return Ok(Detected {
            identity: VmIdentity {
                id: entry.id,
                name: entry.name,
                provider: Some(entry.provider),
                home: PathBuf::from(entry.home),
            },
            running: Some(running),
        });
    }

    tracing::info!(name = %name, "VM not listed by driver, starting recovery");
    let home = recovery.run().await?;
    Ok(Detected {
        identity: VmIdentity {
            id: name.clone(),
            name: name.clone(),
            provider: None,
            home,
        },
        running: None,
    })
}
