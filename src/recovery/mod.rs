//! Interactive fallback when the VM is unknown to the driver.
//!
//! The workflow is a small state machine. From the `NotFound` menu the user
//! either clones and bootstraps the template, or points at an existing
//! checkout. A failed branch reports its error and returns to the menu;
//! dismissing the menu ends recovery with `ResourceNotFound`.

pub mod bootstrap;
pub mod locate;
pub mod rewrite;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::HomesteadError;
use crate::process::ProcessRunner;
use crate::progress::{ProgressHandle, ProgressSurface};
use crate::prompt::{Prompter, RecoveryChoice};

/// Pause after the last line so it is visible before the surface closes.
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub enum RecoveryState {
    NotFound,
    Cloning,
    Bootstrapping(PathBuf),
    ConfiguringFiles(PathBuf),
    ValidatingPath(PathBuf),
    ValidatingDefinition(PathBuf),
    ValidatingConfig(PathBuf),
    Done(PathBuf),
    Failed(HomesteadError),
    Cancelled,
}

pub struct Recovery<'a> {
    config: &'a Config,
    runner: &'a dyn ProcessRunner,
    prompter: Arc<dyn Prompter>,
    surface: &'a dyn ProgressSurface,
    settle_delay: Duration,
}

impl<'a> Recovery<'a> {
    pub fn new(
        config: &'a Config,
        runner: &'a dyn ProcessRunner,
        prompter: Arc<dyn Prompter>,
        surface: &'a dyn ProgressSurface,
    ) -> Self {
        Self {
            config,
            runner,
            prompter,
            surface,
            settle_delay: SETTLE_DELAY,
        }
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Drive the workflow to `Done` (the VM's home directory) or `Cancelled`.
    pub async fn run(&self) -> Result<PathBuf, HomesteadError> {
        let mut state = RecoveryState::NotFound;
        let mut handle: Option<Box<dyn ProgressHandle>> = None;

        loop {
            tracing::debug!(?state, "recovery");
            state = match state {
                RecoveryState::NotFound => match self.ask_choice().await? {
                    RecoveryChoice::Clone => {
                        handle = Some(self.surface.begin("Setting up Homestead"));
                        RecoveryState::Cloning
                    }
                    RecoveryChoice::Locate => match self.ask_directory().await? {
                        Some(raw) => {
                            handle = Some(self.surface.begin("Locating Homestead"));
                            RecoveryState::ValidatingPath(locate::normalize_input(&raw))
                        }
                        None => RecoveryState::NotFound,
                    },
                    RecoveryChoice::Cancel => RecoveryState::Cancelled,
                },

                RecoveryState::Cloning => {
                    let log = |line: &str| emit(&handle, line);
                    log(&format!("Cloning {}", self.config.recovery.template_repo));
                    match bootstrap::clone_template(self.config, self.runner, &log).await {
                        Ok(checkout) => RecoveryState::Bootstrapping(checkout),
                        Err(e) => RecoveryState::Failed(e),
                    }
                }
                RecoveryState::Bootstrapping(checkout) => {
                    let log = |line: &str| emit(&handle, line);
                    log("Running init script");
                    match bootstrap::run_bootstrap(self.runner, &checkout, &log).await {
                        Ok(()) => RecoveryState::ConfiguringFiles(checkout),
                        Err(e) => RecoveryState::Failed(e),
                    }
                }
                RecoveryState::ConfiguringFiles(checkout) => {
                    let log = |line: &str| emit(&handle, line);
                    log("Configuring files");
                    match bootstrap::configure_files(self.config, &checkout, &log).await {
                        Ok(()) => RecoveryState::Done(checkout),
                        Err(e) => RecoveryState::Failed(e),
                    }
                }

                RecoveryState::ValidatingPath(dir) => {
                    emit(&handle, &format!("Checking {}", dir.display()));
                    match locate::check_directory(&dir).await {
                        Ok(()) => RecoveryState::ValidatingDefinition(dir),
                        Err(e) => RecoveryState::Failed(e),
                    }
                }
                RecoveryState::ValidatingDefinition(dir) => {
                    match locate::check_definition(&dir, &self.config.resource.definition_file).await {
                        Ok(()) => RecoveryState::ValidatingConfig(dir),
                        Err(e) => RecoveryState::Failed(e),
                    }
                }
                RecoveryState::ValidatingConfig(dir) => {
                    match locate::check_global_config(&self.config.global_config_path()).await {
                        Ok(()) => RecoveryState::Done(dir),
                        Err(e) => RecoveryState::Failed(e),
                    }
                }

                RecoveryState::Done(home) => {
                    emit(&handle, "Done setting up");
                    tokio::time::sleep(self.settle_delay).await;
                    if let Some(h) = handle.take() {
                        h.dismiss(true);
                    }
                    tracing::info!(home = %home.display(), "recovered VM home");
                    return Ok(home);
                }
                RecoveryState::Failed(err) => {
                    tracing::error!(error = %err, "recovery step failed");
                    emit(&handle, &err.to_string());
                    if let Some(h) = handle.take() {
                        h.dismiss(false);
                    }
                    self.surface.note(&err.to_string());
                    RecoveryState::NotFound
                }
                RecoveryState::Cancelled => {
                    if let Some(h) = handle.take() {
                        h.dismiss(false);
                    }
                    return Err(HomesteadError::ResourceNotFound {
                        name: self.config.resource.name.clone(),
                    });
                }
            };
        }
    }

    async fn ask_choice(&self) -> Result<RecoveryChoice, HomesteadError> {
        let prompter = Arc::clone(&self.prompter);
        let name = self.config.resource.name.clone();
        tokio::task::spawn_blocking(move || prompter.choose_recovery(&name))
            .await
            .map_err(join_err)?
    }

    async fn ask_directory(&self) -> Result<Option<String>, HomesteadError> {
        let prompter = Arc::clone(&self.prompter);
        tokio::task::spawn_blocking(move || prompter.directory())
            .await
            .map_err(join_err)?
    }
}

fn emit(handle: &Option<Box<dyn ProgressHandle>>, line: &str) {
    if let Some(h) = handle {
        h.log(line);
    }
}

fn join_err(e: tokio::task::JoinError) -> HomesteadError {
    HomesteadError::Prompt {
        message: e.to_string(),
    }
}
