//! Lifecycle controller for the single managed VM.
//!
//! Every control operation goes through one FIFO consumed by a single worker
//! task, so at most one driver subprocess is in flight and operations run in
//! the order they were requested. After a successful operation the worker
//! re-reads the VM state before taking the next job.

use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{OnceCell, broadcast, mpsc, oneshot};

use crate::config::Config;
use crate::detect::{self, VmIdentity};
use crate::driver::{self, ControlOp};
use crate::error::HomesteadError;
use crate::logging::{self, OperationLog};
use crate::process::ProcessRunner;
use crate::progress::ProgressSurface;
use crate::prompt::Prompter;
use crate::recovery::{self, Recovery};
use crate::settings::{Settings, SettingsStore};
use crate::site::SiteConfig;
use crate::state::{Flag, StateFlags, StateTransition};

/// Collaborators supplied by the host.
#[derive(Clone)]
pub struct ControllerDeps {
    pub runner: Arc<dyn ProcessRunner>,
    pub prompter: Arc<dyn Prompter>,
    pub surface: Arc<dyn ProgressSurface>,
    pub settings: Arc<dyn SettingsStore>,
}

enum Job {
    Control {
        op: ControlOp,
        /// `None` for continuations the worker queued itself.
        reply: Option<oneshot::Sender<Result<(), HomesteadError>>>,
    },
    /// Answered with the first failure of a chained job since the last barrier.
    Barrier(oneshot::Sender<Option<HomesteadError>>),
}

struct Shared {
    config: Config,
    deps: ControllerDeps,
    identity: OnceCell<Result<VmIdentity, Arc<HomesteadError>>>,
    flags: Mutex<StateFlags>,
    transitions: broadcast::Sender<StateTransition>,
    site: OnceCell<SiteConfig>,
    settle_delay: Duration,
}

pub struct Controller {
    shared: Arc<Shared>,
    queue: mpsc::UnboundedSender<Job>,
}

impl Controller {
    /// Must be called inside a Tokio runtime: spawns the queue worker.
    pub fn new(config: Config, deps: ControllerDeps, settings: Settings) -> Self {
        Self::with_settle_delay(config, deps, settings, recovery::SETTLE_DELAY)
    }

    /// Like [`new`](Self::new) with a custom pause after a successful recovery.
    pub fn with_settle_delay(
        config: Config,
        deps: ControllerDeps,
        settings: Settings,
        settle_delay: Duration,
    ) -> Self {
        let mut flags = StateFlags::default();
        flags.assign(Flag::NeedsProvision, settings.needs_provision);
        let (transitions, _) = broadcast::channel(64);

        let shared = Arc::new(Shared {
            config,
            deps,
            identity: OnceCell::new(),
            flags: Mutex::new(flags),
            transitions,
            site: OnceCell::new(),
            settle_delay,
        });

        let (queue, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_queue(Arc::clone(&shared), rx));

        Self { shared, queue }
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn flags(&self) -> StateFlags {
        self.shared.flags()
    }

    /// Register changes, including ones that leave the flags unchanged.
    pub fn subscribe(&self) -> broadcast::Receiver<StateTransition> {
        self.shared.transitions.subscribe()
    }

    /// Find the VM. Runs once per controller; later calls share the outcome.
    pub async fn detect(&self) -> Result<VmIdentity, HomesteadError> {
        self.shared.identity().await
    }

    /// Ask the driver whether the VM is running and update the register.
    pub async fn check_state(&self) -> Result<bool, HomesteadError> {
        self.shared.check_state().await
    }

    /// Queue `op` behind everything already queued.
    ///
    /// The job is enqueued when this is called, not when the returned future
    /// is first polled.
    pub fn control(
        &self,
        op: ControlOp,
    ) -> impl Future<Output = Result<(), HomesteadError>> + Send + use<> {
        let (reply, settled) = oneshot::channel();
        let queued = self
            .queue
            .send(Job::Control {
                op,
                reply: Some(reply),
            })
            .is_ok();
        tracing::debug!(%op, queued, "enqueued control operation");
        async move {
            if !queued {
                return Err(HomesteadError::ControllerClosed);
            }
            settled.await.map_err(|_| HomesteadError::ControllerClosed)?
        }
    }

    /// Boot the VM, or restart it when it is already running.
    pub async fn start(&self) -> Result<(), HomesteadError> {
        self.detect().await?;
        let stopped = if self.flags().running() {
            let stop = self.control(ControlOp::Stop);
            let start = self.control(ControlOp::Start);
            let stopped = stop.await;
            start.await?;
            stopped
        } else {
            self.control(ControlOp::Start).await?;
            Ok(())
        };
        self.shared.update_flags(|f| f.set(Flag::Running));
        stopped
    }

    /// Halt the VM. Returns `false` when it was not running.
    pub async fn stop(&self) -> Result<bool, HomesteadError> {
        self.detect().await?;
        if !self.flags().running() {
            tracing::info!("VM is not running, nothing to stop");
            return Ok(false);
        }
        self.control(ControlOp::Stop).await?;
        self.shared.update_flags(|f| f.clear(Flag::Running));
        Ok(true)
    }

    /// Re-provision when flagged as stale. Returns `false` when there was
    /// nothing to do.
    pub async fn provision(&self) -> Result<bool, HomesteadError> {
        self.detect().await?;
        if !self.flags().needs_provision() {
            tracing::info!("VM does not need provisioning");
            return Ok(false);
        }
        self.control(ControlOp::Provision).await?;
        self.hide_provision_notice().await?;
        Ok(true)
    }

    pub async fn reload(&self) -> Result<(), HomesteadError> {
        self.control(ControlOp::Reload).await
    }

    /// Resolves once every job queued before this call, and anything those
    /// jobs chained, has settled.
    ///
    /// Chained jobs have no caller waiting on them, so the first one that
    /// failed since the previous `drain` is returned here.
    pub async fn drain(&self) -> Result<(), HomesteadError> {
        let (done, drained) = oneshot::channel();
        self.queue
            .send(Job::Barrier(done))
            .map_err(|_| HomesteadError::ControllerClosed)?;
        match drained.await.map_err(|_| HomesteadError::ControllerClosed)? {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Flag the VM as needing re-provisioning and persist it.
    pub async fn mark_needs_provision(&self) -> Result<(), HomesteadError> {
        self.shared.set_needs_provision(true).await
    }

    /// Clear the re-provisioning flag and persist it.
    pub async fn hide_provision_notice(&self) -> Result<(), HomesteadError> {
        self.shared.set_needs_provision(false).await
    }

    /// The VM's site config document, read from its home directory once.
    pub async fn load_site_config(&self) -> Result<&SiteConfig, HomesteadError> {
        let shared = &self.shared;
        shared
            .site
            .get_or_try_init(|| async {
                let identity = shared.identity().await?;
                SiteConfig::load(&identity.home.join(&shared.config.resource.site_config_file)).await
            })
            .await
    }

    /// Check that the driver can be executed; returns its version line.
    pub async fn check_prerequisites(&self) -> Result<String, HomesteadError> {
        let config = &self.shared.config;
        let spec = driver::version(config);
        let output = self
            .shared
            .deps
            .runner
            .run(&spec, &|line: &str| tracing::trace!("{line}"))
            .await?;
        if !output.success() {
            return Err(driver::invocation_error(config, "--version", ""));
        }
        Ok(output.output.lines().next().unwrap_or_default().trim().to_string())
    }
}

impl Shared {
    fn flags(&self) -> StateFlags {
        *self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_flags(&self, mutate: impl FnOnce(&mut StateFlags)) -> StateTransition {
        let transition = {
            let mut flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
            let old = *flags;
            mutate(&mut flags);
            flags.normalize();
            StateTransition { old, new: *flags }
        };
        if transition.changed() {
            tracing::debug!(old = %transition.old, new = %transition.new, "state changed");
        }
        // No subscribers is fine.
        let _ = self.transitions.send(transition);
        transition
    }

    async fn set_needs_provision(&self, value: bool) -> Result<(), HomesteadError> {
        let transition = self.update_flags(|f| f.assign(Flag::NeedsProvision, value));
        if transition.changed() {
            self.deps
                .settings
                .save(&Settings {
                    needs_provision: value,
                })
                .await?;
        }
        Ok(())
    }

    async fn identity(&self) -> Result<VmIdentity, HomesteadError> {
        let cached = self
            .identity
            .get_or_init(|| async {
                let recovery = Recovery::new(
                    &self.config,
                    self.deps.runner.as_ref(),
                    Arc::clone(&self.deps.prompter),
                    self.deps.surface.as_ref(),
                )
                .with_settle_delay(self.settle_delay);
                match detect::detect(&self.config, self.deps.runner.as_ref(), recovery).await {
                    Ok(found) => {
                        if let Some(running) = found.running {
                            self.update_flags(|f| f.assign(Flag::Running, running));
                        }
                        Ok(found.identity)
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "VM detection failed");
                        Err(Arc::new(e))
                    }
                }
            })
            .await;
        match cached {
            Ok(identity) => Ok(identity.clone()),
            Err(e) => Err(HomesteadError::Detection(Arc::clone(e))),
        }
    }

    async fn check_state(&self) -> Result<bool, HomesteadError> {
        let identity = self.identity().await?;
        let mut spec = driver::status(&self.config, &identity.id);
        // A recovered identity is only known by name, which the driver
        // resolves relative to the working directory.
        if identity.provider.is_none() {
            spec = spec.current_dir(&identity.home);
        }
        let output = self
            .deps
            .runner
            .run(&spec, &|line: &str| tracing::trace!("{line}"))
            .await?;
        if !output.success() {
            return Err(driver::invocation_error(&self.config, "status", &identity.id));
        }
        let running = driver::status_reports_running(&output.output);
        self.update_flags(|f| f.assign(Flag::Running, running));
        Ok(running)
    }

    async fn execute(&self, op: ControlOp) -> Result<(), HomesteadError> {
        let identity = self.identity().await?;
        let home = identity.home.as_path();
        enter_check(home).await?;

        if self.config.driver.elevate {
            match driver::reset_creator_uid(home, &self.config.resource.name).await {
                Ok(count) => tracing::debug!(count, "reset creator_uid markers"),
                Err(e) => tracing::warn!(error = %e, "could not reset creator_uid"),
            }
        }

        let spec = driver::control(&self.config, op, home);
        let logs_dir = self.config.logs_dir();
        let log = match OperationLog::create(&logs_dir, op.subcommand()) {
            Ok(log) => {
                log.write_line(&format!("$ {spec}"));
                Some(log)
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not create operation log");
                None
            }
        };

        tracing::info!(command = %spec, home = %home.display(), "{}", op.title());
        let handle = self.deps.surface.begin(op.title());
        let sink = |line: &str| {
            handle.log(line);
            if let Some(log) = &log {
                log.write_line(line);
            }
        };
        let result = self.deps.runner.run(&spec, &sink).await;
        let success = matches!(&result, Ok(output) if output.success());
        handle.dismiss(success);

        if let Some(log) = log {
            let path = log.finish(success);
            tracing::debug!(path = %path.display(), "operation log written");
            logging::rotate_operation_logs(&logs_dir, op.subcommand(), logging::KEEP_OPERATION_LOGS);
        }

        let output = result?;
        if !output.success() {
            return Err(driver::invocation_error(
                &self.config,
                op.subcommand(),
                &self.config.resource.name,
            ));
        }
        Ok(())
    }

    /// Follow-up after a successful operation. Returns an operation to run
    /// next, ahead of anything else queued.
    async fn settle(&self, op: ControlOp) -> Option<ControlOp> {
        match op {
            ControlOp::Start if self.flags().needs_provision() => return Some(ControlOp::Provision),
            ControlOp::Provision => {
                if let Err(e) = self.set_needs_provision(false).await {
                    tracing::warn!(error = %e, "could not persist provision state");
                }
            }
            _ => {}
        }
        if let Err(e) = self.check_state().await {
            tracing::warn!(error = %e, "state refresh failed");
        }
        None
    }
}

/// The VM home must be a directory we can list.
async fn enter_check(home: &Path) -> Result<(), HomesteadError> {
    tokio::fs::read_dir(home)
        .await
        .map(|_| ())
        .map_err(|source| HomesteadError::WorkingDirectory {
            path: home.display().to_string(),
            source,
        })
}

async fn run_queue(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<Job>) {
    let mut chained: VecDeque<Job> = VecDeque::new();
    let mut chained_failure: Option<HomesteadError> = None;
    loop {
        let job = match chained.pop_front() {
            Some(job) => job,
            None => match rx.recv().await {
                Some(job) => job,
                None => break,
            },
        };

        match job {
            Job::Barrier(done) => {
                let _ = done.send(chained_failure.take());
            }
            Job::Control { op, reply } => {
                let result = shared.execute(op).await;
                match &result {
                    Ok(()) => {
                        if let Some(next) = shared.settle(op).await {
                            tracing::info!(%op, %next, "chaining follow-up operation");
                            chained.push_back(Job::Control {
                                op: next,
                                reply: None,
                            });
                        }
                    }
                    Err(e) => tracing::error!(%op, error = %e, "control operation failed"),
                }
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            chained_failure.get_or_insert(e);
                        }
                    }
                }
            }
        }
    }
    tracing::debug!("control queue closed");
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use futures_util::future::join_all;

    use super::*;
    use crate::settings::MemorySettingsStore;
    use crate::testing::{RecordingSurface, ScriptedPrompter, ScriptedRunner};

    struct Fixture {
        _dir: tempfile::TempDir,
        home: PathBuf,
        config: Config,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("My Homestead");
        std::fs::create_dir(&home).unwrap();
        let mut config = Config::default();
        config.driver.elevate = false;
        config.paths.data_dir = dir.path().join("data").display().to_string();
        Fixture {
            _dir: dir,
            home,
            config,
        }
    }

    fn listing(home: &Path, state: &str) -> String {
        format!(
            "id       name      provider   state    directory\n\
             d21e8e6  homestead virtualbox {state} {}\n",
            home.display()
        )
    }

    /// Driver that lists the VM and answers every other command with `code(sub)`.
    fn driver(
        home: &Path,
        state: &str,
        code: impl Fn(&str) -> i32 + Send + Sync + 'static,
    ) -> ScriptedRunner {
        let listing = listing(home, state);
        ScriptedRunner::new(move |spec| {
            match spec.args.first().map(String::as_str).unwrap_or_default() {
                "global-status" => (0, listing.clone()),
                "status" => (0, "homestead                 running (virtualbox)\n".into()),
                sub => (code(sub), format!("==> homestead: {sub}\n")),
            }
        })
    }

    fn controller(
        config: &Config,
        runner: Arc<ScriptedRunner>,
        settings: Arc<MemorySettingsStore>,
        surface: RecordingSurface,
    ) -> Controller {
        let initial = settings.current();
        let deps = ControllerDeps {
            runner,
            prompter: Arc::new(ScriptedPrompter::new(Vec::new(), Vec::new())),
            surface: Arc::new(surface),
            settings,
        };
        Controller::with_settle_delay(config.clone(), deps, initial, Duration::ZERO)
    }

    fn control_lines(runner: &ScriptedRunner) -> Vec<String> {
        runner
            .command_lines()
            .into_iter()
            .filter(|l| !l.contains("status"))
            .collect()
    }

    #[tokio::test]
    async fn operations_run_one_at_a_time_in_order() {
        let fx = fixture();
        let delayed = Arc::new(
            driver(&fx.home, "running", |_| 0).with_delay(Duration::from_millis(10)),
        );
        let ctl = controller(
            &fx.config,
            Arc::clone(&delayed),
            Arc::default(),
            RecordingSurface::default(),
        );

        let ops = [
            ControlOp::Reload,
            ControlOp::Stop,
            ControlOp::Start,
            ControlOp::Provision,
        ];
        let pending: Vec<_> = ops.iter().map(|&op| ctl.control(op)).collect();
        for result in join_all(pending).await {
            result.unwrap();
        }

        assert_eq!(
            control_lines(&delayed),
            vec![
                "vagrant reload homestead",
                "vagrant halt homestead",
                "vagrant up homestead",
                "vagrant provision homestead",
            ]
        );
        assert_eq!(delayed.max_in_flight(), 1);
        for call in delayed.calls().iter().filter(|c| !c.args[0].contains("status")) {
            assert_eq!(call.cwd.as_deref(), Some(fx.home.as_path()));
        }
    }

    #[tokio::test]
    async fn failed_stop_leaves_state_alone() {
        let fx = fixture();
        let runner = Arc::new(driver(&fx.home, "running", |sub| if sub == "halt" { 1 } else { 0 }));
        let surface = RecordingSurface::default();
        let ctl = controller(&fx.config, Arc::clone(&runner), Arc::default(), surface.clone());

        let err = ctl.stop().await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "encountered problem while running \"vagrant halt homestead\""
        );
        assert!(ctl.flags().running());
        assert!(!runner.command_lines().iter().any(|l| l.starts_with("vagrant status")));
        assert_eq!(surface.titles(), vec!["Stopping VM"]);
        assert_eq!(surface.dismissals(), vec![false]);
    }

    #[tokio::test]
    async fn failed_job_does_not_block_later_jobs() {
        let fx = fixture();
        let runner = Arc::new(driver(&fx.home, "running", |sub| if sub == "reload" { 1 } else { 0 }));
        let ctl = controller(&fx.config, Arc::clone(&runner), Arc::default(), RecordingSurface::default());

        let first = ctl.control(ControlOp::Reload);
        let second = ctl.control(ControlOp::Stop);
        assert!(first.await.is_err());
        second.await.unwrap();
        assert_eq!(
            control_lines(&runner),
            vec!["vagrant reload homestead", "vagrant halt homestead"]
        );
    }

    #[tokio::test]
    async fn start_chains_provision_when_flagged() {
        let fx = fixture();
        let runner = Arc::new(driver(&fx.home, "poweroff", |_| 0));
        let settings = Arc::new(MemorySettingsStore::new(Settings {
            needs_provision: true,
        }));
        let ctl = controller(&fx.config, Arc::clone(&runner), Arc::clone(&settings), RecordingSurface::default());

        ctl.start().await.unwrap();
        ctl.drain().await.unwrap();

        assert_eq!(
            control_lines(&runner),
            vec!["vagrant up homestead", "vagrant provision homestead"]
        );
        assert!(ctl.flags().running());
        assert!(!ctl.flags().needs_provision());
        assert!(!settings.current().needs_provision);
        assert_eq!(settings.saves(), 1);
    }

    #[tokio::test]
    async fn failed_chained_provision_surfaces_from_drain() {
        let fx = fixture();
        let runner = Arc::new(driver(&fx.home, "poweroff", |sub| if sub == "provision" { 1 } else { 0 }));
        let settings = Arc::new(MemorySettingsStore::new(Settings {
            needs_provision: true,
        }));
        let ctl = controller(&fx.config, Arc::clone(&runner), Arc::clone(&settings), RecordingSurface::default());

        ctl.start().await.unwrap();
        let err = ctl.drain().await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "encountered problem while running \"vagrant provision homestead\""
        );
        assert_eq!(
            control_lines(&runner),
            vec!["vagrant up homestead", "vagrant provision homestead"]
        );
        assert!(ctl.flags().needs_provision());
        assert!(settings.current().needs_provision);

        // Reported once.
        ctl.drain().await.unwrap();
    }

    #[tokio::test]
    async fn start_while_running_restarts() {
        let fx = fixture();
        let runner = Arc::new(driver(&fx.home, "running", |_| 0));
        let ctl = controller(&fx.config, Arc::clone(&runner), Arc::default(), RecordingSurface::default());

        ctl.start().await.unwrap();

        assert_eq!(
            control_lines(&runner),
            vec!["vagrant halt homestead", "vagrant up homestead"]
        );
        assert!(ctl.flags().running());
    }

    #[tokio::test]
    async fn guards_skip_needless_operations() {
        let fx = fixture();
        let runner = Arc::new(driver(&fx.home, "poweroff", |_| 0));
        let ctl = controller(&fx.config, Arc::clone(&runner), Arc::default(), RecordingSurface::default());

        assert!(!ctl.stop().await.unwrap());
        assert!(!ctl.provision().await.unwrap());
        assert_eq!(runner.command_lines(), vec!["vagrant global-status"]);
    }

    #[tokio::test]
    async fn detection_runs_once() {
        let fx = fixture();
        let runner = Arc::new(driver(&fx.home, "poweroff", |_| 0));
        let ctl = controller(&fx.config, Arc::clone(&runner), Arc::default(), RecordingSurface::default());

        let (a, b) = tokio::join!(ctl.detect(), ctl.detect());
        assert_eq!(a.unwrap(), b.unwrap());
        assert!(ctl.check_state().await.unwrap());

        assert_eq!(
            runner.command_lines(),
            vec!["vagrant global-status", "vagrant status d21e8e6"]
        );
        assert!(ctl.flags().running());
    }

    #[tokio::test]
    async fn detection_failure_is_shared() {
        let fx = fixture();
        let runner = Arc::new(ScriptedRunner::new(|_| (1, String::new())));
        let ctl = controller(&fx.config, Arc::clone(&runner), Arc::default(), RecordingSurface::default());

        assert!(ctl.detect().await.is_err());
        let err = ctl.reload().await.unwrap_err();
        assert!(matches!(
            err.root(),
            HomesteadError::DriverInvocation { subcommand, .. } if subcommand == "global-status"
        ));
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn missing_home_is_working_directory_error() {
        let fx = fixture();
        let gone = fx.home.join("gone");
        let runner = Arc::new(driver(&gone, "running", |_| 0));
        let ctl = controller(&fx.config, Arc::clone(&runner), Arc::default(), RecordingSurface::default());

        let err = ctl.reload().await.unwrap_err();
        assert!(matches!(err, HomesteadError::WorkingDirectory { .. }));
        assert_eq!(runner.command_lines(), vec!["vagrant global-status"]);
    }

    #[tokio::test]
    async fn elevated_control_resets_creator_uid() {
        let mut fx = fixture();
        fx.config.driver.elevate = true;
        let marker = crate::paths::creator_uid_path(&fx.home, "homestead", "virtualbox");
        std::fs::create_dir_all(marker.parent().unwrap()).unwrap();
        std::fs::write(&marker, "1000").unwrap();

        let runner = Arc::new(driver(&fx.home, "running", |_| 0));
        let ctl = controller(&fx.config, Arc::clone(&runner), Arc::default(), RecordingSurface::default());
        ctl.reload().await.unwrap();

        assert_eq!(std::fs::read_to_string(&marker).unwrap(), "0");
        assert!(runner
            .command_lines()
            .contains(&"sudo -S vagrant reload homestead".to_string()));
    }

    #[tokio::test]
    async fn operation_output_is_logged_and_streamed() {
        let fx = fixture();
        let runner = Arc::new(driver(&fx.home, "running", |_| 0));
        let surface = RecordingSurface::default();
        let ctl = controller(&fx.config, Arc::clone(&runner), Arc::default(), surface.clone());

        ctl.reload().await.unwrap();

        assert!(surface.lines().contains(&"==> homestead: reload".to_string()));
        let logs = logging::list_operation_logs(&fx.config.logs_dir());
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].subcommand, "reload");
        assert_eq!(logs[0].outcome, logging::Outcome::Ok);
        let contents = std::fs::read_to_string(&logs[0].path).unwrap();
        assert!(contents.contains("==> homestead: reload"));
    }

    #[tokio::test]
    async fn stale_flag_is_published_and_persisted() {
        let fx = fixture();
        let runner = Arc::new(driver(&fx.home, "running", |_| 0));
        let settings = Arc::new(MemorySettingsStore::default());
        let ctl = controller(&fx.config, runner, Arc::clone(&settings), RecordingSurface::default());
        let mut transitions = ctl.subscribe();

        ctl.mark_needs_provision().await.unwrap();
        ctl.mark_needs_provision().await.unwrap();

        let first = transitions.recv().await.unwrap();
        assert!(first.changed());
        assert!(first.new.needs_provision());
        assert!(!transitions.recv().await.unwrap().changed());
        assert_eq!(settings.saves(), 1);
        assert!(settings.current().needs_provision);
    }

    #[tokio::test]
    async fn site_config_is_read_from_home() {
        let fx = fixture();
        std::fs::write(fx.home.join("config.yml"), "ip: \"192.168.10.10\"\n").unwrap();
        let runner = Arc::new(driver(&fx.home, "running", |_| 0));
        let ctl = controller(&fx.config, runner, Arc::default(), RecordingSurface::default());

        let site = ctl.load_site_config().await.unwrap();
        assert!(site.get("ip").is_some());
        assert_eq!(site.path(), fx.home.join("config.yml"));
    }

    #[tokio::test]
    async fn prerequisites_report_version() {
        let fx = fixture();
        let runner = Arc::new(ScriptedRunner::new(|_| (0, "Vagrant 2.4.1\n".into())));
        let ctl = controller(&fx.config, runner, Arc::default(), RecordingSurface::default());

        assert_eq!(ctl.check_prerequisites().await.unwrap(), "Vagrant 2.4.1");
    }
}
