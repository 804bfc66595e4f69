//! Clone-and-bootstrap steps.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::HomesteadError;
use crate::process::{CommandSpec, LineSink, ProcessRunner};

use super::rewrite::{self, NestError};

/// `git clone <template_repo> <data dir>/<name>`. A previous checkout that
/// already has a definition file is reused.
pub async fn clone_template(
    config: &Config,
    runner: &dyn ProcessRunner,
    on_line: LineSink<'_>,
) -> Result<PathBuf, HomesteadError> {
    let target = config.clone_dir();
    if target.join(&config.resource.definition_file).is_file() {
        on_line(&format!("Using existing checkout in {}", target.display()));
        return Ok(target);
    }

    let data_dir = config.data_dir();
    tokio::fs::create_dir_all(&data_dir)
        .await
        .map_err(|e| step_error("Cloning", format!("cannot create {}: {e}", data_dir.display())))?;

    let spec = CommandSpec::new("git").args([
        "clone".to_string(),
        config.recovery.template_repo.clone(),
        target.display().to_string(),
    ]);
    run_step("Cloning", runner, &spec, on_line).await?;
    Ok(target)
}

/// Run the checkout's own init script, which writes the global config file.
pub async fn run_bootstrap(
    runner: &dyn ProcessRunner,
    checkout: &Path,
    on_line: LineSink<'_>,
) -> Result<(), HomesteadError> {
    run_step("Bootstrapping", runner, &bootstrap_command(checkout), on_line).await
}

fn bootstrap_command(checkout: &Path) -> CommandSpec {
    let spec = if cfg!(windows) {
        CommandSpec::new("cmd").args(["/C", "init.bat"])
    } else {
        CommandSpec::new("bash").arg("init.sh")
    };
    spec.current_dir(checkout)
}

/// Point the global config's default source folder at the checkout, then
/// nest the definition file's body under the resource name.
pub async fn configure_files(
    config: &Config,
    checkout: &Path,
    on_line: LineSink<'_>,
) -> Result<(), HomesteadError> {
    const STEP: &str = "Configuring files";

    let global = config.global_config_path();
    let contents = tokio::fs::read_to_string(&global)
        .await
        .map_err(|e| step_error(STEP, format!("cannot read {}: {e}", global.display())))?;
    let (updated, count) = rewrite::substitute_source_token(
        &contents,
        &config.recovery.source_token,
        &checkout.display().to_string(),
    );
    if count == 0 {
        tracing::warn!(
            path = %global.display(),
            token = %config.recovery.source_token,
            "source token not found in global config"
        );
        on_line(&format!(
            "{} not found in {}, leaving it unchanged",
            config.recovery.source_token,
            global.display()
        ));
    } else {
        tokio::fs::write(&global, updated)
            .await
            .map_err(|e| step_error(STEP, format!("cannot write {}: {e}", global.display())))?;
        on_line(&format!("Updated {}", global.display()));
    }

    let definition = checkout.join(&config.resource.definition_file);
    let contents = tokio::fs::read_to_string(&definition)
        .await
        .map_err(|e| step_error(STEP, format!("cannot read {}: {e}", definition.display())))?;
    let name = &config.resource.name;
    match rewrite::nest_resource_block(&contents, name) {
        Ok(Some(nested)) => {
            tokio::fs::write(&definition, nested).await.map_err(|e| {
                step_error(STEP, format!("cannot write {}: {e}", definition.display()))
            })?;
            on_line(&format!("Defined \"{name}\" in {}", definition.display()));
        }
        Ok(None) => on_line(&format!("{} already defines \"{name}\"", definition.display())),
        Err(NestError::NoConfigureBlock) => {
            return Err(step_error(
                STEP,
                format!("no `Vagrant.configure ... do |config|` block in {}", definition.display()),
            ));
        }
        Err(NestError::Unterminated) => {
            return Err(step_error(
                STEP,
                format!("configure block in {} is never closed", definition.display()),
            ));
        }
    }
    Ok(())
}

async fn run_step(
    step: &str,
    runner: &dyn ProcessRunner,
    spec: &CommandSpec,
    on_line: LineSink<'_>,
) -> Result<(), HomesteadError> {
    on_line(&format!("$ {spec}"));
    let output = runner.run(spec, on_line).await.map_err(|e| step_error(step, e.to_string()))?;
    if output.success() {
        Ok(())
    } else {
        Err(step_error(
            step,
            format!("`{spec}` exited with {}", describe_code(output.code)),
        ))
    }
}

fn describe_code(code: Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_string(),
    }
}

fn step_error(step: &str, message: String) -> HomesteadError {
    HomesteadError::RecoveryStep {
        step: step.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    fn config_in(dir: &Path) -> Config {
        let mut config = Config::default();
        config.paths.data_dir = dir.join("data").display().to_string();
        config.paths.global_config = dir.join("Homestead.yaml").display().to_string();
        config
    }

    #[tokio::test]
    async fn clone_runs_git_into_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let runner = ScriptedRunner::new(|_| (0, String::new()));

        let target = clone_template(&config, &runner, &|_: &str| {}).await.unwrap();

        assert_eq!(target, dir.path().join("data").join("homestead"));
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "git");
        assert_eq!(calls[0].args[0], "clone");
        assert_eq!(calls[0].args[1], "https://github.com/laravel/homestead.git");
    }

    #[tokio::test]
    async fn clone_reuses_existing_checkout() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        std::fs::create_dir_all(config.clone_dir()).unwrap();
        std::fs::write(config.clone_dir().join("Vagrantfile"), "").unwrap();
        let runner = ScriptedRunner::new(|_| (0, String::new()));

        clone_template(&config, &runner, &|_: &str| {}).await.unwrap();
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_clone_is_step_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let runner = ScriptedRunner::new(|_| (128, "fatal: repository not found\n".into()));

        let err = clone_template(&config, &runner, &|_: &str| {}).await.unwrap_err();
        assert!(matches!(
            err,
            HomesteadError::RecoveryStep { ref step, .. } if step == "Cloning"
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn bootstrap_runs_init_script_in_checkout() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new(|_| (0, String::new()));

        run_bootstrap(&runner, dir.path(), &|_: &str| {}).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls[0].program, "bash");
        assert_eq!(calls[0].args, vec!["init.sh"]);
        assert_eq!(calls[0].cwd.as_deref(), Some(dir.path()));
    }

    #[tokio::test]
    async fn configure_rewrites_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let checkout = config.clone_dir();
        std::fs::create_dir_all(&checkout).unwrap();
        std::fs::write(
            config.global_config_path(),
            "folders:\n    - map: ~/Code\n      to: /home/vagrant/code\n",
        )
        .unwrap();
        std::fs::write(
            checkout.join("Vagrantfile"),
            "Vagrant.configure(\"2\") do |config|\n  config.vm.box = \"x\"\nend\n",
        )
        .unwrap();

        configure_files(&config, &checkout, &|_: &str| {}).await.unwrap();

        let global = std::fs::read_to_string(config.global_config_path()).unwrap();
        assert!(global.contains(&format!("map: \"{}\"", checkout.display())));
        let vagrantfile = std::fs::read_to_string(checkout.join("Vagrantfile")).unwrap();
        assert!(vagrantfile.contains("config.vm.define \"homestead\" do |homestead|"));
        assert!(vagrantfile.contains("homestead.vm.box = \"x\""));
    }

    #[tokio::test]
    async fn configure_without_global_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let checkout = config.clone_dir();
        std::fs::create_dir_all(&checkout).unwrap();

        let err = configure_files(&config, &checkout, &|_: &str| {}).await.unwrap_err();
        assert!(err.to_string().starts_with("Configuring files:"));
    }
}
