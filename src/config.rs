use std::path::{Path, PathBuf};

use facet::Facet;

use crate::error::HomesteadError;
use crate::paths;

#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct Config {
    #[facet(default)]
    pub driver: DriverConfig,
    #[facet(default)]
    pub resource: ResourceConfig,
    #[facet(default)]
    pub recovery: RecoveryConfig,
    #[facet(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct DriverConfig {
    #[facet(default = "vagrant")]
    pub binary: String,
    /// Run control sub-commands (`up`, `halt`, ...) through `sudo -S`.
    #[facet(default = true)]
    pub elevate: bool,
    #[facet(default = "sudo")]
    pub sudo: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            binary: "vagrant".into(),
            elevate: true,
            sudo: "sudo".into(),
        }
    }
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct ResourceConfig {
    #[facet(default = "homestead")]
    pub name: String,
    #[facet(default = "Vagrantfile")]
    pub definition_file: String,
    #[facet(default = "config.yml")]
    pub site_config_file: String,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            name: "homestead".into(),
            definition_file: "Vagrantfile".into(),
            site_config_file: "config.yml".into(),
        }
    }
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct RecoveryConfig {
    #[facet(default = "https://github.com/laravel/homestead.git")]
    pub template_repo: String,
    /// Placeholder source path in the stock global config, replaced by the clone path.
    #[facet(default = "~/Code")]
    pub source_token: String,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            template_repo: "https://github.com/laravel/homestead.git".into(),
            source_token: "~/Code".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct PathsConfig {
    #[facet(default)]
    pub data_dir: String,
    #[facet(default)]
    pub global_config: String,
}

impl Config {
    /// Directory holding settings, logs and the template clone.
    pub fn data_dir(&self) -> PathBuf {
        if self.paths.data_dir.is_empty() {
            paths::default_data_dir()
        } else {
            paths::expand_home(&self.paths.data_dir)
        }
    }

    /// The driver's global config file (`~/.homestead/Homestead.yaml` by default).
    pub fn global_config_path(&self) -> PathBuf {
        if self.paths.global_config.is_empty() {
            paths::default_global_config()
        } else {
            paths::expand_home(&self.paths.global_config)
        }
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir().join("settings.toml")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }

    /// Where the clone-and-bootstrap recovery puts the template checkout.
    pub fn clone_dir(&self) -> PathBuf {
        self.data_dir().join(&self.resource.name)
    }
}

// ── validation ────────────────────────────────────────────

fn validate_config(config: &Config) -> Result<(), HomesteadError> {
    if config.driver.binary.trim().is_empty() {
        return Err(HomesteadError::Validation {
            message: "driver.binary must not be empty".into(),
        });
    }
    if config.driver.elevate && config.driver.sudo.trim().is_empty() {
        return Err(HomesteadError::Validation {
            message: "driver.sudo must not be empty when driver.elevate is set".into(),
        });
    }
    validate_name(&config.resource.name)?;
    if config.resource.definition_file.is_empty() {
        return Err(HomesteadError::Validation {
            message: "resource.definition_file must not be empty".into(),
        });
    }
    if config.recovery.template_repo.is_empty() {
        return Err(HomesteadError::Validation {
            message: "recovery.template_repo must not be empty".into(),
        });
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<(), HomesteadError> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');
    if !valid {
        return Err(HomesteadError::Validation {
            message: format!("resource.name must match [a-zA-Z0-9][a-zA-Z0-9._-]* (got '{name}')"),
        });
    }
    Ok(())
}

// ── public API ────────────────────────────────────────────

pub fn parse_config(contents: &str, path: &Path) -> Result<Config, HomesteadError> {
    let config: Config = facet_toml::from_str(contents).map_err(|e| HomesteadError::ConfigParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    validate_config(&config)?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config, HomesteadError> {
    let contents = std::fs::read_to_string(path).map_err(|source| HomesteadError::ConfigLoad {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&contents, path)
}

/// Load an explicit config file, or fall back to the per-user file, or defaults.
pub fn resolve_config(explicit: Option<&Path>) -> Result<Config, HomesteadError> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    let default_path = paths::default_config_file();
    if default_path.is_file() {
        tracing::debug!(path = %default_path.display(), "loading user config");
        load_config(&default_path)
    } else {
        Ok(Config::default())
    }
}
