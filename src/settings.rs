//! Host settings that must survive restarts.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use facet::Facet;
use futures_util::future::BoxFuture;

use crate::error::HomesteadError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Facet)]
#[facet(default)]
pub struct Settings {
    #[facet(default)]
    pub needs_provision: bool,
}

/// Persistence for [`Settings`]; `save` is asynchronous so hosts can write
/// wherever they like.
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<Settings, HomesteadError>;

    fn save<'a>(&'a self, settings: &'a Settings) -> BoxFuture<'a, Result<(), HomesteadError>>;
}

/// TOML file under the data directory.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Result<Settings, HomesteadError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Settings::default()),
            Err(source) => {
                return Err(HomesteadError::ConfigLoad {
                    path: self.path.display().to_string(),
                    source,
                });
            }
        };
        facet_toml::from_str(&contents).map_err(|e| HomesteadError::ConfigParse {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })
    }

    fn save<'a>(&'a self, settings: &'a Settings) -> BoxFuture<'a, Result<(), HomesteadError>> {
        Box::pin(async move {
            let save_err = |source: std::io::Error| HomesteadError::SettingsSave {
                path: self.path.display().to_string(),
                source,
            };
            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(save_err)?;
            }
            tokio::fs::write(&self.path, render_settings(settings))
                .await
                .map_err(save_err)?;
            tracing::debug!(path = %self.path.display(), ?settings, "saved settings");
            Ok(())
        })
    }
}

fn render_settings(settings: &Settings) -> String {
    let mut out = String::from("# Managed by homestead. Edits are overwritten.\n");
    out.push_str(&format!("needs_provision = {}\n", settings.needs_provision));
    out
}

/// Keeps settings in memory only; `saves()` counts writes.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    current: Mutex<Settings>,
    saves: Mutex<usize>,
}

impl MemorySettingsStore {
    pub fn new(initial: Settings) -> Self {
        Self {
            current: Mutex::new(initial),
            saves: Mutex::new(0),
        }
    }

    pub fn current(&self) -> Settings {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn saves(&self) -> usize {
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<Settings, HomesteadError> {
        Ok(self.current())
    }

    fn save<'a>(&'a self, settings: &'a Settings) -> BoxFuture<'a, Result<(), HomesteadError>> {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = settings.clone();
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Box::pin(async { Ok(()) })
    }
}
