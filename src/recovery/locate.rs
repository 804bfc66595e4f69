//! Checks for a user-supplied existing checkout.

use std::path::{Path, PathBuf};

use crate::error::HomesteadError;

/// Trim whitespace and one trailing path separator. A bare `/` is kept.
pub fn normalize_input(raw: &str) -> PathBuf {
    let trimmed = raw.trim();
    let stripped = trimmed
        .strip_suffix('/')
        .or_else(|| trimmed.strip_suffix('\\'))
        .filter(|s| !s.is_empty())
        .unwrap_or(trimmed);
    PathBuf::from(stripped)
}

pub async fn check_directory(dir: &Path) -> Result<(), HomesteadError> {
    if is_dir(dir).await {
        Ok(())
    } else {
        Err(step_error(
            "Validating path",
            format!("{} is not a directory", dir.display()),
        ))
    }
}

pub async fn check_definition(dir: &Path, definition_file: &str) -> Result<(), HomesteadError> {
    if is_file(&dir.join(definition_file)).await {
        Ok(())
    } else {
        Err(step_error(
            "Validating Vagrantfile",
            format!("no {definition_file} found in {}", dir.display()),
        ))
    }
}

pub async fn check_global_config(path: &Path) -> Result<(), HomesteadError> {
    if is_file(path).await {
        Ok(())
    } else {
        Err(step_error(
            "Validating Homestead config",
            format!("could not locate configuration file {}", path.display()),
        ))
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir())
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file())
}

fn step_error(step: &str, message: String) -> HomesteadError {
    HomesteadError::RecoveryStep {
        step: step.to_string(),
        message,
    }
}
