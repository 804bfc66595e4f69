//! The VM's site/folder configuration, kept as an opaque YAML document.

use std::path::{Path, PathBuf};

use facet_value::Value;

use crate::error::HomesteadError;

#[derive(Debug, Clone)]
pub struct SiteConfig {
    path: PathBuf,
    document: Value,
}

impl SiteConfig {
    pub async fn load(path: &Path) -> Result<Self, HomesteadError> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| HomesteadError::ConfigLoad {
                    path: path.display().to_string(),
                    source,
                })?;
        let document = parse_document(&contents, path)?;
        tracing::debug!(path = %path.display(), "loaded site config");
        Ok(Self {
            path: path.to_path_buf(),
            document,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Top-level key lookup; `None` when the document is not a mapping.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.document.as_object()?.get(key)
    }

    pub fn to_yaml(&self) -> Result<String, HomesteadError> {
        facet_yaml::to_string(&self.document).map_err(|e| HomesteadError::ConfigParse {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })
    }
}

fn parse_document(contents: &str, path: &Path) -> Result<Value, HomesteadError> {
    facet_yaml::from_str::<Value>(contents).map_err(|e| HomesteadError::ConfigParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
