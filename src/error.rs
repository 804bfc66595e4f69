use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HomesteadError {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("encountered problem while running \"{command}\"")]
    #[diagnostic(help("run `{command}` by hand to see the full output"))]
    DriverInvocation { command: String, subcommand: String },

    #[error("failed to start {program}")]
    #[diagnostic(help("is `{program}` installed and on PATH?"))]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot enter working directory {path}")]
    WorkingDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not find \"{name}\" VM")]
    #[diagnostic(help("run `vagrant global-status --prune` or point homestead at an existing checkout"))]
    ResourceNotFound { name: String },

    #[error("{step}: {message}")]
    RecoveryStep { step: String, message: String },

    #[error(transparent)]
    Detection(Arc<HomesteadError>),

    #[error("failed to save settings to {path}")]
    SettingsSave {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("prompt error: {message}")]
    Prompt { message: String },

    #[error("prompt cancelled")]
    Cancelled,

    #[error("control queue is closed")]
    ControllerClosed,
}

impl HomesteadError {
    /// The underlying error when this is a shared detection failure.
    pub fn root(&self) -> &HomesteadError {
        match self {
            HomesteadError::Detection(inner) => inner.root(),
            other => other,
        }
    }
}
