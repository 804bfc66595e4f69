//! Interactive questions asked during recovery.

use std::fmt;

use inquire::{Select, Text};

use crate::error::HomesteadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryChoice {
    /// Clone the template repository and bootstrap it.
    Clone,
    /// Point at an existing checkout.
    Locate,
    Cancel,
}

impl fmt::Display for RecoveryChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecoveryChoice::Clone => "Clone Homestead from GitHub",
            RecoveryChoice::Locate => "Show where Homestead is installed",
            RecoveryChoice::Cancel => "Cancel",
        })
    }
}

/// Blocking prompts. Callers run them on a blocking thread.
pub trait Prompter: Send + Sync {
    fn choose_recovery(&self, resource: &str) -> Result<RecoveryChoice, HomesteadError>;

    /// `None` when the user dismisses the question.
    fn directory(&self) -> Result<Option<String>, HomesteadError>;
}

/// Terminal prompts via inquire.
#[derive(Debug, Clone, Copy, Default)]
pub struct InquirePrompter;

impl Prompter for InquirePrompter {
    fn choose_recovery(&self, resource: &str) -> Result<RecoveryChoice, HomesteadError> {
        let options = vec![
            RecoveryChoice::Clone,
            RecoveryChoice::Locate,
            RecoveryChoice::Cancel,
        ];
        match Select::new(&format!("Could not find \"{resource}\" VM."), options).prompt() {
            Ok(choice) => Ok(choice),
            Err(e) => match map_inquire_err(e) {
                HomesteadError::Cancelled => Ok(RecoveryChoice::Cancel),
                other => Err(other),
            },
        }
    }

    fn directory(&self) -> Result<Option<String>, HomesteadError> {
        match Text::new("Please enter the full path to your Homestead directory:").prompt() {
            Ok(path) => Ok(Some(path)),
            Err(e) => match map_inquire_err(e) {
                HomesteadError::Cancelled => Ok(None),
                other => Err(other),
            },
        }
    }
}

/// Used when stdin is not a terminal: every question is dismissed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonInteractive;

impl Prompter for NonInteractive {
    fn choose_recovery(&self, resource: &str) -> Result<RecoveryChoice, HomesteadError> {
        tracing::info!(resource, "not a terminal, skipping recovery prompt");
        Ok(RecoveryChoice::Cancel)
    }

    fn directory(&self) -> Result<Option<String>, HomesteadError> {
        Ok(None)
    }
}

fn map_inquire_err(e: inquire::InquireError) -> HomesteadError {
    match e {
        inquire::InquireError::OperationCanceled | inquire::InquireError::OperationInterrupted => {
            HomesteadError::Cancelled
        }
        other => HomesteadError::Prompt {
            message: other.to_string(),
        },
    }
}
