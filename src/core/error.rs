//! Rotation failure taxonomy.

use crate::core::correlation::CorrelationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which directory call a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryPhase {
    Lookup,
    Add,
    Remove,
}

impl fmt::Display for DirectoryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DirectoryPhase::Lookup => "lookup",
            DirectoryPhase::Add => "add",
            DirectoryPhase::Remove => "remove",
        };
        f.write_str(s)
    }
}

/// Why a rotation attempt stopped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RotationError {
    #[error("configuration missing: {0}")]
    ConfigurationMissing(&'static str),
    #[error("event subject does not name an application")]
    MissingSubject,
    #[error("no stored secret for '{0}'")]
    SecretNotFound(String),
    #[error("reading stored secret failed: {0}")]
    StoreReadFailure(String),
    #[error(transparent)]
    MalformedCorrelation(#[from] CorrelationError),
    #[error("application '{0}' not found in directory")]
    ApplicationNotFound(String),
    #[error("directory {phase} call failed: {message}")]
    DirectoryCallFailure {
        phase: DirectoryPhase,
        message: String,
    },
    #[error("writing stored secret failed: {0}")]
    StoreWriteFailure(String),
    #[error("rotation already in progress for '{0}'")]
    RotationInProgress(String),
    #[error("rotation lock unavailable: {0}")]
    LockFailure(String),
}

impl RotationError {
    /// Stable machine-readable name, used in logs and the audit trail.
    pub fn kind(&self) -> &'static str {
        match self {
            RotationError::ConfigurationMissing(_) => "configuration_missing",
            RotationError::MissingSubject => "missing_subject",
            RotationError::SecretNotFound(_) => "secret_not_found",
            RotationError::StoreReadFailure(_) => "store_read_failure",
            RotationError::MalformedCorrelation(_) => "malformed_correlation",
            RotationError::ApplicationNotFound(_) => "application_not_found",
            RotationError::DirectoryCallFailure { .. } => "directory_call_failure",
            RotationError::StoreWriteFailure(_) => "store_write_failure",
            RotationError::RotationInProgress(_) => "rotation_in_progress",
            RotationError::LockFailure(_) => "lock_failure",
        }
    }
}
