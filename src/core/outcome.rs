//! Final state of one rotation attempt.

use crate::core::error::RotationError;
use crate::models::credential::{DirectoryCredential, KeyId};
use chrono::{DateTime, Utc};

/// What a rotation attempt left behind.
///
/// Only `Rotated` restores the store/directory invariant. `AddUnconfirmed`,
/// `PartialOrphan` and `Inconsistent` mean the directory may have changed and
/// an operator has to reconcile.
#[derive(Debug, Clone)]
pub enum RotationOutcome {
    Rotated {
        application_id: String,
        previous_key_id: KeyId,
        new_key_id: KeyId,
        expires_on: DateTime<Utc>,
    },
    /// Nothing was changed in the directory or the store.
    Aborted {
        application_id: Option<String>,
        reason: RotationError,
    },
    /// The directory accepted the add call but its answer was unusable. A
    /// credential may be live under `new_key_id` (unknown when `None`); the
    /// previous one and the store were left untouched.
    AddUnconfirmed {
        application_id: String,
        previous_key_id: KeyId,
        new_key_id: Option<KeyId>,
        error: RotationError,
    },
    /// A new credential exists in the directory, the previous one could not
    /// be removed, and the store was left untouched.
    PartialOrphan {
        application_id: String,
        previous_key_id: KeyId,
        new_key_id: KeyId,
        error: RotationError,
    },
    /// The directory rotated but the store write failed: the store still
    /// holds the revoked secret.
    Inconsistent {
        application_id: String,
        previous_key_id: KeyId,
        new_credential: DirectoryCredential,
        error: RotationError,
    },
}

impl RotationOutcome {
    pub fn aborted(application_id: Option<&str>, reason: RotationError) -> Self {
        RotationOutcome::Aborted {
            application_id: application_id.map(str::to_string),
            reason,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            RotationOutcome::Rotated { .. } => "rotated",
            RotationOutcome::Aborted { .. } => "aborted",
            RotationOutcome::AddUnconfirmed { .. } => "add_unconfirmed",
            RotationOutcome::PartialOrphan { .. } => "partial_orphan",
            RotationOutcome::Inconsistent { .. } => "inconsistent",
        }
    }

    pub fn application_id(&self) -> Option<&str> {
        match self {
            RotationOutcome::Rotated { application_id, .. }
            | RotationOutcome::AddUnconfirmed { application_id, .. }
            | RotationOutcome::PartialOrphan { application_id, .. }
            | RotationOutcome::Inconsistent { application_id, .. } => Some(application_id),
            RotationOutcome::Aborted { application_id, .. } => application_id.as_deref(),
        }
    }

    pub fn previous_key_id(&self) -> Option<&KeyId> {
        match self {
            RotationOutcome::Rotated {
                previous_key_id, ..
            }
            | RotationOutcome::AddUnconfirmed {
                previous_key_id, ..
            }
            | RotationOutcome::PartialOrphan {
                previous_key_id, ..
            }
            | RotationOutcome::Inconsistent {
                previous_key_id, ..
            } => Some(previous_key_id),
            RotationOutcome::Aborted { .. } => None,
        }
    }

    /// Key id of a credential this attempt created, if any.
    pub fn new_key_id(&self) -> Option<&KeyId> {
        match self {
            RotationOutcome::Rotated { new_key_id, .. }
            | RotationOutcome::PartialOrphan { new_key_id, .. } => Some(new_key_id),
            RotationOutcome::Inconsistent { new_credential, .. } => Some(&new_credential.key_id),
            RotationOutcome::AddUnconfirmed { new_key_id, .. } => new_key_id.as_ref(),
            RotationOutcome::Aborted { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&RotationError> {
        match self {
            RotationOutcome::Rotated { .. } => None,
            RotationOutcome::Aborted { reason, .. } => Some(reason),
            RotationOutcome::AddUnconfirmed { error, .. }
            | RotationOutcome::PartialOrphan { error, .. }
            | RotationOutcome::Inconsistent { error, .. } => Some(error),
        }
    }

    pub fn is_rotated(&self) -> bool {
        matches!(self, RotationOutcome::Rotated { .. })
    }

    /// The directory was changed but the pair is not consistent.
    pub fn needs_reconciliation(&self) -> bool {
        matches!(
            self,
            RotationOutcome::AddUnconfirmed { .. }
                | RotationOutcome::PartialOrphan { .. }
                | RotationOutcome::Inconsistent { .. }
        )
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            RotationOutcome::Rotated { .. } => 0,
            RotationOutcome::Aborted { .. } => 2,
            RotationOutcome::AddUnconfirmed { .. }
            | RotationOutcome::PartialOrphan { .. }
            | RotationOutcome::Inconsistent { .. } => 3,
        }
    }
}
