//! Two-phase credential swap against the directory: add the new password
//! credential, then remove the previous one.
//!
//! Between the two calls the application holds both credentials, so anything
//! still using the old secret keeps working while the new one propagates.

use crate::core::directory::{Directory, DirectoryError};
use crate::core::error::DirectoryPhase;
use crate::models::config::RotationSection;
use crate::models::credential::{DirectoryCredential, KeyId, PasswordCredentialRequest};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result of one rotation attempt against the directory.
#[derive(Debug)]
pub enum RotateResult {
    /// New credential added and previous one removed.
    Rotated(DirectoryCredential),
    /// Application does not exist; nothing was changed.
    ApplicationNotFound,
    /// Failed before anything was added; nothing was changed.
    Failed {
        phase: DirectoryPhase,
        error: DirectoryError,
    },
    /// The add call was accepted but its answer is unusable. A credential
    /// may be live under `key_id` (unknown when `None`); nothing was removed.
    AddUnconfirmed {
        key_id: Option<KeyId>,
        error: DirectoryError,
    },
    /// The new credential was added but the previous one could not be
    /// removed. `orphan` is live in the directory and referenced nowhere else.
    PartiallyApplied {
        orphan: DirectoryCredential,
        error: DirectoryError,
    },
}

pub struct DirectoryRotator {
    directory: Arc<dyn Directory>,
    policy: RotationSection,
}

impl DirectoryRotator {
    pub fn new(directory: Arc<dyn Directory>, policy: RotationSection) -> Self {
        Self { directory, policy }
    }

    pub fn policy(&self) -> &RotationSection {
        &self.policy
    }

    /// Request for a credential valid for the configured window from `now`.
    pub fn credential_request(&self, now: DateTime<Utc>) -> PasswordCredentialRequest {
        PasswordCredentialRequest {
            display_name: self.policy.display_name.clone(),
            end_date_time: now + Duration::days(i64::from(self.policy.validity_days)),
        }
    }

    pub async fn rotate(&self, application_id: &str, previous_key_id: &KeyId) -> RotateResult {
        self.rotate_at(application_id, previous_key_id, Utc::now())
            .await
    }

    pub async fn rotate_at(
        &self,
        application_id: &str,
        previous_key_id: &KeyId,
        now: DateTime<Utc>,
    ) -> RotateResult {
        info!(application_id, previous_key_id = %previous_key_id, "rotating client secret");

        let application = match self.directory.get_application(application_id).await {
            Ok(app) => app,
            Err(DirectoryError::NotFound(_)) => {
                warn!(application_id, "application not found in directory");
                return RotateResult::ApplicationNotFound;
            }
            Err(error) => {
                error!(application_id, error = %error, "application lookup failed");
                return RotateResult::Failed {
                    phase: DirectoryPhase::Lookup,
                    error,
                };
            }
        };
        debug!(
            application_id,
            display_name = application.display_name.as_deref().unwrap_or("-"),
            "application resolved"
        );

        let request = self.credential_request(now);
        let credential = match self.directory.add_password(application_id, &request).await {
            Ok(credential) => credential,
            Err(DirectoryError::Unconfirmed { key_id, message }) => {
                error!(
                    application_id,
                    key_id = key_id.as_ref().map(KeyId::as_str).unwrap_or("-"),
                    error = %message,
                    "password credential added but response unusable"
                );
                return RotateResult::AddUnconfirmed {
                    key_id: key_id.clone(),
                    error: DirectoryError::Unconfirmed { key_id, message },
                };
            }
            Err(error) => {
                error!(application_id, error = %error, "adding password credential failed");
                return RotateResult::Failed {
                    phase: DirectoryPhase::Add,
                    error,
                };
            }
        };

        if &credential.key_id == previous_key_id {
            // removing it now would revoke the only credential we know about
            error!(
                application_id,
                key_id = %credential.key_id,
                "directory returned the previous key id for the new credential"
            );
            return RotateResult::AddUnconfirmed {
                key_id: Some(credential.key_id.clone()),
                error: DirectoryError::InvalidResponse(format!(
                    "new credential reuses previous key id {}",
                    previous_key_id
                )),
            };
        }
        debug!(
            application_id,
            new_key_id = %credential.key_id,
            end_date_time = %credential.end_date_time,
            "credential added"
        );

        if let Err(error) = self
            .directory
            .remove_password(application_id, previous_key_id)
            .await
        {
            error!(
                application_id,
                previous_key_id = %previous_key_id,
                orphan_key_id = %credential.key_id,
                error = %error,
                "removing previous credential failed; new credential is orphaned"
            );
            return RotateResult::PartiallyApplied {
                orphan: credential,
                error,
            };
        }

        info!(
            application_id,
            new_key_id = %credential.key_id,
            "previous credential removed"
        );
        RotateResult::Rotated(credential)
    }
}
