//! Entry point per expiration event.
//!
//! Reads the stored secret, rotates the directory credential it points at,
//! and writes the new secret back. The store is only ever written after the
//! directory handed back a complete new credential and the previous one was
//! removed.

use crate::core::audit_log::AuditTrail;
use crate::core::directory::Directory;
use crate::core::error::{DirectoryPhase, RotationError};
use crate::core::lock::{FileLock, RotationLocks};
use crate::core::outcome::RotationOutcome;
use crate::core::rotator::{DirectoryRotator, RotateResult};
use crate::core::secret_store::{SecretStore, SecretStoreClient};
use crate::models::config::RotatorConfig;
use crate::models::credential::KeyId;
use crate::models::event::ExpirationEvent;
use crate::models::secret::StoredSecret;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

pub struct Orchestrator {
    vault_endpoint: Option<String>,
    store: SecretStoreClient,
    rotator: DirectoryRotator,
    locks: Option<RotationLocks>,
    audit: Option<AuditTrail>,
}

impl Orchestrator {
    pub fn new(
        config: &RotatorConfig,
        store: Arc<dyn SecretStore>,
        directory: Arc<dyn Directory>,
    ) -> Self {
        Self {
            vault_endpoint: config.vault_endpoint().map(str::to_string),
            store: SecretStoreClient::new(store),
            rotator: DirectoryRotator::new(directory, config.rotation.clone()),
            locks: None,
            audit: None,
        }
    }

    /// Serialize rotations per application through lock files.
    pub fn with_locks(mut self, locks: RotationLocks) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Record every outcome in the audit trail.
    pub fn with_audit(mut self, audit: AuditTrail) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Handle one expiration event. Never fails: every way this can end is a
    /// variant of `RotationOutcome`.
    pub async fn handle_expiration_event(&self, event: &ExpirationEvent) -> RotationOutcome {
        info!(
            event_id = %event.id,
            topic = %event.topic,
            subject = %event.subject,
            event_type = %event.event_type,
            event_time = %event.event_time,
            "received expiration event"
        );

        let span = info_span!("rotation", event_id = %event.id);
        let outcome = self.run(event).instrument(span).await;
        self.report(event, &outcome);
        outcome
    }

    async fn run(&self, event: &ExpirationEvent) -> RotationOutcome {
        if self.vault_endpoint.is_none() {
            return RotationOutcome::aborted(
                None,
                RotationError::ConfigurationMissing("vault.endpoint"),
            );
        }

        let Some(application_id) = event.application_id() else {
            return RotationOutcome::aborted(None, RotationError::MissingSubject);
        };

        // held until this function returns, whichever branch that is
        let _guard = match self.acquire_lock(application_id) {
            Ok(guard) => guard,
            Err(reason) => return RotationOutcome::aborted(Some(application_id), reason),
        };

        let previous = match self.store.get_secret(application_id).await {
            Ok(secret) => secret,
            Err(reason) => return RotationOutcome::aborted(Some(application_id), reason),
        };
        let previous_key_id = previous.correlation_id.clone();
        info!(
            application_id,
            previous_key_id = %previous_key_id,
            previous_expires_on = ?previous.expires_on,
            "previous secret located"
        );
        drop(previous);

        let credential = match self.rotator.rotate(application_id, &previous_key_id).await {
            RotateResult::Rotated(credential) => credential,
            RotateResult::ApplicationNotFound => {
                return RotationOutcome::aborted(
                    Some(application_id),
                    RotationError::ApplicationNotFound(application_id.to_string()),
                );
            }
            RotateResult::Failed { phase, error } => {
                return RotationOutcome::aborted(
                    Some(application_id),
                    RotationError::DirectoryCallFailure {
                        phase,
                        message: error.to_string(),
                    },
                );
            }
            RotateResult::AddUnconfirmed { key_id, error } => {
                return RotationOutcome::AddUnconfirmed {
                    application_id: application_id.to_string(),
                    previous_key_id,
                    new_key_id: key_id,
                    error: RotationError::DirectoryCallFailure {
                        phase: DirectoryPhase::Add,
                        message: error.to_string(),
                    },
                };
            }
            RotateResult::PartiallyApplied { orphan, error } => {
                return RotationOutcome::PartialOrphan {
                    application_id: application_id.to_string(),
                    previous_key_id,
                    new_key_id: orphan.key_id.clone(),
                    error: RotationError::DirectoryCallFailure {
                        phase: DirectoryPhase::Remove,
                        message: error.to_string(),
                    },
                };
            }
        };

        let new_secret = StoredSecret::from_credential(&credential);
        match self.store.set_secret(application_id, &new_secret).await {
            Ok(()) => RotationOutcome::Rotated {
                application_id: application_id.to_string(),
                previous_key_id,
                new_key_id: credential.key_id.clone(),
                expires_on: credential.end_date_time,
            },
            // not retried and not rolled back: the directory already revoked
            // the previous credential
            Err(error) => RotationOutcome::Inconsistent {
                application_id: application_id.to_string(),
                previous_key_id,
                new_credential: credential,
                error,
            },
        }
    }

    fn acquire_lock(&self, application_id: &str) -> Result<Option<FileLock>, RotationError> {
        let Some(locks) = &self.locks else {
            return Ok(None);
        };
        match locks.try_acquire(application_id) {
            Ok(Some(lock)) => Ok(Some(lock)),
            Ok(None) => Err(RotationError::RotationInProgress(application_id.to_string())),
            Err(e) => Err(RotationError::LockFailure(format!("{:#}", e))),
        }
    }

    fn report(&self, event: &ExpirationEvent, outcome: &RotationOutcome) {
        let application_id = outcome.application_id().unwrap_or("-");
        match outcome {
            RotationOutcome::Rotated {
                new_key_id,
                expires_on,
                ..
            } => info!(
                application_id,
                new_key_id = %new_key_id,
                expires_on = %expires_on,
                "client secret rotated"
            ),
            RotationOutcome::Aborted { reason, .. } => warn!(
                application_id,
                reason = reason.kind(),
                error = %reason,
                "rotation aborted; nothing changed"
            ),
            RotationOutcome::AddUnconfirmed {
                new_key_id, error, ..
            } => error!(
                application_id,
                new_key_id = new_key_id.as_ref().map(KeyId::as_str).unwrap_or("unknown"),
                error = %error,
                "directory may hold an unconfirmed credential; stored secret unchanged"
            ),
            RotationOutcome::PartialOrphan {
                new_key_id, error, ..
            } => error!(
                application_id,
                orphan_key_id = %new_key_id,
                error = %error,
                "rotation left an orphaned credential; stored secret unchanged"
            ),
            RotationOutcome::Inconsistent {
                new_credential,
                error,
                ..
            } => error!(
                application_id,
                new_key_id = %new_credential.key_id,
                error = %error,
                "directory rotated but stored secret is stale; new secret text discarded, \
                 issue a credential by hand and remove the stale key"
            ),
        }

        if let Some(audit) = &self.audit {
            if let Err(e) = audit.record(&event.id, outcome) {
                let message = format!("{:#}", e);
                warn!(error = %message, "failed to record audit entry");
            }
        }
    }
}
