//! Identity directory boundary.

use crate::models::credential::{
    Application, DirectoryCredential, KeyId, PasswordCredentialRequest,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use zeroize::Zeroizing;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("'{0}' not found")]
    NotFound(String),
    #[error("directory rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("directory unreachable: {0}")]
    Transport(String),
    #[error("directory authentication failed: {0}")]
    Auth(String),
    #[error("unexpected directory response: {0}")]
    InvalidResponse(String),
    /// The directory accepted the change but its answer could not be used.
    /// `key_id` is set when the response still named the credential.
    #[error("change applied but response unusable: {message}")]
    Unconfirmed {
        key_id: Option<KeyId>,
        message: String,
    },
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn get_application(&self, application_id: &str) -> Result<Application, DirectoryError>;

    /// Attach a new password credential. The directory picks the key id and
    /// generates the secret text.
    async fn add_password(
        &self,
        application_id: &str,
        request: &PasswordCredentialRequest,
    ) -> Result<DirectoryCredential, DirectoryError>;

    async fn remove_password(
        &self,
        application_id: &str,
        key_id: &KeyId,
    ) -> Result<(), DirectoryError>;
}

/// A mutating call observed by `MemoryDirectory`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryCall {
    Add { application_id: String },
    Remove { application_id: String, key_id: KeyId },
}

#[derive(Default)]
struct MemoryApplication {
    application: Application,
    credentials: Vec<DirectoryCredential>,
}

/// In-process directory with failure injection.
#[derive(Default)]
pub struct MemoryDirectory {
    applications: Mutex<HashMap<String, MemoryApplication>>,
    next_credentials: Mutex<VecDeque<(KeyId, String)>>,
    calls: Mutex<Vec<DirectoryCall>>,
    counter: AtomicU64,
    fail_lookup: AtomicBool,
    fail_add: AtomicBool,
    unconfirm_add: AtomicBool,
    fail_remove: AtomicBool,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_application(self, application_id: &str) -> Self {
        self.lock_apps().insert(
            application_id.to_string(),
            MemoryApplication {
                application: Application {
                    id: application_id.to_string(),
                    app_id: None,
                    display_name: Some(format!("{} (memory)", application_id)),
                },
                credentials: Vec::new(),
            },
        );
        self
    }

    /// Seed an existing live credential on an application.
    pub fn with_credential(self, application_id: &str, key_id: &str, secret: &str) -> Self {
        if let Some(app) = self.lock_apps().get_mut(application_id) {
            app.credentials.push(DirectoryCredential {
                key_id: KeyId::parse(key_id).unwrap_or_else(|_| self.generated_key_id()),
                secret_text: Zeroizing::new(secret.to_string()),
                display_name: None,
                start_date_time: Some(Utc::now()),
                end_date_time: Utc::now(),
            });
        }
        self
    }

    /// Key id and secret text the next add call will return.
    pub fn queue_credential(&self, key_id: KeyId, secret_text: &str) {
        self.next_credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back((key_id, secret_text.to_string()));
    }

    pub fn fail_lookup(&self, fail: bool) {
        self.fail_lookup.store(fail, Ordering::SeqCst);
    }

    pub fn fail_add(&self, fail: bool) {
        self.fail_add.store(fail, Ordering::SeqCst);
    }

    /// Add the credential but answer as if the response was unreadable.
    pub fn unconfirm_add(&self, unconfirm: bool) {
        self.unconfirm_add.store(unconfirm, Ordering::SeqCst);
    }

    pub fn fail_remove(&self, fail: bool) {
        self.fail_remove.store(fail, Ordering::SeqCst);
    }

    /// Key ids of the live credentials on an application.
    pub fn key_ids(&self, application_id: &str) -> Vec<KeyId> {
        self.lock_apps()
            .get(application_id)
            .map(|app| app.credentials.iter().map(|c| c.key_id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<DirectoryCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record_call(&self, call: DirectoryCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn lock_apps(&self) -> std::sync::MutexGuard<'_, HashMap<String, MemoryApplication>> {
        self.applications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn generated_key_id(&self) -> KeyId {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        KeyId(format!("generated-key-{}", n))
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn get_application(&self, application_id: &str) -> Result<Application, DirectoryError> {
        if self.fail_lookup.load(Ordering::SeqCst) {
            return Err(DirectoryError::Transport("injected lookup failure".into()));
        }
        self.lock_apps()
            .get(application_id)
            .map(|app| app.application.clone())
            .ok_or_else(|| DirectoryError::NotFound(application_id.to_string()))
    }

    async fn add_password(
        &self,
        application_id: &str,
        request: &PasswordCredentialRequest,
    ) -> Result<DirectoryCredential, DirectoryError> {
        self.record_call(DirectoryCall::Add {
            application_id: application_id.to_string(),
        });
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(DirectoryError::Transport("injected add failure".into()));
        }

        let queued = self
            .next_credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let (key_id, secret_text) = match queued {
            Some(next) => next,
            None => {
                let key_id = self.generated_key_id();
                let secret = format!("secret-for-{}", key_id);
                (key_id, secret)
            }
        };

        let mut apps = self.lock_apps();
        let app = apps
            .get_mut(application_id)
            .ok_or_else(|| DirectoryError::NotFound(application_id.to_string()))?;
        let credential = DirectoryCredential {
            key_id,
            secret_text: Zeroizing::new(secret_text),
            display_name: Some(request.display_name.clone()),
            start_date_time: Some(Utc::now()),
            end_date_time: request.end_date_time,
        };
        app.credentials.push(credential.clone());
        if self.unconfirm_add.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unconfirmed {
                key_id: Some(credential.key_id.clone()),
                message: "injected unreadable add response".into(),
            });
        }
        Ok(credential)
    }

    async fn remove_password(
        &self,
        application_id: &str,
        key_id: &KeyId,
    ) -> Result<(), DirectoryError> {
        self.record_call(DirectoryCall::Remove {
            application_id: application_id.to_string(),
            key_id: key_id.clone(),
        });
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(DirectoryError::Transport("injected remove failure".into()));
        }

        let mut apps = self.lock_apps();
        let app = apps
            .get_mut(application_id)
            .ok_or_else(|| DirectoryError::NotFound(application_id.to_string()))?;
        let before = app.credentials.len();
        app.credentials.retain(|c| &c.key_id != key_id);
        if app.credentials.len() == before {
            return Err(DirectoryError::Rejected {
                status: 400,
                message: format!("no password credential with key id {}", key_id),
            });
        }
        Ok(())
    }
}
