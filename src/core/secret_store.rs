//! Secret store access.
//!
//! `SecretStore` is the raw get/set boundary; `SecretStoreClient` adds the
//! correlation decoding and maps failures into the rotation taxonomy.

use crate::core::error::RotationError;
use crate::models::secret::{StoredRecord, StoredSecret};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("secret '{0}' not found")]
    NotFound(String),
    #[error("read secret '{name}': {message}")]
    Read { name: String, message: String },
    #[error("write secret '{name}': {message}")]
    Write { name: String, message: String },
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the current record. Fails with `NotFound` if absent.
    async fn get(&self, name: &str) -> Result<StoredRecord, StoreError>;

    /// Create or overwrite the record.
    async fn set(&self, name: &str, record: &StoredRecord) -> Result<(), StoreError>;
}

/// Typed access to stored secrets, keyed by application identifier.
#[derive(Clone)]
pub struct SecretStoreClient {
    inner: Arc<dyn SecretStore>,
}

impl SecretStoreClient {
    pub fn new(inner: Arc<dyn SecretStore>) -> Self {
        Self { inner }
    }

    pub async fn get_secret(&self, application_id: &str) -> Result<StoredSecret, RotationError> {
        let record = self.inner.get(application_id).await.map_err(|e| match e {
            StoreError::NotFound(name) => RotationError::SecretNotFound(name),
            other => RotationError::StoreReadFailure(other.to_string()),
        })?;
        let secret = StoredSecret::from_record(&record)?;
        debug!(
            application_id,
            correlation_id = %secret.correlation_id,
            "loaded stored secret"
        );
        Ok(secret)
    }

    pub async fn set_secret(
        &self,
        application_id: &str,
        secret: &StoredSecret,
    ) -> Result<(), RotationError> {
        self.inner
            .set(application_id, &secret.to_record())
            .await
            .map_err(|e| RotationError::StoreWriteFailure(e.to_string()))?;
        info!(
            application_id,
            correlation_id = %secret.correlation_id,
            "stored new secret"
        );
        Ok(())
    }
}

/// In-process store with failure injection.
#[derive(Default)]
pub struct MemorySecretStore {
    records: Mutex<HashMap<String, StoredRecord>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(self, name: &str, record: StoredRecord) -> Self {
        self.insert(name, record);
        self
    }

    pub fn insert(&self, name: &str, record: StoredRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), record);
    }

    pub fn record(&self, name: &str) -> Option<StoredRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Make every subsequent read fail with a transport error.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, name: &str) -> Result<StoredRecord, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Read {
                name: name.to_string(),
                message: "injected read failure".to_string(),
            });
        }
        self.record(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn set(&self, name: &str, record: &StoredRecord) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Write {
                name: name.to_string(),
                message: "injected write failure".to_string(),
            });
        }
        self.insert(name, record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
