//! Secret store records.

use crate::core::correlation::{self, CorrelationError};
use crate::models::credential::{DirectoryCredential, KeyId};
use chrono::{DateTime, Utc};
use std::fmt;
use zeroize::Zeroizing;

/// Raw record as held by the secret store.
///
/// The store has no attribute for "which directory credential is this", so
/// the key id travels in `content_type`.
#[derive(Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub value: Zeroizing<String>,
    pub content_type: Option<String>,
    pub expires_on: Option<DateTime<Utc>>,
}

impl fmt::Debug for StoredRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredRecord")
            .field("value", &"<redacted>")
            .field("content_type", &self.content_type)
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Decoded view of a stored record: the secret plus the directory key id it
/// belongs to.
#[derive(Clone, PartialEq, Eq)]
pub struct StoredSecret {
    pub secret_value: Zeroizing<String>,
    pub correlation_id: KeyId,
    pub expires_on: Option<DateTime<Utc>>,
}

impl StoredSecret {
    /// Record the credential returned by a successful rotation.
    pub fn from_credential(credential: &DirectoryCredential) -> Self {
        Self {
            secret_value: credential.secret_text.clone(),
            correlation_id: credential.key_id.clone(),
            expires_on: Some(credential.end_date_time),
        }
    }

    pub fn from_record(record: &StoredRecord) -> Result<Self, CorrelationError> {
        let correlation_id = correlation::decode(record.content_type.as_deref())?;
        Ok(Self {
            secret_value: record.value.clone(),
            correlation_id,
            expires_on: record.expires_on,
        })
    }

    pub fn to_record(&self) -> StoredRecord {
        StoredRecord {
            value: self.secret_value.clone(),
            content_type: Some(correlation::encode(&self.correlation_id)),
            expires_on: self.expires_on,
        }
    }
}

impl fmt::Debug for StoredSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredSecret")
            .field("secret_value", &"<redacted>")
            .field("correlation_id", &self.correlation_id)
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_record_roundtrip_keeps_key_id() {
        let secret = StoredSecret {
            secret_value: Zeroizing::new("value".to_string()),
            correlation_id: KeyId::parse("key-B").unwrap(),
            expires_on: Some(Utc::now() + Duration::days(30)),
        };
        let record = secret.to_record();
        assert_eq!(record.content_type.as_deref(), Some("key-B"));
        let decoded = StoredSecret::from_record(&record).unwrap();
        assert_eq!(decoded, secret);
    }

    #[test]
    fn test_from_record_without_content_type_fails() {
        let record = StoredRecord {
            value: Zeroizing::new("value".to_string()),
            content_type: None,
            expires_on: None,
        };
        assert!(matches!(
            StoredSecret::from_record(&record),
            Err(CorrelationError::Missing)
        ));
    }

    #[test]
    fn test_debug_redacts_value() {
        let record = StoredRecord {
            value: Zeroizing::new("hunter2".to_string()),
            content_type: Some("key-A".into()),
            expires_on: None,
        };
        assert!(!format!("{:?}", record).contains("hunter2"));
    }
}
