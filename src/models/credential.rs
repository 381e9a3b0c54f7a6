//! Directory-side credential types.

use crate::constants;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

/// Directory-assigned identifier of a password credential.
///
/// Opaque to callers: the directory chooses it, the rotator only carries it
/// between the directory and the secret store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyId(pub(crate) String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyIdError {
    #[error("key id is empty")]
    Empty,
    #[error("key id is longer than {max} characters")]
    TooLong { max: usize },
    #[error("key id contains characters outside [A-Za-z0-9._{{}}-]")]
    InvalidCharacter,
}

impl KeyId {
    pub fn parse(raw: &str) -> Result<Self, KeyIdError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(KeyIdError::Empty);
        }
        if trimmed.chars().count() > constants::MAX_KEY_ID_LEN {
            return Err(KeyIdError::TooLong {
                max: constants::MAX_KEY_ID_LEN,
            });
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '{' | '}'))
        {
            return Err(KeyIdError::InvalidCharacter);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for KeyId {
    type Error = KeyIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<KeyId> for String {
    fn from(value: KeyId) -> Self {
        value.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A password credential attached to an application.
///
/// `secret_text` is only ever returned by the add call; the directory never
/// hands it out again.
#[derive(Clone)]
pub struct DirectoryCredential {
    pub key_id: KeyId,
    pub secret_text: Zeroizing<String>,
    pub display_name: Option<String>,
    pub start_date_time: Option<DateTime<Utc>>,
    pub end_date_time: DateTime<Utc>,
}

impl fmt::Debug for DirectoryCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryCredential")
            .field("key_id", &self.key_id)
            .field("secret_text", &"<redacted>")
            .field("display_name", &self.display_name)
            .field("start_date_time", &self.start_date_time)
            .field("end_date_time", &self.end_date_time)
            .finish()
    }
}

/// Parameters for a new password credential. The directory assigns the key
/// id and generates the secret text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordCredentialRequest {
    pub display_name: String,
    pub end_date_time: DateTime<Utc>,
}

/// An application registration as seen by the rotator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}
