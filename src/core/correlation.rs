//! Correlation between a stored secret and its directory credential.
//!
//! The secret store has no field for the credential's key id, so it is
//! written into the record's content-type. Anything else found there is a
//! hard error rather than a guess.

use crate::models::credential::{KeyId, KeyIdError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorrelationError {
    #[error("stored secret has no correlation id in its content type")]
    Missing,
    #[error("stored content type is not a valid key id: {0}")]
    Invalid(#[from] KeyIdError),
}

/// Encode a key id for the store's content-type field.
pub fn encode(key_id: &KeyId) -> String {
    key_id.as_str().to_string()
}

/// Decode the content-type field back into a key id.
pub fn decode(content_type: Option<&str>) -> Result<KeyId, CorrelationError> {
    let raw = match content_type {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => return Err(CorrelationError::Missing),
    };
    Ok(KeyId::parse(raw)?)
}
