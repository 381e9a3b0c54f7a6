//! Key Vault secrets REST adapter.

use crate::azure::http::{ApiClient, ApiResponse, HttpError};
use crate::constants;
use crate::core::secret_store::{SecretStore, StoreError};
use crate::models::secret::StoredRecord;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Key Vault secret names: 1-127 of `[0-9a-zA-Z-]`.
pub fn is_valid_secret_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 127
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecretBundle {
    value: String,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    attributes: Option<SecretAttributes>,
}

#[derive(Serialize, Deserialize, Default)]
struct SecretAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SetSecretBody<'a> {
    value: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<&'a str>,
    attributes: SecretAttributes,
}

pub struct KeyVaultStore {
    api: ApiClient,
}

impl KeyVaultStore {
    /// `api` must point at the vault URI with the Key Vault token scope.
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn secret_url(&self, name: &str) -> Result<Url, HttpError> {
        let mut url = self.api.url(&["secrets", name])?;
        url.query_pairs_mut()
            .append_pair("api-version", constants::KEY_VAULT_API_VERSION);
        Ok(url)
    }
}

fn invalid_name(name: &str) -> String {
    format!("'{}' is not a valid Key Vault secret name", name)
}

fn decode_bundle(response: &ApiResponse) -> Result<StoredRecord, String> {
    let bundle: SecretBundle = response
        .json()
        .map_err(|e| format!("invalid secret bundle: {}", e))?;
    let expires_on = match bundle.attributes.and_then(|a| a.exp) {
        Some(ts) => Some(from_unix(ts)?),
        None => None,
    };
    Ok(StoredRecord {
        value: Zeroizing::new(bundle.value),
        content_type: bundle.content_type,
        expires_on,
    })
}

fn from_unix(ts: i64) -> Result<DateTime<Utc>, String> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .ok_or_else(|| format!("invalid expiry timestamp {}", ts))
}

#[async_trait]
impl SecretStore for KeyVaultStore {
    async fn get(&self, name: &str) -> Result<StoredRecord, StoreError> {
        let read_error = |message: String| StoreError::Read {
            name: name.to_string(),
            message,
        };
        if !is_valid_secret_name(name) {
            return Err(read_error(invalid_name(name)));
        }

        let url = self.secret_url(name).map_err(|e| read_error(e.to_string()))?;
        let response = self
            .api
            .get_with_retry(url)
            .await
            .map_err(|e| read_error(e.to_string()))?;

        match response.status {
            StatusCode::OK => decode_bundle(&response).map_err(read_error),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(name.to_string())),
            _ => Err(read_error(response.error_message())),
        }
    }

    async fn set(&self, name: &str, record: &StoredRecord) -> Result<(), StoreError> {
        let write_error = |message: String| StoreError::Write {
            name: name.to_string(),
            message,
        };
        if !is_valid_secret_name(name) {
            return Err(write_error(invalid_name(name)));
        }

        let body = SetSecretBody {
            value: record.value.as_str(),
            content_type: record.content_type.as_deref(),
            attributes: SecretAttributes {
                exp: record.expires_on.map(|t| t.timestamp()),
            },
        };
        let body = serde_json::to_value(&body).map_err(|e| write_error(e.to_string()))?;

        let url = self.secret_url(name).map_err(|e| write_error(e.to_string()))?;
        let response = self
            .api
            .send(Method::PUT, url, Some(&body))
            .await
            .map_err(|e| write_error(e.to_string()))?;

        if response.status.is_success() {
            Ok(())
        } else {
            Err(write_error(response.error_message()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_name_rules() {
        assert!(is_valid_secret_name("app-123"));
        assert!(is_valid_secret_name("3f1c2a9e-0000-4bb1-9c8e-5d2f0a1b7c66"));
        assert!(!is_valid_secret_name(""));
        assert!(!is_valid_secret_name("app/../keys"));
        assert!(!is_valid_secret_name("app_123"));
        assert!(!is_valid_secret_name(&"a".repeat(128)));
    }

    #[test]
    fn test_set_body_shape() {
        let exp = Utc.with_ymd_and_hms(2026, 11, 15, 0, 0, 0).unwrap();
        let body = SetSecretBody {
            value: "s3cr3t",
            content_type: Some("key-B"),
            attributes: SecretAttributes {
                exp: Some(exp.timestamp()),
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["value"], "s3cr3t");
        assert_eq!(json["contentType"], "key-B");
        assert_eq!(json["attributes"]["exp"], exp.timestamp());
    }

    #[test]
    fn test_decode_bundle_without_attributes() {
        let response = ApiResponse {
            status: StatusCode::OK,
            body: r#"{"value":"v","contentType":"key-A","id":"https://kv/secrets/app/1"}"#.into(),
        };
        let record = decode_bundle(&response).unwrap();
        assert_eq!(record.value.as_str(), "v");
        assert_eq!(record.content_type.as_deref(), Some("key-A"));
        assert!(record.expires_on.is_none());
    }
}
