//! Microsoft Graph application registration adapter.
//!
//! Applications are addressed by object id, the same identifier the secret
//! store uses as the secret name.

use crate::azure::http::{ApiClient, ApiResponse, HttpError};
use crate::core::directory::{Directory, DirectoryError};
use crate::models::credential::{
    Application, DirectoryCredential, KeyId, PasswordCredentialRequest,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use zeroize::Zeroizing;

/// `passwordCredential` resource as returned by `addPassword`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordCredential {
    key_id: Option<KeyId>,
    secret_text: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    start_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    end_date_time: Option<DateTime<Utc>>,
}

impl PasswordCredential {
    /// Only called on a 2xx answer, so every failure here means the
    /// credential may already exist in the directory.
    fn into_credential(
        self,
        request: &PasswordCredentialRequest,
    ) -> Result<DirectoryCredential, DirectoryError> {
        let Some(key_id) = self.key_id else {
            return Err(DirectoryError::Unconfirmed {
                key_id: None,
                message: "addPassword returned no keyId".into(),
            });
        };
        let Some(secret_text) = self.secret_text.filter(|s| !s.is_empty()) else {
            return Err(DirectoryError::Unconfirmed {
                key_id: Some(key_id),
                message: "addPassword returned no secretText".into(),
            });
        };
        Ok(DirectoryCredential {
            key_id,
            secret_text: Zeroizing::new(secret_text),
            display_name: self.display_name,
            start_date_time: self.start_date_time,
            end_date_time: self.end_date_time.unwrap_or(request.end_date_time),
        })
    }
}

pub struct GraphDirectory {
    api: ApiClient,
}

impl GraphDirectory {
    /// `api` must point at the Graph endpoint with the Graph token scope.
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

fn transport(e: HttpError) -> DirectoryError {
    match e {
        HttpError::Token(t) => DirectoryError::Auth(t.to_string()),
        other => DirectoryError::Transport(other.to_string()),
    }
}

fn status_error(application_id: &str, response: &ApiResponse) -> DirectoryError {
    match response.status {
        StatusCode::NOT_FOUND => DirectoryError::NotFound(application_id.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            DirectoryError::Auth(response.error_message())
        }
        status => DirectoryError::Rejected {
            status: status.as_u16(),
            message: crate::azure::http::error_message(&response.body),
        },
    }
}

#[async_trait]
impl Directory for GraphDirectory {
    async fn get_application(&self, application_id: &str) -> Result<Application, DirectoryError> {
        let mut url = self
            .api
            .url(&["applications", application_id])
            .map_err(transport)?;
        url.query_pairs_mut()
            .append_pair("$select", "id,appId,displayName");

        let response = self.api.get_with_retry(url).await.map_err(transport)?;
        if response.status != StatusCode::OK {
            return Err(status_error(application_id, &response));
        }
        response
            .json::<Application>()
            .map_err(|e| DirectoryError::InvalidResponse(e.to_string()))
    }

    async fn add_password(
        &self,
        application_id: &str,
        request: &PasswordCredentialRequest,
    ) -> Result<DirectoryCredential, DirectoryError> {
        let url = self
            .api
            .url(&["applications", application_id, "addPassword"])
            .map_err(transport)?;
        let body = json!({
            "passwordCredential": {
                "displayName": request.display_name,
                "endDateTime": request.end_date_time,
            }
        });

        let response = self
            .api
            .send(Method::POST, url, Some(&body))
            .await
            .map_err(transport)?;
        if !response.status.is_success() {
            return Err(status_error(application_id, &response));
        }
        response
            .json::<PasswordCredential>()
            .map_err(|e| DirectoryError::Unconfirmed {
                key_id: None,
                message: format!("addPassword response: {}", e),
            })?
            .into_credential(request)
    }

    async fn remove_password(
        &self,
        application_id: &str,
        key_id: &KeyId,
    ) -> Result<(), DirectoryError> {
        let url = self
            .api
            .url(&["applications", application_id, "removePassword"])
            .map_err(transport)?;
        let body = json!({ "keyId": key_id.as_str() });

        let response = self
            .api
            .send(Method::POST, url, Some(&body))
            .await
            .map_err(transport)?;
        if response.status.is_success() {
            Ok(())
        } else {
            Err(status_error(application_id, &response))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request() -> PasswordCredentialRequest {
        PasswordCredentialRequest {
            display_name: "Set via automation".into(),
            end_date_time: Utc.with_ymd_and_hms(2026, 11, 15, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_password_credential_requires_secret_text() {
        let parsed: PasswordCredential =
            serde_json::from_str(r#"{"keyId":"key-B","secretText":null}"#).unwrap();
        match parsed.into_credential(&request()) {
            Err(DirectoryError::Unconfirmed { key_id, .. }) => {
                assert_eq!(key_id.as_ref().map(KeyId::as_str), Some("key-B"));
            }
            other => panic!("unexpected {:?}", other.map(|c| c.key_id)),
        }
    }

    #[test]
    fn test_password_credential_without_key_id() {
        let parsed: PasswordCredential =
            serde_json::from_str(r#"{"secretText":"s3cr3t"}"#).unwrap();
        assert!(matches!(
            parsed.into_credential(&request()),
            Err(DirectoryError::Unconfirmed { key_id: None, .. })
        ));
    }

    #[test]
    fn test_password_credential_falls_back_to_requested_end() {
        let parsed: PasswordCredential =
            serde_json::from_str(r#"{"keyId":"key-B","secretText":"s3cr3t"}"#).unwrap();
        let credential = parsed.into_credential(&request()).unwrap();
        assert_eq!(credential.key_id.as_str(), "key-B");
        assert_eq!(credential.secret_text.as_str(), "s3cr3t");
        assert_eq!(credential.end_date_time, request().end_date_time);
    }

    #[test]
    fn test_status_mapping() {
        let response = |status: StatusCode| ApiResponse {
            status,
            body: r#"{"error":{"code":"Authorization_RequestDenied","message":"no"}}"#.into(),
        };
        assert_eq!(
            status_error("app-404", &response(StatusCode::NOT_FOUND)),
            DirectoryError::NotFound("app-404".into())
        );
        assert!(matches!(
            status_error("app", &response(StatusCode::FORBIDDEN)),
            DirectoryError::Auth(_)
        ));
        assert!(matches!(
            status_error("app", &response(StatusCode::BAD_REQUEST)),
            DirectoryError::Rejected { status: 400, .. }
        ));
    }
}
