//! Key Vault, Graph and token adapters against a wiremock server.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde_json::json;
use wiremock::matchers::{
    body_json, body_partial_json, body_string_contains, header, method, path, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zeroize::Zeroizing;

use appreg_rotator::azure::graph::GraphDirectory;
use appreg_rotator::azure::http::ApiClient;
use appreg_rotator::azure::key_vault::KeyVaultStore;
use appreg_rotator::azure::token::{
    ClientSecretCredential, ManagedIdentityCredential, StaticToken, TokenError, TokenSource,
};
use appreg_rotator::constants;
use appreg_rotator::core::directory::{Directory, DirectoryError};
use appreg_rotator::core::secret_store::{SecretStore, StoreError};
use appreg_rotator::models::credential::{KeyId, PasswordCredentialRequest};
use appreg_rotator::models::secret::StoredRecord;

fn api_with_retries(base: &str, scope: &str, max_retries: u32) -> ApiClient {
    ApiClient::new(
        Client::new(),
        base,
        Arc::new(StaticToken::new("test-token")),
        scope,
        max_retries,
    )
    .unwrap()
}

fn api(base: &str, scope: &str) -> ApiClient {
    api_with_retries(base, scope, 3)
}

fn vault(server: &MockServer) -> KeyVaultStore {
    KeyVaultStore::new(api(&server.uri(), constants::KEY_VAULT_SCOPE))
}

fn graph(server: &MockServer) -> GraphDirectory {
    GraphDirectory::new(api(&format!("{}/v1.0", server.uri()), constants::GRAPH_SCOPE))
}

#[tokio::test]
async fn test_key_vault_get_secret() {
    let server = MockServer::start().await;
    let exp = Utc.with_ymd_and_hms(2026, 11, 1, 0, 0, 0).unwrap();

    Mock::given(method("GET"))
        .and(path("/secrets/app-123"))
        .and(query_param("api-version", "7.4"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": "old-secret",
            "contentType": "key-A",
            "id": "https://kv.vault.azure.net/secrets/app-123/abc",
            "attributes": { "enabled": true, "exp": exp.timestamp() }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let record = vault(&server).get("app-123").await.unwrap();
    assert_eq!(record.value.as_str(), "old-secret");
    assert_eq!(record.content_type.as_deref(), Some("key-A"));
    assert_eq!(record.expires_on, Some(exp));
}

#[tokio::test]
async fn test_key_vault_missing_secret_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/secrets/app-404"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": "SecretNotFound", "message": "A secret with (name/id) app-404 was not found" }
        })))
        .mount(&server)
        .await;

    let err = vault(&server).get("app-404").await.unwrap_err();
    assert_eq!(err, StoreError::NotFound("app-404".into()));
}

#[tokio::test]
async fn test_key_vault_get_retries_transient_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/secrets/app-123"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/secrets/app-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": "old-secret",
            "contentType": "key-A"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let record = vault(&server).get("app-123").await.unwrap();
    assert_eq!(record.content_type.as_deref(), Some("key-A"));
}

#[tokio::test]
async fn test_max_retries_counts_retries_not_attempts() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/secrets/app-123"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let store = KeyVaultStore::new(api_with_retries(
        &server.uri(),
        constants::KEY_VAULT_SCOPE,
        1,
    ));
    let err = store.get("app-123").await.unwrap_err();
    assert!(matches!(err, StoreError::Read { .. }));
}

#[tokio::test]
async fn test_zero_retries_is_single_attempt() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/secrets/app-123"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let store = KeyVaultStore::new(api_with_retries(
        &server.uri(),
        constants::KEY_VAULT_SCOPE,
        0,
    ));
    assert!(store.get("app-123").await.is_err());
}

#[tokio::test]
async fn test_key_vault_set_secret_body() {
    let server = MockServer::start().await;
    let exp = Utc.with_ymd_and_hms(2026, 11, 15, 0, 0, 0).unwrap();

    Mock::given(method("PUT"))
        .and(path("/secrets/app-123"))
        .and(query_param("api-version", "7.4"))
        .and(body_json(json!({
            "value": "s3cr3t",
            "contentType": "key-B",
            "attributes": { "exp": exp.timestamp() }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": "s3cr3t" })))
        .expect(1)
        .mount(&server)
        .await;

    let record = StoredRecord {
        value: Zeroizing::new("s3cr3t".into()),
        content_type: Some("key-B".into()),
        expires_on: Some(exp),
    };
    vault(&server).set("app-123", &record).await.unwrap();
}

#[tokio::test]
async fn test_key_vault_set_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/secrets/app-123"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let record = StoredRecord {
        value: Zeroizing::new("s3cr3t".into()),
        content_type: Some("key-B".into()),
        expires_on: None,
    };
    let err = vault(&server).set("app-123", &record).await.unwrap_err();
    assert!(matches!(err, StoreError::Write { .. }));
}

#[tokio::test]
async fn test_key_vault_rejects_unsafe_secret_name() {
    let server = MockServer::start().await;
    let err = vault(&server).get("../keys/app").await.unwrap_err();
    assert!(matches!(err, StoreError::Read { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_graph_get_application() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/applications/app-123"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "app-123",
            "appId": "00000000-1111-2222-3333-444444444444",
            "displayName": "billing-api"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/applications/app-404"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": "Request_ResourceNotFound", "message": "Resource 'app-404' does not exist" }
        })))
        .mount(&server)
        .await;

    let directory = graph(&server);
    let app = directory.get_application("app-123").await.unwrap();
    assert_eq!(app.display_name.as_deref(), Some("billing-api"));

    let err = directory.get_application("app-404").await.unwrap_err();
    assert_eq!(err, DirectoryError::NotFound("app-404".into()));
}

#[tokio::test]
async fn test_graph_add_password() {
    let server = MockServer::start().await;
    let end = Utc.with_ymd_and_hms(2026, 11, 15, 0, 0, 0).unwrap();

    Mock::given(method("POST"))
        .and(path("/v1.0/applications/app-123/addPassword"))
        .and(body_partial_json(json!({
            "passwordCredential": { "displayName": "Set via automation" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keyId": "key-B",
            "secretText": "s3cr3t",
            "hint": "s3c",
            "displayName": "Set via automation",
            "startDateTime": "2026-10-16T00:00:00Z",
            "endDateTime": "2026-11-15T00:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = PasswordCredentialRequest {
        display_name: "Set via automation".into(),
        end_date_time: end,
    };
    let credential = graph(&server)
        .add_password("app-123", &request)
        .await
        .unwrap();
    assert_eq!(credential.key_id.as_str(), "key-B");
    assert_eq!(credential.secret_text.as_str(), "s3cr3t");
    assert_eq!(credential.end_date_time, end);
}

#[tokio::test]
async fn test_graph_remove_password() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1.0/applications/app-123/removePassword"))
        .and(body_json(json!({ "keyId": "key-A" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    graph(&server)
        .remove_password("app-123", &KeyId::parse("key-A").unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_graph_forbidden_is_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1.0/applications/app-123/removePassword"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": "Authorization_RequestDenied", "message": "Insufficient privileges" }
        })))
        .mount(&server)
        .await;

    let err = graph(&server)
        .remove_password("app-123", &KeyId::parse("key-A").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, DirectoryError::Auth(ref m) if m.contains("Insufficient privileges")));
}

#[tokio::test]
async fn test_client_secret_token_is_cached() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=rotator"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": "aad-token"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = ClientSecretCredential::new(
        Client::new(),
        &server.uri(),
        "tenant-1",
        "rotator",
        Zeroizing::new("client-secret".into()),
    );
    let first = source.token(constants::GRAPH_SCOPE).await.unwrap();
    let second = source.token(constants::GRAPH_SCOPE).await.unwrap();
    assert_eq!(first.as_str(), "aad-token");
    assert_eq!(second.as_str(), "aad-token");
}

#[tokio::test]
async fn test_client_secret_rejection() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "AADSTS7000215: Invalid client secret provided."
        })))
        .mount(&server)
        .await;

    let source = ClientSecretCredential::new(
        Client::new(),
        &server.uri(),
        "tenant-1",
        "rotator",
        Zeroizing::new("wrong".into()),
    );
    let err = source.token(constants::GRAPH_SCOPE).await.unwrap_err();
    assert!(matches!(err, TokenError::Rejected { status: 401, ref message } if message.contains("AADSTS7000215")));
}

#[tokio::test]
async fn test_managed_identity_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/metadata/identity/oauth2/token"))
        .and(header("Metadata", "true"))
        .and(query_param("resource", "https://vault.azure.net"))
        .and(query_param("client_id", "mi-client"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "imds-token",
            "expires_in": "86399",
            "resource": "https://vault.azure.net",
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = ManagedIdentityCredential::new(
        Client::new(),
        &format!("{}/metadata/identity/oauth2/token", server.uri()),
        Some("mi-client".into()),
    );
    let token = source.token(constants::KEY_VAULT_SCOPE).await.unwrap();
    assert_eq!(token.as_str(), "imds-token");
}
