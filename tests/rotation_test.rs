//! Full rotation through the Key Vault and Graph adapters against wiremock.

use std::sync::Arc;

use reqwest::Client;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_json, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appreg_rotator::azure::graph::GraphDirectory;
use appreg_rotator::azure::http::ApiClient;
use appreg_rotator::azure::key_vault::KeyVaultStore;
use appreg_rotator::azure::token::StaticToken;
use appreg_rotator::constants;
use appreg_rotator::core::audit_log::{self, AuditTrail};
use appreg_rotator::core::lock::RotationLocks;
use appreg_rotator::core::orchestrator::Orchestrator;
use appreg_rotator::core::outcome::RotationOutcome;
use appreg_rotator::core::paths::StatePaths;
use appreg_rotator::models::config::RotatorConfig;
use appreg_rotator::models::event::parse_delivery;

const DELIVERY: &str = r#"[{
    "id": "evt-1",
    "topic": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.KeyVault/vaults/kv",
    "subject": "app-123",
    "eventType": "Microsoft.KeyVault.SecretNearExpiry",
    "eventTime": "2026-10-16T08:00:00Z",
    "data": { "ObjectName": "app-123", "VaultName": "kv" },
    "dataVersion": "1",
    "metadataVersion": "1"
}]"#;

fn orchestrator(server: &MockServer, state: &TempDir) -> Orchestrator {
    let mut config = RotatorConfig::default();
    config.vault.endpoint = Some(server.uri());

    let tokens = Arc::new(StaticToken::new("test-token"));
    let vault_api = ApiClient::new(
        Client::new(),
        &server.uri(),
        tokens.clone(),
        constants::KEY_VAULT_SCOPE,
        3,
    )
    .unwrap();
    let graph_api = ApiClient::new(
        Client::new(),
        &format!("{}/v1.0", server.uri()),
        tokens,
        constants::GRAPH_SCOPE,
        3,
    )
    .unwrap();

    let paths = StatePaths::from_root(state.path().to_path_buf());
    Orchestrator::new(
        &config,
        Arc::new(KeyVaultStore::new(vault_api)),
        Arc::new(GraphDirectory::new(graph_api)),
    )
    .with_locks(RotationLocks::new(paths.locks.clone()))
    .with_audit(AuditTrail::new(paths))
}

async fn mount_lookups(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/secrets/app-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": "old-secret",
            "contentType": "key-A",
            "attributes": { "exp": 1_792_000_000 }
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/applications/app-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "app-123" })))
        .mount(server)
        .await;
}

async fn mount_read_side(server: &MockServer) {
    mount_lookups(server).await;
    Mock::given(method("POST"))
        .and(path("/v1.0/applications/app-123/addPassword"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keyId": "key-B",
            "secretText": "s3cr3t",
            "endDateTime": "2026-11-15T08:00:00Z"
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_event_rotates_and_stores_new_secret() {
    let server = MockServer::start().await;
    let state = TempDir::new().unwrap();
    mount_read_side(&server).await;

    Mock::given(method("POST"))
        .and(path("/v1.0/applications/app-123/removePassword"))
        .and(body_json(json!({ "keyId": "key-A" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/secrets/app-123"))
        .and(body_partial_json(json!({ "value": "s3cr3t", "contentType": "key-B" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": "s3cr3t" })))
        .expect(1)
        .mount(&server)
        .await;

    let events = parse_delivery(DELIVERY).unwrap();
    let outcome = orchestrator(&server, &state)
        .handle_expiration_event(&events[0])
        .await;

    match &outcome {
        RotationOutcome::Rotated {
            application_id,
            previous_key_id,
            new_key_id,
            ..
        } => {
            assert_eq!(application_id, "app-123");
            assert_eq!(previous_key_id.as_str(), "key-A");
            assert_eq!(new_key_id.as_str(), "key-B");
        }
        other => panic!("expected Rotated, got {:?}", other),
    }
    assert_eq!(outcome.exit_code(), 0);

    // add, then remove, then write the store
    let requests = server.received_requests().await.unwrap();
    let position = |suffix: &str, verb: &str| {
        requests
            .iter()
            .position(|r| r.url.path().ends_with(suffix) && r.method.as_str() == verb)
            .unwrap()
    };
    let add = position("/addPassword", "POST");
    let remove = position("/removePassword", "POST");
    let write = position("/secrets/app-123", "PUT");
    assert!(add < remove && remove < write);

    let paths = StatePaths::from_root(state.path().to_path_buf());
    let log = audit_log::read_log(&paths, None).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].outcome, "rotated");
    assert_eq!(log[0].event_id, "evt-1");
}

#[tokio::test]
async fn test_remove_failure_leaves_store_untouched() {
    let server = MockServer::start().await;
    let state = TempDir::new().unwrap();
    mount_read_side(&server).await;

    Mock::given(method("POST"))
        .and(path("/v1.0/applications/app-123/removePassword"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "code": "InternalServerError", "message": "try again" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/secrets/app-123"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let events = parse_delivery(DELIVERY).unwrap();
    let outcome = orchestrator(&server, &state)
        .handle_expiration_event(&events[0])
        .await;

    assert!(matches!(
        outcome,
        RotationOutcome::PartialOrphan { ref new_key_id, .. } if new_key_id.as_str() == "key-B"
    ));
    assert_eq!(outcome.exit_code(), 3);

    let paths = StatePaths::from_root(state.path().to_path_buf());
    let pending = audit_log::pending(&paths).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].new_key_id.as_deref(), Some("key-B"));
}

#[tokio::test]
async fn test_store_write_failure_is_inconsistent() {
    let server = MockServer::start().await;
    let state = TempDir::new().unwrap();
    mount_read_side(&server).await;

    Mock::given(method("POST"))
        .and(path("/v1.0/applications/app-123/removePassword"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/secrets/app-123"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": "Forbidden", "message": "secrets/set permission missing" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let events = parse_delivery(DELIVERY).unwrap();
    let outcome = orchestrator(&server, &state)
        .handle_expiration_event(&events[0])
        .await;

    match &outcome {
        RotationOutcome::Inconsistent { new_credential, .. } => {
            assert_eq!(new_credential.key_id.as_str(), "key-B");
        }
        other => panic!("expected Inconsistent, got {:?}", other),
    }

    // the secret text must not reach the audit trail
    let paths = StatePaths::from_root(state.path().to_path_buf());
    let raw = std::fs::read_to_string(&paths.audit_log).unwrap();
    assert!(!raw.contains("s3cr3t"));
}

#[tokio::test]
async fn test_unknown_application_makes_no_mutation() {
    let server = MockServer::start().await;
    let state = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/secrets/app-404"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": "old-secret",
            "contentType": "key-A"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/applications/app-404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let events = parse_delivery(&DELIVERY.replace("app-123", "app-404")).unwrap();
    let outcome = orchestrator(&server, &state)
        .handle_expiration_event(&events[0])
        .await;

    assert!(matches!(outcome, RotationOutcome::Aborted { .. }));
    assert_eq!(
        outcome.error().map(|e| e.kind()),
        Some("application_not_found")
    );
    assert_eq!(outcome.exit_code(), 2);
}

#[tokio::test]
async fn test_add_without_secret_text_needs_reconciliation() {
    let server = MockServer::start().await;
    let state = TempDir::new().unwrap();
    mount_lookups(&server).await;

    Mock::given(method("POST"))
        .and(path("/v1.0/applications/app-123/addPassword"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keyId": "key-B" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1.0/applications/app-123/removePassword"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let events = parse_delivery(DELIVERY).unwrap();
    let outcome = orchestrator(&server, &state)
        .handle_expiration_event(&events[0])
        .await;

    assert_eq!(outcome.status(), "add_unconfirmed");
    assert!(outcome.needs_reconciliation());
    assert_eq!(outcome.new_key_id().map(|k| k.as_str()), Some("key-B"));
    assert_eq!(outcome.exit_code(), 3);

    let paths = StatePaths::from_root(state.path().to_path_buf());
    let pending = audit_log::pending(&paths).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].outcome, "add_unconfirmed");
}
