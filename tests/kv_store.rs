//! KV store writes against a mocked Vault server.

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use secret_broker::secrets::backends::{KvStoreConfig, VaultKvStore};
use secret_broker::secrets::{SecretMetadata, SecretStore, SecretValue};

fn version_response() -> serde_json::Value {
    json!({
        "request_id": "req-1",
        "lease_id": "",
        "lease_duration": 0,
        "renewable": false,
        "data": {
            "created_time": "2026-01-01T00:00:00Z",
            "deletion_time": "",
            "custom_metadata": null,
            "destroyed": false,
            "version": 1
        },
        "warnings": null,
        "wrap_info": null,
        "auth": null
    })
}

#[tokio::test]
async fn test_set_writes_metadata_then_value() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/secret/metadata/api-key-stripe"))
        .and(header("x-vault-token", "root"))
        .and(body_partial_json(json!({
            "custom_metadata": { "owner": "payments", "rotation-policy": "90d", "tier": "critical" }
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/secret/data/api-key-stripe"))
        .and(body_partial_json(json!({ "data": { "value": "sk_live_123" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(version_response()))
        .expect(1)
        .mount(&server)
        .await;

    let store = VaultKvStore::new(&KvStoreConfig::new(server.uri(), "root")).unwrap();
    let metadata = SecretMetadata::new()
        .with_owner("payments")
        .with_rotation_policy("90d")
        .with_label("tier", "critical");
    store
        .set("api-key-stripe", &SecretValue::text("sk_live_123"), Some(&metadata))
        .await
        .unwrap();

    let paths: Vec<String> =
        server.received_requests().await.unwrap().iter().map(|r| r.url.path().to_string()).collect();
    assert_eq!(paths, vec!["/v1/secret/metadata/api-key-stripe", "/v1/secret/data/api-key-stripe"]);
}

#[tokio::test]
async fn test_rejected_metadata_leaves_value_unwritten() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/secret/metadata/api-key-stripe"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({ "errors": ["permission denied"] })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/secret/data/api-key-stripe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(version_response()))
        .expect(0)
        .mount(&server)
        .await;

    let store = VaultKvStore::new(&KvStoreConfig::new(server.uri(), "root")).unwrap();
    let metadata = SecretMetadata::new().with_owner("payments");
    assert!(store
        .set("api-key-stripe", &SecretValue::text("sk_live_123"), Some(&metadata))
        .await
        .is_err());
}

#[tokio::test]
async fn test_set_without_metadata_skips_metadata_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/secret/data/jwt-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(version_response()))
        .expect(2)
        .mount(&server)
        .await;

    let store = VaultKvStore::new(&KvStoreConfig::new(server.uri(), "root")).unwrap();
    store.set("jwt-secret", &SecretValue::text("Signing-secret-1"), None).await.unwrap();
    store
        .set("jwt-secret", &SecretValue::text("Signing-secret-2"), Some(&SecretMetadata::new()))
        .await
        .unwrap();
}
