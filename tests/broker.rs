//! Broker behaviour against a scripted store: caching, degradation,
//! mutations, batches, warmup and the audit trail.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{broker, broker_with_options, ScriptedStore};
use secret_broker::secrets::keys::{DATABASE_URL, ENCRYPTION_KEY, JWT_SECRET};
use secret_broker::secrets::{
    AuditOperation, AuditSource, BrokerOptions, SecretKind, SecretLookup, SecretValue,
};

const TTL: Duration = Duration::from_secs(300);

#[tokio::test(start_paused = true)]
async fn test_reads_within_ttl_hit_store_once() {
    let store = Arc::new(ScriptedStore::new().with("api-key-stripe", "sk_live_1"));
    let (broker, _) = broker(store.clone());

    let first = broker.get_secret("api-key-stripe").await.unwrap();
    tokio::time::advance(TTL - Duration::from_secs(1)).await;
    let second = broker.get_secret("api-key-stripe").await.unwrap();

    assert_eq!(first, Some(SecretValue::text("sk_live_1")));
    assert_eq!(first, second);
    assert_eq!(store.gets("api-key-stripe"), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    broker.get_secret("api-key-stripe").await.unwrap();
    assert_eq!(store.gets("api-key-stripe"), 2);
}

#[tokio::test]
async fn test_absent_results_are_cached() {
    let store = Arc::new(ScriptedStore::new());
    let (broker, _) = broker(store.clone());

    assert_eq!(broker.lookup("feature-flags").await.unwrap(), SecretLookup::Absent { from_cache: false });
    assert_eq!(broker.lookup("feature-flags").await.unwrap(), SecretLookup::Absent { from_cache: true });
    assert_eq!(store.gets("feature-flags"), 1);
}

#[tokio::test]
async fn test_set_then_get_fetches_fresh() {
    let store = Arc::new(ScriptedStore::new().with("webhook-secret-github", "old-secret-value"));
    let (broker, _) = broker(store.clone());

    broker.get_secret("webhook-secret-github").await.unwrap();
    broker
        .set_secret("webhook-secret-github", &SecretValue::text("new-secret-value"), None)
        .await
        .unwrap();

    let lookup = broker.lookup("webhook-secret-github").await.unwrap();
    assert_eq!(lookup, SecretLookup::Fresh(SecretValue::text("new-secret-value")));
    assert_eq!(store.gets("webhook-secret-github"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_store_failure_serves_last_known_value() {
    let store = Arc::new(ScriptedStore::new().with(JWT_SECRET, "signing-secret"));
    let (broker, audit) = broker(store.clone());

    broker.get_secret(JWT_SECRET).await.unwrap();
    tokio::time::advance(TTL + Duration::from_secs(1)).await;
    store.fail_reads(JWT_SECRET);

    let value = broker.get_secret(JWT_SECRET).await.unwrap();
    assert_eq!(value, Some(SecretValue::text("signing-secret")));

    let lookup = broker.lookup(JWT_SECRET).await.unwrap();
    assert!(matches!(lookup, SecretLookup::Stale { .. }));
    assert!(lookup.error().is_some());

    let last = audit.events().pop().unwrap();
    assert_eq!(last.operation, AuditOperation::Get);
    assert_eq!(last.source, AuditSource::Cache);
    assert!(!last.success);
    assert!(last.error.is_some());
}

#[tokio::test]
async fn test_store_failure_without_history_is_unavailable() {
    let store = Arc::new(ScriptedStore::new());
    store.fail_reads("database-url");
    let (broker, audit) = broker(store);

    assert_eq!(broker.get_secret("database-url").await.unwrap(), None);
    let lookup = broker.lookup("database-url").await.unwrap();
    assert!(matches!(lookup, SecretLookup::Unavailable { .. }));

    let events = audit.events_for(AuditOperation::Get);
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|event| !event.success && event.source == AuditSource::Backend));
}

#[tokio::test]
async fn test_rotate_then_get_returns_rotated_value() {
    let store = Arc::new(ScriptedStore::new().with("api-key-stripe", "sk_live_before"));
    let (broker, audit) = broker(store.clone());

    assert_eq!(
        broker.get_secret("api-key-stripe").await.unwrap(),
        Some(SecretValue::text("sk_live_before"))
    );
    broker.rotate_secret("api-key-stripe").await.unwrap();

    let after = broker.get_secret("api-key-stripe").await.unwrap();
    assert_eq!(after, Some(SecretValue::text("rotated-1")));

    let rotations = audit.events_for(AuditOperation::Rotate);
    assert_eq!(rotations.len(), 1);
    assert!(rotations[0].success);
    assert_eq!(rotations[0].source, AuditSource::Backend);
}

#[tokio::test]
async fn test_failed_mutation_propagates_and_keeps_cache() {
    let store = Arc::new(ScriptedStore::new().with("database-password", "Correct-Horse-1"));
    let (broker, audit) = broker(store.clone());

    broker.get_secret("database-password").await.unwrap();
    store.fail_writes(true);

    assert!(broker
        .set_secret("database-password", &SecretValue::text("Battery-Staple-2"), None)
        .await
        .is_err());
    assert!(broker.delete_secret("database-password").await.is_err());
    assert!(broker.rotate_secret("database-password").await.is_err());
    assert!(broker
        .generate_secret("database-password", SecretKind::Password, None)
        .await
        .is_err());

    // still served from cache, no extra fetch
    assert_eq!(
        broker.get_secret("database-password").await.unwrap(),
        Some(SecretValue::text("Correct-Horse-1"))
    );
    assert_eq!(store.gets("database-password"), 1);

    let failures: Vec<_> = audit.events().into_iter().filter(|event| !event.success).collect();
    assert_eq!(failures.len(), 4);
}

#[tokio::test]
async fn test_delete_missing_key_is_an_error() {
    let (broker, _) = broker(Arc::new(ScriptedStore::new()));
    let err = broker.delete_secret("never-written").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_batch_read_isolates_failures() {
    let store = Arc::new(ScriptedStore::new().with("a", "value-a").with("b", "value-b"));
    store.fail_reads("missing");
    let (broker, audit) = broker(store);

    let values = broker.get_secrets(&["a", "b", "missing"]).await.unwrap();
    assert_eq!(values.len(), 3);
    assert_eq!(values["a"], Some(SecretValue::text("value-a")));
    assert_eq!(values["b"], Some(SecretValue::text("value-b")));
    assert_eq!(values["missing"], None);

    assert_eq!(audit.events_for(AuditOperation::Get).len(), 3);
}

#[tokio::test]
async fn test_batch_read_tolerates_invalid_keys() {
    let store = Arc::new(ScriptedStore::new().with("a", "value-a"));
    let (broker, _) = broker(store);

    let values = broker.get_secrets(&["a", "not a key"]).await.unwrap();
    assert_eq!(values["a"], Some(SecretValue::text("value-a")));
    assert_eq!(values["not a key"], None);
}

#[tokio::test]
async fn test_batch_write_invalidates_every_key() {
    let store = Arc::new(ScriptedStore::new().with("a", "old-a").with("b", "old-b"));
    let (broker, audit) = broker(store.clone());
    broker.get_secrets(&["a", "b"]).await.unwrap();

    let entries =
        vec![("a".to_string(), SecretValue::text("new-a")), ("b".to_string(), SecretValue::text("new-b"))];
    broker.set_secrets(&entries, None).await.unwrap();

    let values = broker.get_secrets(&["a", "b"]).await.unwrap();
    assert_eq!(values["a"], Some(SecretValue::text("new-a")));
    assert_eq!(values["b"], Some(SecretValue::text("new-b")));
    assert_eq!(store.total_gets(), 4);
    assert_eq!(audit.events_for(AuditOperation::Set).len(), 2);
}

#[tokio::test]
async fn test_initialize_survives_failing_critical_key() {
    let store = Arc::new(
        ScriptedStore::new()
            .with(DATABASE_URL, "postgres://db:5432/app")
            .with(JWT_SECRET, "signing-secret"),
    );
    store.fail_reads(ENCRYPTION_KEY);
    store.fail_warmup(true);
    let (broker, audit) = broker(store.clone());

    let report = broker.initialize().await.unwrap();
    assert!(broker.is_initialized());
    assert_eq!(report.failed, vec![ENCRYPTION_KEY.to_string()]);
    assert_eq!(report.loaded.len(), 2);
    assert!(!report.is_complete());

    let warmups = audit.events_for(AuditOperation::Warmup);
    assert_eq!(warmups.len(), 3);
    assert_eq!(warmups.iter().filter(|event| !event.success).count(), 1);

    // warmed values are cached
    broker.get_secret(DATABASE_URL).await.unwrap();
    assert_eq!(store.gets(DATABASE_URL), 1);
}

#[tokio::test]
async fn test_refresh_clears_and_rewarms() {
    let store = Arc::new(ScriptedStore::new().with(DATABASE_URL, "postgres://db:5432/app"));
    let (broker, audit) = broker(store.clone());
    broker.initialize().await.unwrap();

    broker.get_secret("extra").await.unwrap();
    store.put(DATABASE_URL, "postgres://db-2:5432/app");

    let report = broker.refresh_secrets().await.unwrap();
    assert_eq!(report.loaded, vec![DATABASE_URL.to_string()]);
    assert_eq!(
        broker.get_secret(DATABASE_URL).await.unwrap(),
        Some(SecretValue::text("postgres://db-2:5432/app"))
    );
    assert_eq!(store.gets(DATABASE_URL), 2);

    let clears = audit.events_for(AuditOperation::Clear);
    assert_eq!(clears.len(), 1);
    assert_eq!(clears[0].secret_key, "*");
}

#[tokio::test]
async fn test_clear_cache_forces_refetch() {
    let store = Arc::new(ScriptedStore::new().with("k", "value"));
    let (broker, _) = broker(store.clone());

    broker.get_secret("k").await.unwrap();
    assert_eq!(broker.cache_stats().entries, 1);
    assert_eq!(broker.clear_cache(), 1);
    broker.get_secret("k").await.unwrap();
    assert_eq!(store.gets("k"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_misses_are_not_coalesced() {
    let store = Arc::new(ScriptedStore::new().with("k", "value"));
    store.set_read_delay(Duration::from_millis(50));
    let (broker, _) = broker(store.clone());

    let (a, b) = tokio::join!(broker.get_secret("k"), broker.get_secret("k"));
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(store.gets("k"), 2);
}

#[tokio::test]
async fn test_every_operation_is_audited_once() {
    let store = Arc::new(ScriptedStore::new().with("k", "value-123"));
    let (broker, audit) = broker(store);

    broker.get_secret("k").await.unwrap();
    broker.get_secret("k").await.unwrap();
    broker.set_secret("k", &SecretValue::text("value-456"), None).await.unwrap();
    broker.rotate_secret("k").await.unwrap();
    broker.delete_secret("k").await.unwrap();
    broker.clear_cache();

    let ops: Vec<_> = audit.events().iter().map(|event| event.operation).collect();
    assert_eq!(
        ops,
        vec![
            AuditOperation::Get,
            AuditOperation::Get,
            AuditOperation::Set,
            AuditOperation::Rotate,
            AuditOperation::Delete,
            AuditOperation::Clear,
        ]
    );
    let sources: Vec<_> = audit.events().iter().take(2).map(|event| event.source).collect();
    assert_eq!(sources, vec![AuditSource::Backend, AuditSource::Cache]);
}

#[tokio::test]
async fn test_generate_stores_material() {
    let store = Arc::new(ScriptedStore::new());
    let (broker, _) = broker(store.clone());

    let secret = broker.generate_secret("encryption-key", SecretKind::Key, None).await.unwrap();
    assert_eq!(secret.len(), 64);
    assert_eq!(
        store.value("encryption-key"),
        Some(SecretValue::text(secret.expose_secret()))
    );
}

#[tokio::test]
async fn test_health_reports_failure_as_status() {
    let store = Arc::new(ScriptedStore::new());
    let (broker, _) = broker(store.clone());
    store.set_offline(true);

    let status = broker.health().await;
    assert!(!status.healthy);
    assert!(status.detail.unwrap().contains("offline"));
}

#[tokio::test]
async fn test_validation_is_caller_side_by_default() {
    let store = Arc::new(ScriptedStore::new());
    let (broker, _) = broker(store.clone());
    broker.set_secret("db-password", &SecretValue::text("abc"), None).await.unwrap();
    assert_eq!(store.value("db-password"), Some(SecretValue::text("abc")));

    let options = BrokerOptions { enforce_validation: true, ..BrokerOptions::default() };
    let (strict, _) = broker_with_options(store.clone(), options);
    assert!(strict.set_secret("db-password", &SecretValue::text("abc"), None).await.is_err());
    assert_eq!(store.writes(), 1);
}

#[tokio::test]
async fn test_exists_reports_presence_per_key() {
    let store = Arc::new(ScriptedStore::new().with(JWT_SECRET, "signing-secret"));
    store.fail_reads(ENCRYPTION_KEY);
    let (broker, _) = broker(store.clone());

    assert!(broker.secret_exists(JWT_SECRET).await.unwrap());
    assert!(!broker.secret_exists(DATABASE_URL).await.unwrap());

    let presence = broker.secrets_exist(&[JWT_SECRET, DATABASE_URL, ENCRYPTION_KEY]).await.unwrap();
    assert_eq!(presence.len(), 3);
    assert!(presence[JWT_SECRET]);
    assert!(!presence[DATABASE_URL]);
    assert!(!presence[ENCRYPTION_KEY]);
}
