// ============================================================================
// Liveness Reporting Tests
// ============================================================================
//
// Status keys, heartbeat and per-message WORKING markers against an
// in-memory store.
//
// Run with: cargo test --test liveness_test
//
// ============================================================================

mod test_utils;

use identity_config::LivenessConfig;
use identity_shared::liveness::{
    LivenessNotifier, FIELD_LAST_ALIVE, FIELD_MACHINE, FIELD_STATUS, FIELD_STATUS_TIME,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use test_utils::InMemoryLivenessStore;

const IDENTITY: &str = "4242@node-a";

fn liveness_config() -> LivenessConfig {
    LivenessConfig {
        application_identifier: "identity-test:".to_string(),
        owner_field: "CONSUMERID".to_string(),
        machine_name: "node-a".to_string(),
        key_ttl: Duration::from_secs(60),
        message_ttl: Duration::from_secs(300),
        heartbeat_interval: Duration::from_secs(15),
    }
}

fn notifier_with(
    config: LivenessConfig,
) -> (Arc<InMemoryLivenessStore>, LivenessNotifier) {
    let store = Arc::new(InMemoryLivenessStore::default());
    let notifier = LivenessNotifier::with_identity(store.clone(), config, IDENTITY);
    (store, notifier)
}

#[tokio::test]
async fn test_keys_are_namespaced() {
    let (_, notifier) = notifier_with(liveness_config());

    assert_eq!(notifier.identity(), IDENTITY);
    assert_eq!(notifier.process_key(), "identity-test:4242@node-a");
    assert_eq!(notifier.message_key("m-1"), "identity-test:working:m-1");
}

#[tokio::test]
async fn test_default_identity_uses_pid_and_machine() {
    let store = Arc::new(InMemoryLivenessStore::default());
    let notifier = LivenessNotifier::new(store, liveness_config());

    assert_eq!(
        notifier.identity(),
        format!("{}@node-a", std::process::id())
    );
}

#[tokio::test]
async fn test_set_starting_writes_status_with_server_time() {
    let (store, notifier) = notifier_with(liveness_config());

    notifier.set_starting().await.unwrap();

    let key = notifier.process_key();
    assert_eq!(store.field(key, FIELD_STATUS).as_deref(), Some("STARTING"));
    assert_eq!(store.field(key, FIELD_MACHINE).as_deref(), Some("node-a"));
    assert_eq!(store.field(key, "CONSUMERID").as_deref(), Some(IDENTITY));
    assert_eq!(
        store.field(key, FIELD_STATUS_TIME),
        Some(store.server_now().to_rfc3339())
    );
    assert_eq!(
        store.ttls.lock().unwrap().get(key).copied(),
        Some(Duration::from_secs(60))
    );

    notifier.stop().await.unwrap();
}

#[tokio::test]
async fn test_set_idle_overwrites_status() {
    let (store, notifier) = notifier_with(liveness_config());

    notifier.set_starting().await.unwrap();
    notifier.set_idle().await.unwrap();

    assert_eq!(
        store.field(notifier.process_key(), FIELD_STATUS).as_deref(),
        Some("IDLE")
    );
    notifier.stop().await.unwrap();
}

#[tokio::test]
async fn test_set_working_writes_message_key_and_process_status() {
    let (store, notifier) = notifier_with(liveness_config());

    let guard = notifier.set_working("m-1").await.unwrap();

    let key = "identity-test:working:m-1";
    assert_eq!(guard.key(), key);
    assert_eq!(store.field(key, FIELD_STATUS).as_deref(), Some("WORKING"));
    assert_eq!(store.field(key, "CONSUMERID").as_deref(), Some(IDENTITY));
    assert_eq!(
        store.ttls.lock().unwrap().get(key).copied(),
        Some(Duration::from_secs(300))
    );
    assert_eq!(
        store.field(notifier.process_key(), FIELD_STATUS).as_deref(),
        Some("WORKING")
    );

    guard.release().await.unwrap();

    assert!(!store.exists(key));
    assert_eq!(store.delete_count(key), 1);
}

#[tokio::test]
async fn test_dropped_guard_deletes_key_once() {
    let (store, notifier) = notifier_with(liveness_config());
    let key = notifier.message_key("m-drop");

    async fn failing_work(notifier: &LivenessNotifier) -> Result<(), &'static str> {
        let _guard = notifier.set_working("m-drop").await.map_err(|_| "liveness")?;
        Err("handler blew up")
    }

    assert!(failing_work(&notifier).await.is_err());

    // Drop spawns the delete
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!store.exists(&key));
    assert_eq!(store.delete_count(&key), 1);
}

#[tokio::test]
async fn test_failed_set_working_leaves_no_message_key() {
    let (store, notifier) = notifier_with(liveness_config());
    store.fail.store(true, Ordering::SeqCst);

    assert!(notifier.set_working("m-down").await.is_err());

    let key = notifier.message_key("m-down");
    assert!(!store.exists(&key));
    assert_eq!(store.delete_count(&key), 1);
}

#[tokio::test]
async fn test_heartbeat_refreshes_last_alive() {
    let config = LivenessConfig {
        heartbeat_interval: Duration::from_millis(20),
        ..liveness_config()
    };
    let (store, notifier) = notifier_with(config);

    notifier.set_starting().await.unwrap();
    assert_eq!(store.field(notifier.process_key(), FIELD_LAST_ALIVE), None);

    tokio::time::sleep(Duration::from_millis(80)).await;

    assert_eq!(
        store.field(notifier.process_key(), FIELD_LAST_ALIVE),
        Some(store.server_now().to_rfc3339())
    );
    notifier.stop().await.unwrap();
}

#[tokio::test]
async fn test_set_idle_waits_for_every_in_flight_message() {
    let (store, notifier) = notifier_with(liveness_config());
    let status = |store: &InMemoryLivenessStore| store.field(notifier.process_key(), FIELD_STATUS);

    let first = notifier.set_working("m-a").await.unwrap();
    let second = notifier.set_working("m-b").await.unwrap();
    assert_eq!(notifier.in_flight(), 2);

    first.release().await.unwrap();
    notifier.set_idle().await.unwrap();
    assert_eq!(status(&store).as_deref(), Some("WORKING"));
    assert!(store.exists(&notifier.message_key("m-b")));

    second.release().await.unwrap();
    notifier.set_idle().await.unwrap();
    assert_eq!(notifier.in_flight(), 0);
    assert_eq!(status(&store).as_deref(), Some("IDLE"));
}

#[tokio::test]
async fn test_dropped_guard_no_longer_counts_as_in_flight() {
    let (store, notifier) = notifier_with(liveness_config());

    drop(notifier.set_working("m-drop").await.unwrap());
    notifier.set_idle().await.unwrap();

    assert_eq!(
        store.field(notifier.process_key(), FIELD_STATUS).as_deref(),
        Some("IDLE")
    );
}

#[tokio::test]
async fn test_heartbeat_refreshes_in_flight_message_ttl() {
    let config = LivenessConfig {
        heartbeat_interval: Duration::from_millis(20),
        ..liveness_config()
    };
    let (store, notifier) = notifier_with(config);
    notifier.set_starting().await.unwrap();

    let guard = notifier.set_working("m-long").await.unwrap();
    let key = guard.key().to_string();
    store.ttls.lock().unwrap().remove(&key);

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(
        store.ttls.lock().unwrap().get(&key).copied(),
        Some(Duration::from_secs(300))
    );

    // Released keys are left alone
    guard.release().await.unwrap();
    store.ttls.lock().unwrap().remove(&key);
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(!store.ttls.lock().unwrap().contains_key(&key));

    notifier.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_removes_process_key() {
    let (store, notifier) = notifier_with(liveness_config());

    notifier.set_starting().await.unwrap();
    notifier.stop().await.unwrap();

    assert!(!store.exists(notifier.process_key()));
}
