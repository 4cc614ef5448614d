use keel_migrate::{LockSettings, MigrationError, MigrationLock, PollingLock, VersionLedger};
use keel_storage::{InMemoryStore, RowStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

async fn shared_store() -> Arc<dyn RowStore> {
    let store: Arc<dyn RowStore> = Arc::new(InMemoryStore::new());
    VersionLedger::new(store.clone()).ensure_schema().await.unwrap();
    store
}

#[tokio::test(start_paused = true)]
async fn test_contended_lock_gives_up_after_ten_polls() {
    let store = shared_store().await;
    let holder = PollingLock::new(store.clone());
    let contender = PollingLock::new(store.clone());

    holder.acquire("schema_migration", "instance-A").await.unwrap();

    let started = Instant::now();
    let err = contender
        .acquire("schema_migration", "instance-B")
        .await
        .unwrap_err();

    match err {
        MigrationError::LockAcquisition { lock_key, attempts } => {
            assert_eq!(lock_key, "schema_migration");
            assert_eq!(attempts, 11);
        }
        other => panic!("unexpected error {other:?}"),
    }
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(10), "waited {waited:?}");
    assert!(waited < Duration::from_secs(11), "waited {waited:?}");

    let record = holder.inspect("schema_migration").await.unwrap().unwrap();
    assert_eq!(record.locked_by.as_deref(), Some("instance-A"));
}

#[tokio::test(start_paused = true)]
async fn test_waiting_owner_gets_lock_after_release() {
    let store = shared_store().await;
    let holder = PollingLock::new(store.clone());
    let waiter = PollingLock::new(store.clone());

    holder.acquire("k", "instance-A").await.unwrap();

    let release = async {
        tokio::time::sleep(Duration::from_millis(3500)).await;
        holder.release("k", "instance-A").await.unwrap()
    };
    let (released, acquired) = tokio::join!(release, waiter.acquire("k", "instance-B"));

    assert!(released);
    acquired.unwrap();
    let record = waiter.inspect("k").await.unwrap().unwrap();
    assert_eq!(record.locked_by.as_deref(), Some("instance-B"));
}

#[tokio::test]
async fn test_concurrent_attempts_have_at_most_one_winner() {
    let store = shared_store().await;
    let a = PollingLock::new(store.clone());
    let b = PollingLock::new(store.clone());

    let (first, second) = tokio::join!(a.try_acquire("k", "a"), b.try_acquire("k", "b"));
    let winners = [first.unwrap(), second.unwrap()]
        .iter()
        .filter(|won| **won)
        .count();
    assert_eq!(winners, 1);
}

#[tokio::test(start_paused = true)]
async fn test_custom_settings() {
    let store = shared_store().await;
    let holder = PollingLock::new(store.clone());
    let contender = PollingLock::with_settings(
        store,
        LockSettings {
            retries: 2,
            retry_interval: Duration::from_millis(500),
        },
    );
    holder.acquire("k", "a").await.unwrap();

    let started = Instant::now();
    assert!(matches!(
        contender.acquire("k", "b").await,
        Err(MigrationError::LockAcquisition { attempts: 3, .. })
    ));
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(started.elapsed() < Duration::from_millis(1500));
}
