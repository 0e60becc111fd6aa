//! Integration tests for the Redis lock store.

use std::sync::Arc;
use std::time::Duration;

use resource_lock::{
    DistributedLock, LockCleanupService, LockConfig, LockManager, LockMetrics, LockStore,
    LockToken, RedisLockStore,
};

/// Helper to get Redis URL from environment or use default.
fn get_redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

/// Each test gets its own namespace so parallel tests don't collide.
async fn redis_lock(namespace: &str) -> DistributedLock<RedisLockStore> {
    let store = RedisLockStore::new(get_redis_url()).await.unwrap();
    let config = LockConfig::builder()
        .namespace(namespace)
        .retry_base_delay(Duration::from_millis(10))
        .retry_max_delay(Duration::from_millis(100))
        .build()
        .unwrap();
    let lock = DistributedLock::new(store.clone(), config.clone(), Arc::new(LockMetrics::new()));
    LockCleanupService::new(store, &config)
        .force_cleanup_all_locks()
        .await
        .unwrap();
    lock
}

#[tokio::test]
#[ignore] // Requires Redis server running
async fn test_exclusive_acquisition_and_release() {
    let lock = redis_lock("test-exclusive").await;

    // First acquisition should succeed
    let t1 = lock.acquire("cart:user1").await.unwrap();

    // Second acquisition should fail (lock is held)
    assert!(lock
        .acquire_with("cart:user1", Duration::from_secs(5), 0)
        .await
        .is_none());

    // A foreign token cannot release it
    assert!(!lock.release("cart:user1", &LockToken::generate()).await);
    assert_eq!(lock.owner("cart:user1").await, Some(t1.clone()));

    // Release the lock
    assert!(lock.release("cart:user1", &t1).await);
    assert!(!lock.is_locked("cart:user1").await);
}

#[tokio::test]
#[ignore] // Requires Redis server running
async fn test_lock_expiry() {
    let lock = redis_lock("test-expiry").await;

    let t1 = lock
        .acquire_with_ttl("inventory:sku1", Duration::from_secs(1))
        .await
        .unwrap();

    // Wait for lock to expire (longer than expiry time)
    tokio::time::sleep(Duration::from_millis(1200)).await;

    assert!(!lock.is_locked("inventory:sku1").await);
    let t2 = lock.acquire("inventory:sku1").await.unwrap();
    assert_ne!(t1, t2);
    assert!(lock.release("inventory:sku1", &t2).await);
}

#[tokio::test]
#[ignore] // Requires Redis server running
async fn test_extend() {
    let lock = redis_lock("test-extend").await;

    let token = lock
        .acquire_with_ttl("order:o1", Duration::from_secs(2))
        .await
        .unwrap();

    assert!(!lock
        .extend("order:o1", &LockToken::generate(), Duration::from_secs(5))
        .await);
    assert!(lock.remaining_ttl("order:o1").await.unwrap() <= Duration::from_secs(2));

    assert!(lock.extend("order:o1", &token, Duration::from_secs(5)).await);
    assert!(lock.remaining_ttl("order:o1").await.unwrap() > Duration::from_secs(2));

    assert!(lock.release("order:o1", &token).await);
    assert_eq!(lock.remaining_ttl("order:o1").await, None);
}

#[tokio::test]
#[ignore] // Requires Redis server running
async fn test_manager_across_two_connections() {
    let a = LockManager::new(redis_lock("test-two-clients").await);
    let b_store = RedisLockStore::new(get_redis_url()).await.unwrap();
    let b = LockManager::new(DistributedLock::new(
        b_store,
        LockConfig::builder()
            .namespace("test-two-clients")
            .build()
            .unwrap(),
        Arc::new(LockMetrics::new()),
    ));

    let _holder = a.lock().acquire("payment:p1").await.unwrap();

    // A second client sees the lock held and falls back
    let result = b
        .execute_with_lock_or_fallback_opts(
            "payment:p1",
            Duration::from_secs(5),
            0,
            || async { "charged" },
            || async { "retry later" },
        )
        .await;
    assert_eq!(result, "retry later");
}

#[tokio::test]
#[ignore] // Requires Redis server running
async fn test_cleanup_removes_only_namespace() {
    let lock = redis_lock("test-cleanup").await;
    let store = lock.store().clone();

    store
        .acquire_if_absent("test-cleanup-other:key", "x", Duration::from_secs(30))
        .await
        .unwrap();
    lock.acquire("cart:u1").await.unwrap();
    lock.acquire("order:o1").await.unwrap();

    let cleanup = LockCleanupService::new(store.clone(), lock.config());
    assert_eq!(cleanup.force_cleanup_all_locks().await.unwrap(), 2);
    assert!(!lock.is_locked("cart:u1").await);

    assert!(store
        .release_if_owned("test-cleanup-other:key", "x")
        .await
        .unwrap());
}
