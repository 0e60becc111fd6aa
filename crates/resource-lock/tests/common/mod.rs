//! Shared helpers for lock integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use resource_lock::{
    DistributedLock, InMemoryLockStore, LockConfig, LockError, LockManager, LockMetrics,
    LockResult, LockStore,
};

/// Config with short backoff so contention tests finish quickly.
pub fn fast_config() -> LockConfig {
    LockConfig::builder()
        .default_ttl(Duration::from_secs(10))
        .default_max_retries(3)
        .retry_base_delay(Duration::from_millis(5))
        .retry_max_delay(Duration::from_millis(40))
        .build()
        .unwrap()
}

/// A lock over a fresh in-memory store with its own metrics.
pub fn memory_lock() -> DistributedLock<InMemoryLockStore> {
    memory_lock_with(fast_config())
}

pub fn memory_lock_with(config: LockConfig) -> DistributedLock<InMemoryLockStore> {
    DistributedLock::new(InMemoryLockStore::new(), config, Arc::new(LockMetrics::new()))
}

pub fn memory_manager() -> LockManager<InMemoryLockStore> {
    LockManager::new(memory_lock())
}

/// A store whose every call fails, like a backend that can't be reached.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnreachableStore;

fn refused<T>() -> LockResult<T> {
    Err(LockError::store("connection refused"))
}

impl LockStore for UnreachableStore {
    async fn acquire_if_absent(&self, _key: &str, _token: &str, _ttl: Duration) -> LockResult<bool> {
        refused()
    }

    async fn release_if_owned(&self, _key: &str, _token: &str) -> LockResult<bool> {
        refused()
    }

    async fn extend_if_owned(&self, _key: &str, _token: &str, _ttl: Duration) -> LockResult<bool> {
        refused()
    }

    async fn owner(&self, _key: &str) -> LockResult<Option<String>> {
        refused()
    }

    async fn remaining_ttl(&self, _key: &str) -> LockResult<Option<Duration>> {
        refused()
    }
}

pub fn unreachable_lock() -> DistributedLock<UnreachableStore> {
    DistributedLock::new(UnreachableStore, fast_config(), Arc::new(LockMetrics::new()))
}
