//! Core traits for lock stores.

use std::future::Future;
use std::time::Duration;

use crate::error::LockResult;

// ============================================================================
// Lock Store Trait
// ============================================================================

/// Atomic conditional operations against a shared key-value store.
///
/// Every mutating operation must be a single atomic step at the store, so a
/// concurrent client can never interleave between the ownership check and
/// the write. Implementations hold no lock state of their own beyond what
/// the store needs.
///
/// Errors returned from these methods mean the store could not be reached or
/// answered unexpectedly. A lock that is held by someone else is `Ok(false)`.
///
/// # Example
///
/// ```rust,ignore
/// let token = LockToken::generate();
/// if store.acquire_if_absent("lock:cart:user1", token.as_str(), ttl).await? {
///     // critical section
///     store.release_if_owned("lock:cart:user1", token.as_str()).await?;
/// }
/// ```
pub trait LockStore: Send + Sync {
    /// Sets `key = token` with the given TTL, only if `key` does not exist.
    fn acquire_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> impl Future<Output = LockResult<bool>> + Send;

    /// Deletes `key` only if its stored value equals `token`.
    fn release_if_owned(
        &self,
        key: &str,
        token: &str,
    ) -> impl Future<Output = LockResult<bool>> + Send;

    /// Resets the TTL of `key` only if its stored value equals `token`.
    ///
    /// The stored value is left unchanged.
    fn extend_if_owned(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> impl Future<Output = LockResult<bool>> + Send;

    /// Returns the token currently stored against `key`.
    fn owner(&self, key: &str) -> impl Future<Output = LockResult<Option<String>>> + Send;

    /// Returns the time left before `key` expires.
    ///
    /// `None` when the key does not exist or carries no expiry.
    fn remaining_ttl(&self, key: &str)
    -> impl Future<Output = LockResult<Option<Duration>>> + Send;
}

// ============================================================================
// Administrative Trait
// ============================================================================

/// Privileged operations that ignore lock ownership.
///
/// Only operational tooling should hold a value of this trait; nothing on
/// the acquire/release path requires it.
pub trait LockStoreAdmin: LockStore {
    /// Deletes every key starting with `prefix`, returning how many were removed.
    fn delete_matching(&self, prefix: &str) -> impl Future<Output = LockResult<u64>> + Send;
}

/// Converts a TTL into whole milliseconds, never less than one.
///
/// A zero TTL would make `PX`-style expiry reject the command, so it is
/// rounded up to the smallest value the stores accept.
pub fn ttl_millis(ttl: Duration) -> u64 {
    let millis = ttl.as_millis();
    if millis == 0 {
        1
    } else {
        u64::try_from(millis).unwrap_or(u64::MAX)
    }
}
