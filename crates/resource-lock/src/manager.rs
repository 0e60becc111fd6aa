//! Lock-scoped execution of critical sections.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use resource_lock_core::error::{LockError, LockResult};
use resource_lock_core::token::LockToken;
use resource_lock_core::traits::LockStore;
use tracing::{debug, instrument, warn};

use crate::lock::DistributedLock;

// ============================================================================
// Resource Types
// ============================================================================

/// Kinds of resource with their own key prefix and lock defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    /// A user's shopping cart, keyed by user id.
    Cart,
    /// A product's stock level, keyed by product id.
    Inventory,
    Order,
    Payment,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Cart => "cart",
            ResourceType::Inventory => "inventory",
            ResourceType::Order => "order",
            ResourceType::Payment => "payment",
        }
    }

    /// TTL used by the typed manager operations.
    pub fn default_ttl(&self) -> Duration {
        match self {
            ResourceType::Cart => Duration::from_secs(10),
            ResourceType::Inventory => Duration::from_secs(5),
            ResourceType::Order => Duration::from_secs(30),
            ResourceType::Payment => Duration::from_secs(60),
        }
    }

    /// Retry count used by the typed manager operations.
    ///
    /// Inventory sees the hottest contention during checkout; payments
    /// should fail fast rather than queue behind a slow gateway call.
    pub fn default_max_retries(&self) -> u32 {
        match self {
            ResourceType::Cart => 3,
            ResourceType::Inventory => 5,
            ResourceType::Order => 3,
            ResourceType::Payment => 2,
        }
    }

    /// Key for `id`, relative to the lock namespace: `{resource}:{id}`.
    pub fn key(&self, id: &str) -> String {
        format!("{}:{}", self.as_str(), id)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Release Guard
// ============================================================================

/// Releases the lock if the owning future is dropped before finishing.
///
/// The normal path calls [`ReleaseGuard::release`]; `Drop` only fires when
/// the caller's future was cancelled mid-critical-section.
struct ReleaseGuard<S: LockStore + 'static> {
    lock: Arc<DistributedLock<S>>,
    key: String,
    token: Option<LockToken>,
}

impl<S: LockStore + 'static> ReleaseGuard<S> {
    fn new(lock: Arc<DistributedLock<S>>, key: &str, token: LockToken) -> Self {
        Self {
            lock,
            key: key.to_string(),
            token: Some(token),
        }
    }

    async fn release(mut self) -> bool {
        match self.token.take() {
            Some(token) => self.lock.release(&self.key, &token).await,
            None => false,
        }
    }
}

impl<S: LockStore + 'static> Drop for ReleaseGuard<S> {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        let key = std::mem::take(&mut self.key);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let lock = self.lock.clone();
                handle.spawn(async move {
                    lock.release(&key, &token).await;
                });
            }
            Err(_) => {
                warn!(lock.key = %key, "no runtime to release abandoned lock; it will expire");
            }
        }
    }
}

// ============================================================================
// Lock Manager
// ============================================================================

/// Runs closures while holding a distributed lock.
///
/// Every `execute_*` method acquires the lock, awaits the closure's future,
/// and releases the lock on every exit path, including a panic inside the
/// closure. The closure is never invoked if the lock can't be acquired.
///
/// # Example
///
/// ```rust,ignore
/// let manager = LockManager::new(DistributedLock::with_defaults(store));
///
/// let total = manager
///     .execute_cart_operation("user-17", || async { cart.add_item(item).await })
///     .await;
/// ```
pub struct LockManager<S> {
    lock: Arc<DistributedLock<S>>,
}

impl<S> Clone for LockManager<S> {
    fn clone(&self) -> Self {
        Self {
            lock: self.lock.clone(),
        }
    }
}

impl<S: LockStore + 'static> LockManager<S> {
    pub fn new(lock: DistributedLock<S>) -> Self {
        Self::from_shared(Arc::new(lock))
    }

    /// Creates a manager over a lock that other code also uses directly.
    pub fn from_shared(lock: Arc<DistributedLock<S>>) -> Self {
        Self { lock }
    }

    /// The underlying primitive, for callers that need manual control.
    pub fn lock(&self) -> &Arc<DistributedLock<S>> {
        &self.lock
    }

    // ------------------------------------------------------------------------
    // Generic execution
    // ------------------------------------------------------------------------

    /// Runs `f` under `key` with the configured defaults.
    ///
    /// Returns `None` without calling `f` if the lock isn't acquired.
    pub async fn execute_with_lock<T, F, Fut>(&self, key: &str, f: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let config = self.lock.config();
        self.execute_with_lock_opts(key, config.default_ttl(), config.default_max_retries(), f)
            .await
    }

    /// Runs `f` under `key` with an explicit TTL and retry count.
    #[instrument(skip(self, f), fields(lock.key = %key, ttl = ?ttl))]
    pub async fn execute_with_lock_opts<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        max_retries: u32,
        f: F,
    ) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let token = self.lock.acquire_with(key, ttl, max_retries).await?;
        Some(self.run_locked(key, token, f).await)
    }

    /// Like [`execute_with_lock`](Self::execute_with_lock), but failing to
    /// acquire is an error.
    pub async fn execute_with_lock_or_throw<T, F, Fut>(&self, key: &str, f: F) -> LockResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let config = self.lock.config();
        self.execute_with_lock_or_throw_opts(
            key,
            config.default_ttl(),
            config.default_max_retries(),
            f,
        )
        .await
    }

    /// Returns [`LockError::AcquisitionFailed`] when the lock isn't acquired,
    /// or [`LockError::InvalidKey`] when `key` can't be a lock key.
    pub async fn execute_with_lock_or_throw_opts<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        max_retries: u32,
        f: F,
    ) -> LockResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.lock.qualified_key(key)?;
        self.execute_with_lock_opts(key, ttl, max_retries, f)
            .await
            .ok_or_else(|| LockError::AcquisitionFailed {
                key: key.to_string(),
            })
    }

    /// Runs `primary` under `key`, or `fallback` (unlocked) if the lock
    /// isn't acquired.
    pub async fn execute_with_lock_or_fallback<T, F, Fut, G, GFut>(
        &self,
        key: &str,
        primary: F,
        fallback: G,
    ) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = T>,
    {
        let config = self.lock.config();
        self.execute_with_lock_or_fallback_opts(
            key,
            config.default_ttl(),
            config.default_max_retries(),
            primary,
            fallback,
        )
        .await
    }

    pub async fn execute_with_lock_or_fallback_opts<T, F, Fut, G, GFut>(
        &self,
        key: &str,
        ttl: Duration,
        max_retries: u32,
        primary: F,
        fallback: G,
    ) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = T>,
    {
        match self.lock.acquire_with(key, ttl, max_retries).await {
            Some(token) => self.run_locked(key, token, primary).await,
            None => {
                debug!(lock.key = %key, "lock unavailable, running fallback");
                fallback().await
            }
        }
    }

    // ------------------------------------------------------------------------
    // Resource-typed execution
    // ------------------------------------------------------------------------

    /// Runs `f` while holding the lock on `user_id`'s cart.
    pub async fn execute_cart_operation<T, F, Fut>(&self, user_id: &str, f: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.execute_resource_operation(ResourceType::Cart, user_id, f)
            .await
    }

    /// Runs `f` while holding the lock on `product_id`'s inventory.
    pub async fn execute_inventory_operation<T, F, Fut>(&self, product_id: &str, f: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.execute_resource_operation(ResourceType::Inventory, product_id, f)
            .await
    }

    pub async fn execute_order_operation<T, F, Fut>(&self, order_id: &str, f: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.execute_resource_operation(ResourceType::Order, order_id, f)
            .await
    }

    pub async fn execute_payment_operation<T, F, Fut>(&self, payment_id: &str, f: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.execute_resource_operation(ResourceType::Payment, payment_id, f)
            .await
    }

    /// Runs `f` under `{resource}:{id}` with the resource's defaults.
    pub async fn execute_resource_operation<T, F, Fut>(
        &self,
        resource: ResourceType,
        id: &str,
        f: F,
    ) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.execute_with_lock_opts(
            &resource.key(id),
            resource.default_ttl(),
            resource.default_max_retries(),
            f,
        )
        .await
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    async fn run_locked<T, F, Fut>(&self, key: &str, token: LockToken, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let guard = ReleaseGuard::new(self.lock.clone(), key, token);

        // Building the future can panic too, so both steps run inside the
        // unwind boundary.
        let outcome = AssertUnwindSafe(async move { f().await })
            .catch_unwind()
            .await;

        if !guard.release().await {
            warn!(lock.key = %key, "lock was not held at release; it may have expired during the critical section");
        }

        match outcome {
            Ok(value) => value,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockConfig;
    use crate::metrics::LockMetrics;
    use resource_lock_memory::InMemoryLockStore;

    fn manager() -> LockManager<InMemoryLockStore> {
        let config = LockConfig::builder()
            .retry_base_delay(Duration::from_millis(2))
            .retry_max_delay(Duration::from_millis(10))
            .build()
            .unwrap();
        LockManager::new(DistributedLock::new(
            InMemoryLockStore::new(),
            config,
            Arc::new(LockMetrics::new()),
        ))
    }

    #[test]
    fn test_resource_keys() {
        assert_eq!(ResourceType::Cart.key("user1"), "cart:user1");
        assert_eq!(ResourceType::Inventory.key("sku-4"), "inventory:sku-4");
        assert_eq!(ResourceType::Order.key("o-1"), "order:o-1");
        assert_eq!(ResourceType::Payment.key("p-9"), "payment:p-9");
        assert_eq!(ResourceType::Payment.to_string(), "payment");
    }

    #[tokio::test]
    async fn test_lock_is_held_during_execution_and_released_after() {
        let manager = manager();
        let lock = manager.lock().clone();

        let seen_locked = manager
            .execute_with_lock("order:7", || async move { lock.is_locked("order:7").await })
            .await;

        assert_eq!(seen_locked, Some(true));
        assert!(!manager.lock().is_locked("order:7").await);
    }

    #[tokio::test]
    async fn test_closure_errors_still_release() {
        let manager = manager();

        let result: Option<Result<(), String>> = manager
            .execute_with_lock("cart:u1", || async { Err("out of stock".to_string()) })
            .await;

        assert_eq!(result, Some(Err("out of stock".to_string())));
        assert!(!manager.lock().is_locked("cart:u1").await);
    }

    #[tokio::test]
    async fn test_typed_operations_use_resource_prefix() {
        let manager = manager();
        let store = manager.lock().store().clone();

        let owner = manager
            .execute_inventory_operation("sku-1", || async move {
                store.owner("lock:inventory:sku-1").await.unwrap()
            })
            .await
            .unwrap();
        assert!(owner.is_some());
    }

    #[tokio::test]
    async fn test_dropped_execution_releases_in_background() {
        let manager = manager();

        let pending = manager.execute_with_lock("payment:p1", || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        // Poll long enough to acquire and enter the closure, then drop.
        let _ = tokio::time::timeout(Duration::from_millis(20), pending).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!manager.lock().is_locked("payment:p1").await);
    }

    #[tokio::test]
    async fn test_or_throw_reports_invalid_key() {
        let manager = manager();
        let result = manager.execute_with_lock_or_throw("", || async {}).await;
        assert!(matches!(result, Err(LockError::InvalidKey(_))));
    }
}
