//! Distributed lock primitive.

use std::sync::Arc;
use std::time::Duration;

use resource_lock_core::backoff::Backoff;
use resource_lock_core::error::LockResult;
use resource_lock_core::key::LockKey;
use resource_lock_core::token::LockToken;
use resource_lock_core::traits::LockStore;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, instrument, warn};

use crate::config::LockConfig;
use crate::metrics::LockMetrics;

/// A mutual-exclusion lock shared by every process using the same store.
///
/// Keys passed to this type are relative to the configured namespace:
/// `acquire("cart:user1")` locks `lock:cart:user1` with the default config.
///
/// Contention is not an error. `acquire` returns `None` once its retries run
/// out, and `release`/`extend` return `false` when the token no longer owns
/// the key. Store failures are logged, counted, and reported the same way.
///
/// # Example
///
/// ```rust,ignore
/// let lock = DistributedLock::new(store, LockConfig::default(), Arc::new(LockMetrics::new()));
///
/// if let Some(token) = lock.acquire("order:42").await {
///     ship_order(42).await;
///     lock.release("order:42", &token).await;
/// }
/// ```
pub struct DistributedLock<S> {
    store: S,
    config: LockConfig,
    backoff: Backoff,
    metrics: Arc<LockMetrics>,
}

impl<S: LockStore> DistributedLock<S> {
    /// Creates a lock over `store`, reporting into `metrics`.
    pub fn new(store: S, config: LockConfig, metrics: Arc<LockMetrics>) -> Self {
        let backoff = config.backoff();
        Self {
            store,
            config,
            backoff,
            metrics,
        }
    }

    /// Creates a lock with default configuration and its own metrics.
    pub fn with_defaults(store: S) -> Self {
        Self::new(store, LockConfig::default(), Arc::new(LockMetrics::new()))
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<LockMetrics> {
        &self.metrics
    }

    /// Returns the fully-qualified store key for `key`.
    pub fn qualified_key(&self, key: &str) -> LockResult<LockKey> {
        LockKey::namespaced(self.config.namespace(), key)
    }

    fn resolve_key(&self, key: &str) -> Option<LockKey> {
        match self.qualified_key(key) {
            Ok(lock_key) => Some(lock_key),
            Err(e) => {
                error!(lock.key = %key, error = %e, "rejected lock key");
                None
            }
        }
    }

    // ------------------------------------------------------------------------
    // Acquisition
    // ------------------------------------------------------------------------

    /// Acquires `key` with the default TTL and retry count.
    pub async fn acquire(&self, key: &str) -> Option<LockToken> {
        self.acquire_with(key, self.config.default_ttl(), self.config.default_max_retries())
            .await
    }

    /// Acquires `key` with the given TTL and the default retry count.
    pub async fn acquire_with_ttl(&self, key: &str, ttl: Duration) -> Option<LockToken> {
        self.acquire_with(key, ttl, self.config.default_max_retries())
            .await
    }

    /// Acquires `key`, trying at most `max_retries + 1` times.
    ///
    /// Attempts are separated by exponential backoff with jitter.
    pub async fn acquire_with(
        &self,
        key: &str,
        ttl: Duration,
        max_retries: u32,
    ) -> Option<LockToken> {
        self.acquire_inner(key, ttl, max_retries, None).await
    }

    /// Like [`acquire_with`](Self::acquire_with), but gives up as soon as
    /// `cancel` reads `true`.
    ///
    /// Cancellation is checked before the first attempt and during every
    /// backoff wait. A cancelled acquisition returns `None`.
    pub async fn acquire_cancellable(
        &self,
        key: &str,
        ttl: Duration,
        max_retries: u32,
        cancel: watch::Receiver<bool>,
    ) -> Option<LockToken> {
        self.acquire_inner(key, ttl, max_retries, Some(cancel)).await
    }

    #[instrument(skip(self, cancel), fields(lock.key = %key, ttl = ?ttl))]
    async fn acquire_inner(
        &self,
        key: &str,
        ttl: Duration,
        max_retries: u32,
        mut cancel: Option<watch::Receiver<bool>>,
    ) -> Option<LockToken> {
        let lock_key = self.resolve_key(key)?;
        lock_key.warn_if_non_conforming();
        let token = LockToken::generate();
        let max_attempts = max_retries.saturating_add(1);
        let start = Instant::now();

        for attempt in 0..max_attempts {
            if is_cancelled(&cancel) {
                debug!(attempts = attempt, "lock acquisition cancelled");
                self.metrics.record_failure(attempt);
                return None;
            }

            match self
                .store
                .acquire_if_absent(lock_key.as_str(), token.as_str(), ttl)
                .await
            {
                Ok(true) => {
                    self.metrics.record_acquisition(attempt + 1, start.elapsed());
                    return Some(token);
                }
                Ok(false) => {}
                Err(e) => {
                    error!(error = %e, attempts = attempt + 1, "lock store error during acquire");
                    self.metrics.record_error();
                    self.metrics.record_failure(attempt + 1);
                    return None;
                }
            }

            if attempt + 1 < max_attempts {
                let delay = self.backoff.delay(attempt);
                if !wait_or_cancel(delay, &mut cancel).await {
                    debug!(attempts = attempt + 1, "lock acquisition cancelled");
                    self.metrics.record_failure(attempt + 1);
                    return None;
                }
            }
        }

        warn!(attempts = max_attempts, "lock still held after all attempts");
        self.metrics.record_failure(max_attempts);
        None
    }

    // ------------------------------------------------------------------------
    // Release / extend
    // ------------------------------------------------------------------------

    /// Releases `key` if `token` still owns it.
    ///
    /// Returns `false` for an empty token, an expired lock, or a lock now
    /// held by someone else.
    #[instrument(skip(self, token), fields(lock.key = %key))]
    pub async fn release(&self, key: &str, token: &LockToken) -> bool {
        if token.is_empty() {
            debug!("release skipped: empty token");
            return false;
        }
        let Some(lock_key) = self.resolve_key(key) else {
            return false;
        };

        match self
            .store
            .release_if_owned(lock_key.as_str(), token.as_str())
            .await
        {
            Ok(true) => {
                self.metrics.record_release();
                true
            }
            Ok(false) => {
                debug!("release skipped: token does not own the lock");
                false
            }
            Err(e) => {
                error!(error = %e, "lock store error during release");
                self.metrics.record_error();
                false
            }
        }
    }

    /// Resets the TTL of `key` to `ttl` if `token` still owns it.
    #[instrument(skip(self, token), fields(lock.key = %key, ttl = ?ttl))]
    pub async fn extend(&self, key: &str, token: &LockToken, ttl: Duration) -> bool {
        if token.is_empty() {
            debug!("extend skipped: empty token");
            return false;
        }
        let Some(lock_key) = self.resolve_key(key) else {
            return false;
        };

        match self
            .store
            .extend_if_owned(lock_key.as_str(), token.as_str(), ttl)
            .await
        {
            Ok(true) => {
                self.metrics.record_extension();
                true
            }
            Ok(false) => {
                debug!("extend skipped: token does not own the lock");
                false
            }
            Err(e) => {
                error!(error = %e, "lock store error during extend");
                self.metrics.record_error();
                false
            }
        }
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// Returns true if anyone currently holds `key`.
    pub async fn is_locked(&self, key: &str) -> bool {
        self.owner(key).await.is_some()
    }

    /// Returns the token currently holding `key`.
    pub async fn owner(&self, key: &str) -> Option<LockToken> {
        let lock_key = self.resolve_key(key)?;
        match self.store.owner(lock_key.as_str()).await {
            Ok(owner) => owner.map(LockToken::from_string),
            Err(e) => {
                error!(lock.key = %lock_key, error = %e, "lock store error during owner lookup");
                self.metrics.record_error();
                None
            }
        }
    }

    /// Returns the time left on `key`, or `None` if it isn't held.
    pub async fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let lock_key = self.resolve_key(key)?;
        match self.store.remaining_ttl(lock_key.as_str()).await {
            Ok(ttl) => ttl,
            Err(e) => {
                error!(lock.key = %lock_key, error = %e, "lock store error during TTL lookup");
                self.metrics.record_error();
                None
            }
        }
    }
}

fn is_cancelled(cancel: &Option<watch::Receiver<bool>>) -> bool {
    cancel.as_ref().is_some_and(|rx| *rx.borrow())
}

/// Sleeps for `delay`. Returns `false` if cancelled first.
async fn wait_or_cancel(delay: Duration, cancel: &mut Option<watch::Receiver<bool>>) -> bool {
    let Some(rx) = cancel else {
        tokio::time::sleep(delay).await;
        return true;
    };

    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            changed = rx.changed() => match changed {
                Ok(()) => {
                    if *rx.borrow_and_update() {
                        return false;
                    }
                }
                Err(_) => {
                    // Sender dropped: nobody can cancel any more.
                    (&mut sleep).await;
                    return true;
                }
            },
        }
    }
}
