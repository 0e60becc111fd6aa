//! Administrative removal of lock keys.

use resource_lock_core::error::LockResult;
use resource_lock_core::traits::LockStoreAdmin;
use tracing::{error, instrument, warn};

use crate::config::LockConfig;

/// Force-removes every lock under a namespace, ignoring ownership.
///
/// This breaks the mutual-exclusion guarantee for anyone currently inside a
/// critical section. Use it for test isolation or to recover from a known
/// bad state, never from request-handling code.
pub struct LockCleanupService<S> {
    store: S,
    namespace: String,
}

impl<S: LockStoreAdmin> LockCleanupService<S> {
    /// Creates a cleanup service for the namespace in `config`.
    pub fn new(store: S, config: &LockConfig) -> Self {
        Self {
            store,
            namespace: config.namespace().to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Deletes every key under `{namespace}:` and returns how many were removed.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn force_cleanup_all_locks(&self) -> LockResult<u64> {
        let prefix = format!("{}:", self.namespace);
        match self.store.delete_matching(&prefix).await {
            Ok(removed) => {
                warn!(removed, "force-removed locks regardless of owner");
                Ok(removed)
            }
            Err(e) => {
                error!(error = %e, "lock cleanup failed");
                Err(e)
            }
        }
    }
}
