//! Redis lock store construction.

use resource_lock_core::error::{LockError, LockResult};
use fred::prelude::*;

use crate::store::RedisLockStore;

/// Builder for a Redis-backed lock store.
///
/// Only a single server is supported: quorum locking across independent
/// servers is out of scope for this store.
pub struct RedisLockStoreBuilder {
    url: Option<String>,
    client: Option<RedisClient>,
}

impl RedisLockStoreBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            url: None,
            client: None,
        }
    }

    /// Sets the Redis server URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Uses an existing, already configured Redis client.
    ///
    /// Takes precedence over [`url`](Self::url). The client is connected
    /// during [`build`](Self::build) if it isn't already.
    pub fn client(mut self, client: RedisClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Connects and builds the store.
    pub async fn build(self) -> LockResult<RedisLockStore> {
        let client = match (self.client, self.url) {
            (Some(client), _) => client,
            (None, Some(url)) => {
                let config = RedisConfig::from_url(&url).map_err(|e| {
                    LockError::Connection(Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("invalid Redis URL: {}", e),
                    )))
                })?;
                RedisClient::new(config, None, None, None)
            }
            (None, None) => {
                return Err(LockError::InvalidConfig(
                    "no Redis client or URL provided".to_string(),
                ));
            }
        };

        if !client.is_connected() {
            client.connect();
            client.wait_for_connect().await.map_err(|e| {
                LockError::Connection(Box::new(std::io::Error::other(format!(
                    "failed to connect to Redis: {}",
                    e
                ))))
            })?;
        }

        Ok(RedisLockStore::from_client(client))
    }
}

impl Default for RedisLockStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}
