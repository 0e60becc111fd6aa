//! Redis lock store implementation.

use std::time::Duration;

use fred::prelude::*;
use fred::types::CustomCommand;
use resource_lock_core::error::{LockError, LockResult};
use resource_lock_core::traits::{ttl_millis, LockStore, LockStoreAdmin};
use tracing::{debug, instrument};

/// Number of keys requested per `SCAN` page during cleanup.
const SCAN_PAGE_SIZE: i64 = 100;

/// A lock store backed by a single Redis server.
#[derive(Clone)]
pub struct RedisLockStore {
    client: RedisClient,
}

impl RedisLockStore {
    /// Lua script to extend the lock duration.
    const EXTEND_SCRIPT_LUA: &'static str = r#"
        if redis.call('get', KEYS[1]) == ARGV[1] then
            return redis.call('pexpire', KEYS[1], ARGV[2])
        end
        return 0
    "#;

    /// Lua script to release the lock.
    const RELEASE_SCRIPT_LUA: &'static str = r#"
        if redis.call('get', KEYS[1]) == ARGV[1] then
            return redis.call('del', KEYS[1])
        end
        return 0
    "#;

    pub(crate) fn from_client(client: RedisClient) -> Self {
        Self { client }
    }

    /// Returns a new builder for configuring the store.
    pub fn builder() -> crate::provider::RedisLockStoreBuilder {
        crate::provider::RedisLockStoreBuilder::new()
    }

    /// Connects to the Redis server at `url`.
    pub async fn new(url: impl Into<String>) -> LockResult<Self> {
        Self::builder().url(url).build().await
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &RedisClient {
        &self.client
    }

    async fn eval_script(
        &self,
        script: &'static str,
        key: &str,
        args: Vec<RedisValue>,
        operation: &str,
    ) -> LockResult<i64> {
        let mut command_args: Vec<RedisValue> = vec![
            script.into(),
            1_i64.into(), // numkeys
            key.into(),
        ];
        command_args.extend(args);

        let cmd = CustomCommand::new_static("EVAL", None, false);
        self.client
            .custom(cmd, command_args)
            .await
            .map_err(|e| redis_error(&format!("EVAL ({operation})"), e))
    }
}

fn redis_error(command: &str, e: RedisError) -> LockError {
    LockError::store(format!("Redis {command} failed: {e}"))
}

fn px(ttl: Duration) -> i64 {
    i64::try_from(ttl_millis(ttl)).unwrap_or(i64::MAX)
}

impl LockStore for RedisLockStore {
    #[instrument(skip(self, token), fields(lock.key = %key, backend = "redis"))]
    async fn acquire_if_absent(&self, key: &str, token: &str, ttl: Duration) -> LockResult<bool> {
        // SET NX returns Some(value) if key was set, None if key already exists
        let result: Option<String> = self
            .client
            .set(
                key,
                token,
                Some(Expiration::PX(px(ttl))),
                Some(SetOptions::NX),
                false,
            )
            .await
            .map_err(|e| redis_error("SET NX", e))?;

        Ok(result.is_some())
    }

    #[instrument(skip(self, token), fields(lock.key = %key, backend = "redis"))]
    async fn release_if_owned(&self, key: &str, token: &str) -> LockResult<bool> {
        let deleted = self
            .eval_script(
                Self::RELEASE_SCRIPT_LUA,
                key,
                vec![token.into()],
                "release",
            )
            .await?;
        Ok(deleted == 1)
    }

    #[instrument(skip(self, token), fields(lock.key = %key, backend = "redis"))]
    async fn extend_if_owned(&self, key: &str, token: &str, ttl: Duration) -> LockResult<bool> {
        let extended = self
            .eval_script(
                Self::EXTEND_SCRIPT_LUA,
                key,
                vec![token.into(), px(ttl).into()],
                "extend",
            )
            .await?;
        Ok(extended == 1)
    }

    #[instrument(skip(self), fields(lock.key = %key, backend = "redis"))]
    async fn owner(&self, key: &str) -> LockResult<Option<String>> {
        self.client
            .get(key)
            .await
            .map_err(|e| redis_error("GET", e))
    }

    #[instrument(skip(self), fields(lock.key = %key, backend = "redis"))]
    async fn remaining_ttl(&self, key: &str) -> LockResult<Option<Duration>> {
        // PTTL: -2 when the key is missing, -1 when it has no expiry.
        let millis: i64 = self
            .client
            .pttl(key)
            .await
            .map_err(|e| redis_error("PTTL", e))?;

        Ok(u64::try_from(millis).ok().map(Duration::from_millis))
    }
}

impl LockStoreAdmin for RedisLockStore {
    #[instrument(skip(self), fields(prefix = %prefix, backend = "redis"))]
    async fn delete_matching(&self, prefix: &str) -> LockResult<u64> {
        let pattern = format!("{}*", escape_glob(prefix));
        let mut cursor = "0".to_string();
        let mut removed = 0u64;

        loop {
            let cmd = CustomCommand::new_static("SCAN", None, false);
            let args: Vec<RedisValue> = vec![
                cursor.as_str().into(),
                "MATCH".into(),
                pattern.as_str().into(),
                "COUNT".into(),
                SCAN_PAGE_SIZE.into(),
            ];
            let (next, keys): (String, Vec<String>) = self
                .client
                .custom(cmd, args)
                .await
                .map_err(|e| redis_error("SCAN", e))?;

            if !keys.is_empty() {
                let deleted: i64 = self
                    .client
                    .del(keys)
                    .await
                    .map_err(|e| redis_error("DEL", e))?;
                removed += u64::try_from(deleted).unwrap_or_default();
            }

            if next == "0" {
                break;
            }
            cursor = next;
        }

        debug!(removed, "deleted keys matching prefix");
        Ok(removed)
    }
}

/// Escapes the glob metacharacters Redis `MATCH` understands.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
