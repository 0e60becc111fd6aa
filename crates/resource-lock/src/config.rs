//! Process-wide lock defaults.

use std::str::FromStr;
use std::time::Duration;

use resource_lock_core::backoff::Backoff;
use resource_lock_core::error::{LockError, LockResult};

/// Environment variable overriding the key namespace.
pub const ENV_NAMESPACE: &str = "RESOURCE_LOCK_NAMESPACE";
/// Environment variable overriding the default TTL, in seconds.
pub const ENV_DEFAULT_TTL_SECS: &str = "RESOURCE_LOCK_DEFAULT_TTL_SECS";
/// Environment variable overriding the default retry count.
pub const ENV_DEFAULT_MAX_RETRIES: &str = "RESOURCE_LOCK_DEFAULT_MAX_RETRIES";
/// Environment variable overriding the backoff base delay, in milliseconds.
pub const ENV_RETRY_BASE_DELAY_MS: &str = "RESOURCE_LOCK_RETRY_BASE_DELAY_MS";
/// Environment variable overriding the backoff cap, in milliseconds.
pub const ENV_RETRY_MAX_DELAY_MS: &str = "RESOURCE_LOCK_RETRY_MAX_DELAY_MS";

/// Defaults applied when a call doesn't override them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    namespace: String,
    default_ttl: Duration,
    default_max_retries: u32,
    backoff: Backoff,
}

impl LockConfig {
    /// Returns a new builder for configuring lock defaults.
    pub fn builder() -> LockConfigBuilder {
        LockConfigBuilder::new()
    }

    /// Builds a configuration from `RESOURCE_LOCK_*` environment variables.
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> LockResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> LockResult<Self> {
        let mut builder = Self::builder();

        if let Some(namespace) = lookup(ENV_NAMESPACE) {
            builder = builder.namespace(namespace);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_DEFAULT_TTL_SECS)? {
            builder = builder.default_ttl(Duration::from_secs(secs));
        }
        if let Some(retries) = parse_var::<u32>(&lookup, ENV_DEFAULT_MAX_RETRIES)? {
            builder = builder.default_max_retries(retries);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_RETRY_BASE_DELAY_MS)? {
            builder = builder.retry_base_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_RETRY_MAX_DELAY_MS)? {
            builder = builder.retry_max_delay(Duration::from_millis(ms));
        }

        builder.build()
    }

    /// Prefix prepended to every key, e.g. `lock` in `lock:cart:user1`.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn default_max_retries(&self) -> u32 {
        self.default_max_retries
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            namespace: "lock".to_string(),
            default_ttl: Duration::from_secs(30),
            default_max_retries: 3,
            backoff: Backoff::default(),
        }
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> LockResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| LockError::InvalidConfig(format!("{name}={raw:?}: {e}"))),
    }
}

/// Builder for [`LockConfig`].
pub struct LockConfigBuilder {
    namespace: String,
    default_ttl: Duration,
    default_max_retries: u32,
    retry_base_delay: Duration,
    retry_max_delay: Duration,
}

impl LockConfigBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        let defaults = LockConfig::default();
        Self {
            namespace: defaults.namespace,
            default_ttl: defaults.default_ttl,
            default_max_retries: defaults.default_max_retries,
            retry_base_delay: defaults.backoff.base(),
            retry_max_delay: defaults.backoff.max(),
        }
    }

    /// Sets the key namespace.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the TTL used when a call doesn't pass one.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Sets the retry count used when a call doesn't pass one.
    pub fn default_max_retries(mut self, retries: u32) -> Self {
        self.default_max_retries = retries;
        self
    }

    /// Sets the delay before the first retry.
    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Sets the upper bound on a single retry delay (before jitter).
    pub fn retry_max_delay(mut self, delay: Duration) -> Self {
        self.retry_max_delay = delay;
        self
    }

    /// Validates and builds the configuration.
    pub fn build(self) -> LockResult<LockConfig> {
        if self.namespace.is_empty() || self.namespace.contains(['*', '?', '[', ']']) {
            return Err(LockError::InvalidConfig(format!(
                "namespace {:?} must be non-empty and free of glob characters",
                self.namespace
            )));
        }
        if self.default_ttl.is_zero() {
            return Err(LockError::InvalidConfig(
                "default TTL must be greater than zero".to_string(),
            ));
        }
        if self.retry_max_delay < self.retry_base_delay {
            return Err(LockError::InvalidConfig(format!(
                "retry max delay {:?} is below base delay {:?}",
                self.retry_max_delay, self.retry_base_delay
            )));
        }

        Ok(LockConfig {
            namespace: self.namespace,
            default_ttl: self.default_ttl,
            default_max_retries: self.default_max_retries,
            backoff: Backoff::new(self.retry_base_delay, self.retry_max_delay),
        })
    }
}

impl Default for LockConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
