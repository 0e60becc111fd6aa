//! Lock key validation.

use std::fmt;

use tracing::warn;

use crate::error::{LockError, LockResult};

/// Maximum length of a stored lock key, in characters.
pub const MAX_KEY_LENGTH: usize = 250;

/// Number of colon-separated segments in a conforming key
/// (`{service}:{resource-type}:{resource-id}`).
const CONFORMING_SEGMENTS: usize = 3;

/// A validated lock key as stored in the lock store.
///
/// Keys must be non-empty and at most [`MAX_KEY_LENGTH`] characters. Keys that
/// don't follow the `{service}:{resource-type}:{resource-id}` layout are still
/// accepted; see [`LockKey::warn_if_non_conforming`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey(String);

impl LockKey {
    /// Validates a fully-qualified key.
    pub fn parse(raw: impl Into<String>) -> LockResult<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(LockError::InvalidKey("lock key cannot be empty".to_string()));
        }

        let length = raw.chars().count();
        if length > MAX_KEY_LENGTH {
            return Err(LockError::InvalidKey(format!(
                "lock key is {length} characters, maximum is {MAX_KEY_LENGTH}"
            )));
        }

        Ok(Self(raw))
    }

    /// Builds `{namespace}:{key}` and validates the result.
    pub fn namespaced(namespace: &str, key: &str) -> LockResult<Self> {
        if key.is_empty() {
            return Err(LockError::InvalidKey("lock key cannot be empty".to_string()));
        }
        Self::parse(format!("{namespace}:{key}"))
    }

    /// Returns true when the key has at least three non-empty segments.
    ///
    /// The resource id may itself contain colons, so extra segments are fine.
    pub fn is_conforming(&self) -> bool {
        let segments: Vec<&str> = self.0.splitn(CONFORMING_SEGMENTS, ':').collect();
        segments.len() == CONFORMING_SEGMENTS && segments.iter().all(|s| !s.is_empty())
    }

    /// Logs a warning if the key isn't conforming. Returns whether it warned.
    pub fn warn_if_non_conforming(&self) -> bool {
        if self.is_conforming() {
            return false;
        }
        warn!(lock.key = %self.0, "lock key does not match {{service}}:{{resource-type}}:{{resource-id}}");
        true
    }

    /// Returns the key as stored.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LockKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(LockKey::parse(""), Err(LockError::InvalidKey(_))));
        assert!(matches!(
            LockKey::namespaced("lock", ""),
            Err(LockError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_key_length_limit() {
        let exact = "a".repeat(MAX_KEY_LENGTH);
        assert!(LockKey::parse(exact).is_ok());

        let too_long = "a".repeat(MAX_KEY_LENGTH + 1);
        assert!(matches!(
            LockKey::parse(too_long),
            Err(LockError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_namespace_counts_toward_length() {
        let id = "x".repeat(MAX_KEY_LENGTH - "lock:".len());
        assert!(LockKey::namespaced("lock", &id).is_ok());

        let id = "x".repeat(MAX_KEY_LENGTH - "lock:".len() + 1);
        assert!(LockKey::namespaced("lock", &id).is_err());
    }

    #[test]
    fn test_conforming_keys() {
        assert!(LockKey::parse("lock:cart:user123").unwrap().is_conforming());
        assert!(LockKey::parse("lock:order:2024:42").unwrap().is_conforming());
    }

    #[test]
    fn test_non_conforming_keys_accepted() {
        let key = LockKey::parse("just-a-name").unwrap();
        assert!(!key.is_conforming());
        assert_eq!(key.as_str(), "just-a-name");

        let key = LockKey::parse("lock::user1").unwrap();
        assert!(!key.is_conforming());
        assert!(key.warn_if_non_conforming());
        assert!(!LockKey::parse("lock:cart:u1").unwrap().warn_if_non_conforming());
    }

    #[test]
    fn test_namespaced_display() {
        let key = LockKey::namespaced("lock", "inventory:sku-9").unwrap();
        assert_eq!(key.to_string(), "lock:inventory:sku-9");
    }
}
