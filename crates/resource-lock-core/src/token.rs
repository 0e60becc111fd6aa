//! Lock ownership tokens.

use std::fmt;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

/// Proof of ownership for a held lock.
///
/// A fresh token is generated on every successful acquisition. Release and
/// extend only succeed when the token matches the value stored against the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    /// Generates a new unique token.
    ///
    /// Format: `{process_id}_{counter}_{random}_{unix_millis}`
    pub fn generate() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let counter = COUNTER.fetch_add(1, Ordering::Relaxed);

        let pid = process::id();
        let random: u64 = rand::thread_rng().r#gen();

        // A clock before the epoch only loses the timestamp part; the
        // counter and random bits still keep the token unique.
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();

        Self(format!("{pid}_{counter}_{random:016x}_{millis}"))
    }

    /// Wraps a token previously handed out by [`LockToken::generate`].
    pub fn from_string(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the token carries no value.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LockToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
