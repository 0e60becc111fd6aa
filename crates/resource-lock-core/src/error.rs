//! Error types for distributed lock operations.

use thiserror::Error;

/// Errors that can occur during lock operations.
///
/// Contention is deliberately absent: a lock that is held by someone else is
/// reported as `None`/`false` by the primitive, not as an error.
#[derive(Error, Debug)]
pub enum LockError {
    /// The lock could not be acquired and the caller asked for a hard failure.
    #[error("failed to acquire lock for key {key}")]
    AcquisitionFailed { key: String },

    /// Communication with the lock store failed.
    #[error("lock store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Connecting to the lock store failed.
    #[error("connection error: {0}")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Invalid lock key.
    #[error("invalid lock key: {0}")]
    InvalidKey(String),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LockError {
    /// Wraps a backend failure message as a store error.
    pub fn store(message: impl Into<String>) -> Self {
        LockError::Store(Box::new(std::io::Error::other(message.into())))
    }
}

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;
