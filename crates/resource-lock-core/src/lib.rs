//! Core traits and types for resource-scoped distributed locks.

pub mod backoff;
pub mod error;
pub mod key;
pub mod prelude;
pub mod token;
pub mod traits;

pub use error::{LockError, LockResult};
pub use prelude::*;
