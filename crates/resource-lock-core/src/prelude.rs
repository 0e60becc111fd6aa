//! Convenience prelude for distributed lock types.

pub use crate::backoff::Backoff;
pub use crate::error::{LockError, LockResult};
pub use crate::key::LockKey;
pub use crate::token::LockToken;
pub use crate::traits::{LockStore, LockStoreAdmin};
