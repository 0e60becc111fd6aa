//! Redis backend for resource-scoped distributed locks.
//!
//! Acquisition uses `SET NX PX`; release and extension run small Lua scripts
//! so the ownership check and the write happen in one atomic step.

pub mod provider;
pub mod store;

pub use provider::RedisLockStoreBuilder;
pub use store::RedisLockStore;
