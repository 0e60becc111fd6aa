//! In-process lock store.
//!
//! Emulates the expiry and atomic compare semantics of a shared store inside
//! a single process. Useful for tests and single-node deployments; it does
//! not coordinate across processes.

pub mod store;

pub use store::InMemoryLockStore;
