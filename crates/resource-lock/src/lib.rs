//! Resource-scoped distributed locks for multi-instance services.
//!
//! A [`DistributedLock`] serializes work on one logical resource (a cart, a
//! product's inventory, an order, a payment) across every process that
//! shares the same lock store. [`LockManager`] wraps the
//! acquire / run / release cycle into a single call.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use resource_lock::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = RedisLockStore::new("redis://localhost:6379").await?;
//!     let manager = LockManager::new(DistributedLock::with_defaults(store));
//!
//!     let reserved = manager
//!         .execute_inventory_operation("sku-42", || async {
//!             // Only one instance reaches this point per product at a time.
//!             true
//!         })
//!         .await;
//!
//!     match reserved {
//!         Some(_) => println!("reserved"),
//!         None => println!("inventory busy, try again"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Failure policies
//!
//! - [`LockManager::execute_with_lock`]: `None` when the lock is unavailable
//! - [`LockManager::execute_with_lock_or_throw`]: [`LockError::AcquisitionFailed`]
//! - [`LockManager::execute_with_lock_or_fallback`]: runs a fallback closure
//!
//! # Crate Organization
//!
//! This crate re-exports types from:
//! - `resource-lock-core`: errors, keys, tokens, backoff and store traits
//! - `resource-lock-redis`: Redis store
//! - `resource-lock-memory`: in-process store
//!
//! [`LockCleanupService`] needs a [`LockStoreAdmin`] and is meant for
//! operational tooling only.

pub mod cleanup;
pub mod config;
pub mod lock;
pub mod manager;
pub mod metrics;

pub use cleanup::LockCleanupService;
pub use config::{LockConfig, LockConfigBuilder};
pub use lock::DistributedLock;
pub use manager::{LockManager, ResourceType};
pub use metrics::{LockMetrics, LockStatistics};

// Re-export core types and traits
pub use resource_lock_core::*;

// Re-export backends
pub use resource_lock_memory::InMemoryLockStore;
pub use resource_lock_redis::{RedisLockStore, RedisLockStoreBuilder};
