//! Serializes concurrent checkouts for the same cart through Redis.
//!
//! ```text
//! REDIS_URL=redis://localhost:6379 cargo run --example checkout
//! ```

use std::sync::Arc;
use std::time::Duration;

use resource_lock::{
    DistributedLock, LockCleanupService, LockConfig, LockManager, LockMetrics, RedisLockStore,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let store = RedisLockStore::new(url).await?;
    let config = LockConfig::from_env()?;
    let metrics = Arc::new(LockMetrics::new());
    let manager = LockManager::new(DistributedLock::new(
        store.clone(),
        config.clone(),
        metrics.clone(),
    ));

    let checkouts: Vec<_> = (0..5)
        .map(|attempt| {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .execute_cart_operation("user-17", || async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        attempt
                    })
                    .await
            })
        })
        .collect();

    for checkout in checkouts {
        match checkout.await? {
            Some(attempt) => println!("checkout {attempt} completed"),
            None => println!("checkout gave up: cart busy"),
        }
    }

    let stats = metrics.statistics();
    println!(
        "acquired={} failed={} success_rate={:.1}% avg_wait={:.1}ms",
        stats.total_acquisitions,
        stats.total_failures,
        stats.success_rate,
        stats.average_acquisition_time_ms
    );

    let removed = LockCleanupService::new(store, &config)
        .force_cleanup_all_locks()
        .await?;
    println!("cleanup removed {removed} leftover locks");
    Ok(())
}
