//! Benchmarks for lock acquisition latency

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use resource_lock::{DistributedLock, InMemoryLockStore, LockConfig, LockManager, LockMetrics};

fn bench_memory_lock_acquisition(c: &mut Criterion) {
    let lock = Arc::new(DistributedLock::new(
        InMemoryLockStore::new(),
        LockConfig::default(),
        Arc::new(LockMetrics::new()),
    ));
    let manager = LockManager::from_shared(lock.clone());

    let mut group = c.benchmark_group("memory_lock");
    group.bench_function("acquire_release", |b| {
        b.to_async(tokio::runtime::Runtime::new().unwrap())
            .iter(|| async {
                if let Some(token) = lock.acquire_with("cart:bench", Duration::from_secs(5), 0).await {
                    black_box(lock.release("cart:bench", &token).await);
                }
            });
    });

    group.bench_function("execute_with_lock", |b| {
        b.to_async(tokio::runtime::Runtime::new().unwrap())
            .iter(|| async {
                black_box(
                    manager
                        .execute_cart_operation("bench", || async { 1 + 1 })
                        .await,
                );
            });
    });

    group.finish();
}

criterion_group!(benches, bench_memory_lock_acquisition);
criterion_main!(benches);
