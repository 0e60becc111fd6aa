//! In-process lock statistics.
//!
//! A [`LockMetrics`] value is created by the application and handed to each
//! [`DistributedLock`](crate::DistributedLock) through an `Arc`, so separate
//! instances never share counters by accident.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;

#[derive(Debug, Default)]
struct Counters {
    acquisitions: u64,
    failures: u64,
    releases: u64,
    extensions: u64,
    errors: u64,
    acquisition_attempts: u64,
    acquisition_time_total: Duration,
    acquisition_time_max: Duration,
}

/// Snapshot of lock activity since creation or the last reset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LockStatistics {
    pub total_acquisitions: u64,
    pub total_failures: u64,
    pub total_releases: u64,
    pub total_extensions: u64,
    pub total_errors: u64,
    /// `acquisitions / (acquisitions + failures) * 100`, or 0 with no attempts.
    pub success_rate: f64,
    /// Mean time from first attempt to successful acquisition.
    pub average_acquisition_time_ms: f64,
    pub max_acquisition_time_ms: f64,
    /// Mean number of store attempts per successful acquisition.
    pub average_attempts: f64,
}

/// Counters for acquisitions, failures, releases, extensions and errors.
///
/// All updates go through one short critical section, so a snapshot or a
/// reset never observes a half-applied event.
#[derive(Debug, Default)]
pub struct LockMetrics {
    counters: Mutex<Counters>,
}

impl LockMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records a successful acquisition after `attempts` store calls.
    pub fn record_acquisition(&self, attempts: u32, elapsed: Duration) {
        {
            let mut counters = self.counters();
            counters.acquisitions += 1;
            counters.acquisition_attempts += u64::from(attempts);
            counters.acquisition_time_total += elapsed;
            counters.acquisition_time_max = counters.acquisition_time_max.max(elapsed);
        }
        debug!(attempts, elapsed_ms = elapsed.as_millis() as u64, "lock acquired");
    }

    /// Records an acquisition that gave up after `attempts` store calls.
    pub fn record_failure(&self, attempts: u32) {
        self.counters().failures += 1;
        debug!(attempts, "lock acquisition failed");
    }

    pub fn record_release(&self) {
        self.counters().releases += 1;
        debug!("lock released");
    }

    pub fn record_extension(&self) {
        self.counters().extensions += 1;
        debug!("lock extended");
    }

    /// Records a store communication error.
    pub fn record_error(&self) {
        self.counters().errors += 1;
        debug!("lock store error");
    }

    /// Returns the current statistics.
    pub fn statistics(&self) -> LockStatistics {
        let counters = self.counters();

        let attempted = counters.acquisitions + counters.failures;
        let success_rate = if attempted == 0 {
            0.0
        } else {
            counters.acquisitions as f64 / attempted as f64 * 100.0
        };
        let (average_acquisition_time_ms, average_attempts) = if counters.acquisitions == 0 {
            (0.0, 0.0)
        } else {
            let n = counters.acquisitions as f64;
            (
                millis(counters.acquisition_time_total) / n,
                counters.acquisition_attempts as f64 / n,
            )
        };

        LockStatistics {
            total_acquisitions: counters.acquisitions,
            total_failures: counters.failures,
            total_releases: counters.releases,
            total_extensions: counters.extensions,
            total_errors: counters.errors,
            success_rate,
            average_acquisition_time_ms,
            max_acquisition_time_ms: millis(counters.acquisition_time_max),
            average_attempts,
        }
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        *self.counters() = Counters::default();
        debug!("lock metrics reset");
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
