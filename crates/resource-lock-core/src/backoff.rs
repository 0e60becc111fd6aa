//! Retry delay calculation.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with up to 25% random jitter.
///
/// The delay before retry `attempt` (zero-based) is
/// `min(base * 2^attempt, max)` plus a random extra of at most a quarter of
/// that value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    /// Jitter as a fraction of the computed delay.
    const JITTER_DIVISOR: u32 = 4;

    /// Creates a backoff policy. `max` is raised to `base` if smaller.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay before jitter for the given attempt.
    pub fn capped_delay(&self, attempt: u32) -> Duration {
        // 2^31 already overflows any practical base, so clamp the shift.
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Delay with jitter for the given attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = self.capped_delay(attempt);
        let jitter_ceiling =
            u64::try_from((delay / Self::JITTER_DIVISOR).as_nanos()).unwrap_or(u64::MAX);
        if jitter_ceiling == 0 {
            return delay;
        }
        let jitter = rand::thread_rng().gen_range(0..=jitter_ceiling);
        delay + Duration::from_nanos(jitter)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_millis(2000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_until_capped() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(1000));
        assert_eq!(backoff.capped_delay(0), Duration::from_millis(100));
        assert_eq!(backoff.capped_delay(1), Duration::from_millis(200));
        assert_eq!(backoff.capped_delay(2), Duration::from_millis(400));
        assert_eq!(backoff.capped_delay(3), Duration::from_millis(800));
        assert_eq!(backoff.capped_delay(4), Duration::from_millis(1000));
        assert_eq!(backoff.capped_delay(200), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_stays_within_quarter() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(2000));
        for attempt in 0..8 {
            let floor = backoff.capped_delay(attempt);
            let ceiling = floor + floor / 4;
            for _ in 0..50 {
                let delay = backoff.delay(attempt);
                assert!(delay >= floor, "{delay:?} < {floor:?}");
                assert!(delay <= ceiling, "{delay:?} > {ceiling:?}");
            }
        }
    }

    #[test]
    fn test_sub_millisecond_jitter() {
        let backoff = Backoff::new(Duration::from_millis(2), Duration::from_millis(2));
        let floor = Duration::from_millis(2);
        let ceiling = floor + Duration::from_micros(500);
        let delays: Vec<Duration> = (0..200).map(|_| backoff.delay(0)).collect();

        assert!(delays.iter().all(|d| *d >= floor && *d <= ceiling));
        assert!(delays.iter().any(|d| *d > floor), "no jitter applied to a 2ms delay");
    }

    #[test]
    fn test_max_below_base_is_raised() {
        let backoff = Backoff::new(Duration::from_millis(500), Duration::from_millis(100));
        assert_eq!(backoff.max(), Duration::from_millis(500));
        assert_eq!(backoff.capped_delay(3), Duration::from_millis(500));
    }

    #[test]
    fn test_zero_base() {
        let backoff = Backoff::new(Duration::ZERO, Duration::ZERO);
        assert_eq!(backoff.delay(5), Duration::ZERO);
    }
}
