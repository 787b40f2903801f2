//! # Fibonacci Backoff
//!
//! Progressive interval schedule used between state polls and between failed
//! reconcile passes. It grows more slowly than exponential backoff, so a
//! remote that needs a few extra polls is not left waiting long.
//!
//! The first two intervals equal the floor; each following interval is the sum
//! of the previous two, capped at the ceiling.
//! With a floor of 1s and a ceiling of 10s: 1s, 1s, 2s, 3s, 5s, 8s, 10s, 10s, ...
//! A zero floor grows from 1ms: 0, 1ms, 1ms, 2ms, 3ms, ...

use std::time::Duration;

/// Default ceiling for poll intervals.
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(10);

/// Smallest amount the sequence grows by, so a zero floor still backs off.
const MIN_STEP: Duration = Duration::from_millis(1);

/// Fibonacci backoff calculator
///
/// Never yields less than `min` nor more than `max`. If `max < min`, `min`
/// wins: the floor is a hard guarantee.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Floor (also the first two values)
    min: Duration,
    /// Previous interval
    prev: Duration,
    /// Interval returned by the next call
    current: Duration,
    /// Ceiling
    max: Duration,
}

impl FibonacciBackoff {
    /// Create a new backoff between `min` and `max`.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        let max = max.max(min);
        Self {
            min,
            prev: Duration::ZERO,
            current: min,
            max,
        }
    }

    /// Backoff that always returns `interval`.
    #[must_use]
    pub fn fixed(interval: Duration) -> Self {
        Self::new(interval, interval)
    }

    /// The floor of this schedule.
    pub fn min(&self) -> Duration {
        self.min
    }

    /// The ceiling of this schedule.
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Get the next interval and advance the sequence
    pub fn next_interval(&mut self) -> Duration {
        let result = self.current;

        let next = self.prev.saturating_add(self.current.max(MIN_STEP));
        self.prev = self.current;
        self.current = next.min(self.max).max(self.min);

        result
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.prev = Duration::ZERO;
        self.current = self.min;
    }

    /// Interval for a given 0-indexed attempt, without keeping state.
    ///
    /// Attempts 0 and 1 return `min`; later attempts follow the Fibonacci
    /// sequence capped at `max`.
    #[must_use]
    pub fn interval_for_attempt(attempt: u32, min: Duration, max: Duration) -> Duration {
        let mut backoff = Self::new(min, max);
        let mut interval = backoff.next_interval();
        for _ in 0..attempt {
            // Once at the ceiling the sequence stays there
            if interval >= backoff.max {
                break;
            }
            interval = backoff.next_interval();
        }
        interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_fibonacci_backoff_sequence() {
        let mut backoff = FibonacciBackoff::new(secs(1), secs(10));

        assert_eq!(backoff.next_interval(), secs(1));
        assert_eq!(backoff.next_interval(), secs(1));
        assert_eq!(backoff.next_interval(), secs(2));
        assert_eq!(backoff.next_interval(), secs(3));
        assert_eq!(backoff.next_interval(), secs(5));
        assert_eq!(backoff.next_interval(), secs(8));
        assert_eq!(backoff.next_interval(), secs(10));
        // 13s would exceed the ceiling
        assert_eq!(backoff.next_interval(), secs(10));
        assert_eq!(backoff.next_interval(), secs(10));
    }

    #[test]
    fn test_fibonacci_backoff_reset() {
        let mut backoff = FibonacciBackoff::new(secs(1), secs(10));

        backoff.next_interval();
        backoff.next_interval();
        backoff.next_interval();
        assert_eq!(backoff.next_interval(), secs(3));

        backoff.reset();

        assert_eq!(backoff.next_interval(), secs(1));
        assert_eq!(backoff.next_interval(), secs(1));
        assert_eq!(backoff.next_interval(), secs(2));
    }

    #[test]
    fn test_floor_wins_over_smaller_ceiling() {
        let mut backoff = FibonacciBackoff::new(secs(30), secs(10));
        assert_eq!(backoff.max(), secs(30));
        for _ in 0..5 {
            assert_eq!(backoff.next_interval(), secs(30));
        }
    }

    #[test]
    fn test_fixed_interval() {
        let mut backoff = FibonacciBackoff::fixed(Duration::from_millis(250));
        for _ in 0..5 {
            assert_eq!(backoff.next_interval(), Duration::from_millis(250));
        }
    }

    #[test]
    fn test_interval_for_attempt_matches_sequence() {
        let mut backoff = FibonacciBackoff::new(secs(1), secs(10));
        for attempt in 0..10 {
            assert_eq!(
                FibonacciBackoff::interval_for_attempt(attempt, secs(1), secs(10)),
                backoff.next_interval(),
                "attempt {}",
                attempt
            );
        }
    }

    #[test]
    fn test_zero_floor_still_grows() {
        let ms = Duration::from_millis;
        let mut backoff = FibonacciBackoff::new(Duration::ZERO, ms(10));

        let intervals: Vec<Duration> = (0..9).map(|_| backoff.next_interval()).collect();
        assert_eq!(
            intervals,
            vec![ms(0), ms(1), ms(1), ms(2), ms(3), ms(5), ms(8), ms(10), ms(10)]
        );
        assert_eq!(
            FibonacciBackoff::interval_for_attempt(5, Duration::ZERO, ms(10)),
            ms(5)
        );
    }
}
