//! Time sources for the wait engine.
//!
//! The poller never calls `Instant::now` or `thread::sleep` directly; it goes
//! through a [`Clock`]. Production code uses [`SystemClock`]. Tests use
//! [`FakeClock`], whose `sleep` advances virtual time instantly and records
//! every requested interval so backoff schedules can be asserted exactly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Monotonic time source with a sleep primitive
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin
    fn now(&self) -> Duration;

    /// Block for the given duration
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose origin is now
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Deterministic clock for tests
///
/// Cloning shares the underlying time, so a test can keep one handle while
/// the poller owns another.
#[derive(Debug, Clone, Default)]
pub struct FakeClock {
    current_us: Arc<AtomicU64>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl FakeClock {
    /// Create a fake clock at time zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward without recording a sleep
    pub fn advance(&self, duration: Duration) {
        self.current_us
            .fetch_add(duration.as_micros() as u64, Ordering::SeqCst);
    }

    /// Every duration passed to `sleep`, in call order
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Total virtual time slept
    #[must_use]
    pub fn total_slept(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.current_us.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
        self.advance(duration);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod fake_clock_tests {
        use super::*;

        #[test]
        fn test_starts_at_zero() {
            let clock = FakeClock::new();
            assert_eq!(clock.now(), Duration::ZERO);
            assert!(clock.sleeps().is_empty());
        }

        #[test]
        fn test_sleep_advances_and_records() {
            let clock = FakeClock::new();
            clock.sleep(Duration::from_millis(500));
            clock.sleep(Duration::from_millis(750));
            assert_eq!(clock.now(), Duration::from_millis(1_250));
            assert_eq!(
                clock.sleeps(),
                vec![Duration::from_millis(500), Duration::from_millis(750)]
            );
            assert_eq!(clock.total_slept(), Duration::from_millis(1_250));
        }

        #[test]
        fn test_advance_does_not_record() {
            let clock = FakeClock::new();
            clock.advance(Duration::from_secs(3));
            assert_eq!(clock.now(), Duration::from_secs(3));
            assert!(clock.sleeps().is_empty());
        }

        #[test]
        fn test_clones_share_time() {
            let clock = FakeClock::new();
            let other = clock.clone();
            other.sleep(Duration::from_millis(10));
            assert_eq!(clock.now(), Duration::from_millis(10));
        }
    }

    mod system_clock_tests {
        use super::*;

        #[test]
        fn test_system_clock_is_monotonic() {
            let clock = SystemClock::new();
            let a = clock.now();
            clock.sleep(Duration::from_millis(2));
            assert!(clock.now() > a);
        }
    }
}
