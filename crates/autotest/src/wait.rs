//! Backoff Polling Engine
//!
//! Polls a predicate until it yields a value or a deadline passes. The sleep
//! between attempts starts at the initial poll interval and grows
//! geometrically by the backoff factor, capped at the max poll interval:
//!
//! ```text
//! attempt:   1     2       3        4   ...
//! sleep:     P     P·B     P·B²     ... ≤ M       (never past the deadline)
//! ```
//!
//! The effective cap `M` is `min(max_poll_interval, timeout / 2)` so a short
//! timeout still gets at least two checks.
//!
//! On timeout the error carries the elapsed time and the number of attempts.

use crate::clock::{Clock, SystemClock};
use crate::config::ConfigManager;
use crate::result::{AutomationError, AutomationResult};
use std::time::Duration;
use tracing::{debug, warn};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default overall timeout (10 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default initial poll interval (500ms)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default multiplier applied to the interval after each attempt
pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.5;

/// Default upper bound for a single sleep (5 seconds)
pub const DEFAULT_MAX_POLL_INTERVAL: Duration = Duration::from_secs(5);

// =============================================================================
// BACKOFF POLICY
// =============================================================================

/// Timing parameters for a poll loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    timeout: Duration,
    poll_interval: Duration,
    backoff_factor: f64,
    max_poll_interval: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_poll_interval: DEFAULT_MAX_POLL_INTERVAL.min(DEFAULT_TIMEOUT / 2),
        }
    }
}

impl BackoffPolicy {
    /// Create a policy with the default timings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a policy from explicit values.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the timeout or poll interval is zero, or
    /// the factor is below 1.
    pub fn try_new(
        timeout: Duration,
        poll_interval: Duration,
        backoff_factor: f64,
        max_poll_interval: Duration,
    ) -> AutomationResult<Self> {
        if timeout.is_zero() {
            return Err(AutomationError::invalid_argument(
                "timeout must be greater than 0",
            ));
        }
        check_poll_interval(poll_interval)?;
        if !backoff_factor.is_finite() || backoff_factor < 1.0 {
            return Err(AutomationError::invalid_argument(format!(
                "backoff factor must be >= 1.0, got {backoff_factor}"
            )));
        }
        Ok(Self {
            timeout,
            poll_interval,
            backoff_factor,
            max_poll_interval: max_poll_interval.min(timeout / 2),
        })
    }

    /// Build a policy from `wait.*` keys (seconds), falling back to defaults.
    ///
    /// Keys: `wait.timeout`, `wait.poll_interval`, `wait.backoff_factor`,
    /// `wait.max_poll_interval`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigValue` if a configured value is out of range.
    pub fn from_config(config: &ConfigManager) -> AutomationResult<Self> {
        let timeout = config.get_float("wait.timeout", DEFAULT_TIMEOUT.as_secs_f64());
        let poll = config.get_float("wait.poll_interval", DEFAULT_POLL_INTERVAL.as_secs_f64());
        let factor = config.get_float("wait.backoff_factor", DEFAULT_BACKOFF_FACTOR);
        let max = config.get_float(
            "wait.max_poll_interval",
            DEFAULT_MAX_POLL_INTERVAL.as_secs_f64(),
        );

        let to_duration = |key: &str, secs: f64| {
            Duration::try_from_secs_f64(secs).map_err(|e| AutomationError::ConfigValue {
                key: key.to_string(),
                message: e.to_string(),
            })
        };

        Self::try_new(
            to_duration("wait.timeout", timeout)?,
            to_duration("wait.poll_interval", poll)?,
            factor,
            to_duration("wait.max_poll_interval", max)?,
        )
        .map_err(|e| AutomationError::ConfigValue {
            key: "wait".to_string(),
            message: e.to_string(),
        })
    }

    /// Overall timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Initial poll interval
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Backoff multiplier
    #[must_use]
    pub const fn backoff_factor(&self) -> f64 {
        self.backoff_factor
    }

    /// Effective cap on a single sleep
    #[must_use]
    pub const fn max_poll_interval(&self) -> Duration {
        self.max_poll_interval
    }

    /// Change the timeout, re-capping the max interval to `timeout / 2`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a zero timeout.
    pub fn set_timeout(&mut self, timeout: Duration) -> AutomationResult<()> {
        if timeout.is_zero() {
            return Err(AutomationError::invalid_argument(
                "timeout must be greater than 0",
            ));
        }
        self.timeout = timeout;
        self.max_poll_interval = self.max_poll_interval.min(timeout / 2);
        debug!(timeout_s = timeout.as_secs_f64(), "default timeout updated");
        Ok(())
    }

    /// Change the timeout from a seconds value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for values `<= 0` or not finite.
    pub fn set_timeout_secs(&mut self, secs: f64) -> AutomationResult<()> {
        if !secs.is_finite() || secs <= 0.0 {
            return Err(AutomationError::invalid_argument(format!(
                "timeout must be greater than 0, got {secs}"
            )));
        }
        self.set_timeout(Duration::from_secs_f64(secs))
    }

    /// Copy of this policy with per-call overrides applied.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a zero timeout or poll interval override.
    pub fn with_overrides(
        &self,
        timeout: Option<Duration>,
        poll_interval: Option<Duration>,
    ) -> AutomationResult<Self> {
        let mut policy = *self;
        if let Some(timeout) = timeout {
            policy.set_timeout(timeout)?;
        }
        if let Some(poll) = poll_interval {
            check_poll_interval(poll)?;
            policy.poll_interval = poll;
        }
        Ok(policy)
    }

    /// Sleep interval after the given 1-based attempt: `min(P·B^(n-1), M)`
    #[must_use]
    pub fn interval_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.poll_interval.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = secs.min(self.max_poll_interval.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_poll_interval)
    }

    /// Sleeps a poll loop would perform if the predicate never succeeds and
    /// takes no time itself.
    #[must_use]
    pub fn schedule(&self) -> Vec<Duration> {
        let mut sleeps = Vec::new();
        let mut elapsed = Duration::ZERO;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if elapsed >= self.timeout {
                break;
            }
            let remaining = self.timeout - elapsed;
            let sleep = self.interval_for(attempt).min(remaining);
            if sleep.is_zero() {
                break;
            }
            sleeps.push(sleep);
            elapsed += sleep;
        }
        sleeps
    }
}

// =============================================================================
// WAIT OUTCOME
// =============================================================================

/// Successful result of a poll loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOutcome<T> {
    /// Value produced by the predicate
    pub value: T,
    /// Time spent waiting
    pub elapsed: Duration,
    /// Number of predicate evaluations
    pub attempts: u32,
}

impl<T> WaitOutcome<T> {
    /// Discard the timing information
    pub fn into_value(self) -> T {
        self.value
    }
}

/// A boxed predicate for [`Poller::poll_any`]
pub type AnyPredicate<'a, T> = Box<dyn FnMut() -> AutomationResult<Option<T>> + 'a>;

// =============================================================================
// POLLER
// =============================================================================

/// Runs predicates under a [`BackoffPolicy`]
#[derive(Debug, Clone)]
pub struct Poller<C: Clock = SystemClock> {
    policy: BackoffPolicy,
    clock: C,
}

impl Default for Poller<SystemClock> {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}

impl Poller<SystemClock> {
    /// Poller on the system clock
    #[must_use]
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            clock: SystemClock::new(),
        }
    }
}

impl<C: Clock> Poller<C> {
    /// Poller on a custom clock
    #[must_use]
    pub const fn with_clock(policy: BackoffPolicy, clock: C) -> Self {
        Self { policy, clock }
    }

    /// Default policy
    #[must_use]
    pub const fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Mutable default policy
    pub fn policy_mut(&mut self) -> &mut BackoffPolicy {
        &mut self.policy
    }

    /// Poll with the default policy.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` when the deadline passes, or the predicate's own error.
    pub fn poll<T, F>(&self, predicate: F, message: Option<&str>) -> AutomationResult<WaitOutcome<T>>
    where
        F: FnMut() -> AutomationResult<Option<T>>,
    {
        self.poll_with(&self.policy, predicate, message)
    }

    /// Poll under an explicit policy.
    ///
    /// The predicate runs at least once. A `Some` result ends the loop; an
    /// `Err` is returned immediately.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` when the deadline passes, or the predicate's own error.
    pub fn poll_with<T, F>(
        &self,
        policy: &BackoffPolicy,
        mut predicate: F,
        message: Option<&str>,
    ) -> AutomationResult<WaitOutcome<T>>
    where
        F: FnMut() -> AutomationResult<Option<T>>,
    {
        let start = self.clock.now();
        let deadline = start + policy.timeout;
        let mut attempts: u32 = 0;

        debug!(
            timeout_s = policy.timeout.as_secs_f64(),
            poll_s = policy.poll_interval.as_secs_f64(),
            "starting wait"
        );

        loop {
            attempts += 1;
            let result = predicate()?;
            let now = self.clock.now();
            let elapsed = now.saturating_sub(start);

            if let Some(value) = result {
                debug!(elapsed_s = elapsed.as_secs_f64(), attempts, "condition met");
                return Ok(WaitOutcome {
                    value,
                    elapsed,
                    attempts,
                });
            }

            if now >= deadline {
                let message = message.map_or_else(
                    || format!("wait timed out after {:.2}s", elapsed.as_secs_f64()),
                    str::to_string,
                );
                warn!(
                    elapsed_s = elapsed.as_secs_f64(),
                    attempts, "{message}"
                );
                return Err(AutomationError::Timeout {
                    message,
                    elapsed,
                    attempts,
                });
            }

            let remaining = deadline - now;
            let interval = policy.interval_for(attempts);
            let sleep = interval.min(remaining);
            debug!(
                attempt = attempts,
                interval_s = interval.as_secs_f64(),
                sleep_s = sleep.as_secs_f64(),
                remaining_s = remaining.as_secs_f64(),
                "condition not met, backing off"
            );
            self.clock.sleep(sleep);
        }
    }

    /// Poll until a boolean predicate returns true.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` when the deadline passes.
    pub fn poll_until<F>(&self, mut predicate: F, message: Option<&str>) -> AutomationResult<WaitOutcome<()>>
    where
        F: FnMut() -> bool,
    {
        self.poll(|| Ok(predicate().then_some(())), message)
    }

    /// Poll several predicates; the first to yield a value wins.
    ///
    /// Predicates are checked in order each cycle. An error from one
    /// predicate is logged and the rest are still checked; that cycle then
    /// counts as not met. The outcome carries the winning index.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty list, or `Timeout`.
    pub fn poll_any<T>(
        &self,
        policy: &BackoffPolicy,
        predicates: &mut [AnyPredicate<'_, T>],
        message: Option<&str>,
    ) -> AutomationResult<WaitOutcome<(usize, T)>> {
        if predicates.is_empty() {
            return Err(AutomationError::invalid_argument(
                "at least one condition is required",
            ));
        }
        self.poll_with(
            policy,
            || {
                for (index, predicate) in predicates.iter_mut().enumerate() {
                    match predicate() {
                        Ok(Some(value)) => {
                            debug!(index, "condition satisfied");
                            return Ok(Some((index, value)));
                        }
                        Ok(None) => {}
                        Err(e) => warn!(index, error = %e, "error while checking condition"),
                    }
                }
                Ok(None)
            },
            message,
        )
    }
}

// =============================================================================
// URL PATTERNS
// =============================================================================

/// Pattern for matching the current page URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlPattern {
    /// Exact URL match
    Exact(String),
    /// Prefix match
    Prefix(String),
    /// Contains substring
    Contains(String),
    /// Regex match
    Regex(String),
    /// Glob pattern (e.g., "**/workbench**")
    Glob(String),
    /// Match any URL
    Any,
}

impl UrlPattern {
    /// Check if a URL matches this pattern
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        match self {
            Self::Exact(pattern) => url == pattern,
            Self::Prefix(pattern) => url.starts_with(pattern.as_str()),
            Self::Contains(pattern) => url.contains(pattern.as_str()),
            Self::Regex(pattern) => regex::Regex::new(pattern)
                .map(|re| re.is_match(url))
                .unwrap_or(false),
            Self::Glob(pattern) => glob_matches(pattern, url),
            Self::Any => true,
        }
    }
}

impl std::fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact(p) => write!(f, "exact '{p}'"),
            Self::Prefix(p) => write!(f, "prefix '{p}'"),
            Self::Contains(p) => write!(f, "containing '{p}'"),
            Self::Regex(p) => write!(f, "regex '{p}'"),
            Self::Glob(p) => write!(f, "glob '{p}'"),
            Self::Any => write!(f, "any"),
        }
    }
}

fn check_poll_interval(poll_interval: Duration) -> AutomationResult<()> {
    if poll_interval.is_zero() {
        return Err(AutomationError::invalid_argument(
            "poll interval must be greater than 0",
        ));
    }
    Ok(())
}

/// `*` matches any run of characters; consecutive stars collapse.
/// Without a star the pattern must equal the url.
fn glob_matches(pattern: &str, url: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let (Some(first), Some(last)) = (parts.first(), parts.last()) else {
        return false;
    };
    if parts.len() == 1 {
        return pattern == url;
    }
    if url.len() < first.len() + last.len() || !url.starts_with(first) || !url.ends_with(last) {
        return false;
    }

    // Middle pieces must fit between the anchored head and tail.
    let middle = &url[first.len()..url.len() - last.len()];
    let mut pos = 0;
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match middle[pos..].find(part) {
            Some(found) => pos += found + part.len(),
            None => return false,
        }
    }
    true
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    // =========================================================================
    // BackoffPolicy Tests
    // =========================================================================

    mod policy_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let policy = BackoffPolicy::default();
            assert_eq!(policy.timeout(), Duration::from_secs(10));
            assert_eq!(policy.poll_interval(), ms(500));
            assert_eq!(policy.backoff_factor(), 1.5);
            assert_eq!(policy.max_poll_interval(), Duration::from_secs(5));
        }

        #[test]
        fn test_max_capped_to_half_timeout() {
            let policy =
                BackoffPolicy::try_new(Duration::from_secs(4), ms(500), 1.5, Duration::from_secs(5))
                    .unwrap();
            assert_eq!(policy.max_poll_interval(), Duration::from_secs(2));
        }

        #[test]
        fn test_rejects_zero_timeout() {
            let err = BackoffPolicy::try_new(Duration::ZERO, ms(500), 1.5, ms(5000)).unwrap_err();
            assert!(err.is_invalid_argument());
        }

        #[test]
        fn test_rejects_zero_poll_interval() {
            let err = BackoffPolicy::try_new(Duration::from_secs(1), Duration::ZERO, 1.5, ms(500))
                .unwrap_err();
            assert!(err.is_invalid_argument());

            let err = BackoffPolicy::default()
                .with_overrides(None, Some(Duration::ZERO))
                .unwrap_err();
            assert!(err.is_invalid_argument());
        }

        #[test]
        fn test_rejects_shrinking_factor() {
            let err =
                BackoffPolicy::try_new(Duration::from_secs(1), ms(100), 0.5, ms(500)).unwrap_err();
            assert!(err.is_invalid_argument());
        }

        #[test]
        fn test_set_timeout_recaps_max() {
            let mut policy = BackoffPolicy::default();
            policy.set_timeout(Duration::from_secs(3)).unwrap();
            assert_eq!(policy.timeout(), Duration::from_secs(3));
            assert_eq!(policy.max_poll_interval(), ms(1500));

            // Growing the timeout again never raises the cap
            policy.set_timeout(Duration::from_secs(60)).unwrap();
            assert_eq!(policy.max_poll_interval(), ms(1500));
        }

        #[test]
        fn test_set_timeout_secs_rejects_non_positive() {
            let mut policy = BackoffPolicy::default();
            assert!(policy.set_timeout_secs(0.0).unwrap_err().is_invalid_argument());
            assert!(policy.set_timeout_secs(-1.0).unwrap_err().is_invalid_argument());
            assert!(policy.set_timeout_secs(f64::NAN).is_err());
            assert_eq!(policy.timeout(), DEFAULT_TIMEOUT);
        }

        #[test]
        fn test_interval_grows_geometrically_then_caps() {
            let policy = BackoffPolicy::default();
            assert_eq!(policy.interval_for(1), ms(500));
            assert_eq!(policy.interval_for(2), ms(750));
            assert_eq!(policy.interval_for(3), ms(1125));
            assert_eq!(policy.interval_for(4), Duration::from_secs_f64(1.6875));
            assert_eq!(policy.interval_for(50), Duration::from_secs(5));
            assert_eq!(policy.interval_for(u32::MAX), Duration::from_secs(5));
        }

        #[test]
        fn test_factor_one_is_constant() {
            let policy =
                BackoffPolicy::try_new(Duration::from_secs(1), ms(100), 1.0, ms(500)).unwrap();
            assert_eq!(policy.interval_for(1), ms(100));
            assert_eq!(policy.interval_for(9), ms(100));
        }

        #[test]
        fn test_schedule_sums_to_timeout() {
            let policy = BackoffPolicy::default();
            let schedule = policy.schedule();
            let total: Duration = schedule.iter().sum();
            assert_eq!(total, policy.timeout());
            assert!(schedule.windows(2).all(|w| w[0] <= w[1] || w[1] < ms(500)));
            assert!(schedule.iter().all(|d| *d <= policy.max_poll_interval()));
        }

        #[test]
        fn test_overrides_do_not_touch_original() {
            let policy = BackoffPolicy::default();
            let custom = policy
                .with_overrides(Some(Duration::from_secs(2)), Some(ms(100)))
                .unwrap();
            assert_eq!(custom.timeout(), Duration::from_secs(2));
            assert_eq!(custom.poll_interval(), ms(100));
            assert_eq!(custom.max_poll_interval(), Duration::from_secs(1));
            assert_eq!(policy, BackoffPolicy::default());
        }
    }

    // =========================================================================
    // Poller Tests
    // =========================================================================

    mod poller_tests {
        use super::*;

        fn fake_poller(timeout_ms: u64) -> (Poller<FakeClock>, FakeClock) {
            let clock = FakeClock::new();
            let policy =
                BackoffPolicy::try_new(ms(timeout_ms), ms(500), 1.5, Duration::from_secs(5))
                    .unwrap();
            (Poller::with_clock(policy, clock.clone()), clock)
        }

        #[test]
        fn test_immediate_success_does_not_sleep() {
            let (poller, clock) = fake_poller(10_000);
            let outcome = poller.poll(|| Ok(Some(42)), None).unwrap();
            assert_eq!(outcome.value, 42);
            assert_eq!(outcome.attempts, 1);
            assert_eq!(outcome.elapsed, Duration::ZERO);
            assert!(clock.sleeps().is_empty());
        }

        #[test]
        fn test_success_after_backoff() {
            let (poller, clock) = fake_poller(10_000);
            let mut calls = 0;
            let outcome = poller
                .poll(
                    || {
                        calls += 1;
                        Ok((calls == 4).then_some("ready"))
                    },
                    None,
                )
                .unwrap();
            assert_eq!(outcome.value, "ready");
            assert_eq!(outcome.attempts, 4);
            assert_eq!(clock.sleeps(), vec![ms(500), ms(750), ms(1125)]);
            assert_eq!(outcome.elapsed, ms(2375));
        }

        #[test]
        fn test_timeout_reports_elapsed_and_attempts() {
            let (poller, clock) = fake_poller(3_000);
            let err = poller
                .poll::<(), _>(|| Ok(None), Some("login button never appeared"))
                .unwrap_err();
            match err {
                AutomationError::Timeout {
                    message,
                    elapsed,
                    attempts,
                } => {
                    assert_eq!(message, "login button never appeared");
                    assert_eq!(elapsed, Duration::from_secs(3));
                    // 500, 750, 1125, then the last 625ms of remaining time
                    assert_eq!(attempts, 5);
                }
                other => panic!("expected timeout, got {other:?}"),
            }
            assert_eq!(clock.sleeps(), vec![ms(500), ms(750), ms(1125), ms(625)]);
        }

        #[test]
        fn test_never_sleeps_past_deadline() {
            let (poller, clock) = fake_poller(600);
            let _ = poller.poll::<(), _>(|| Ok(None), None);
            assert_eq!(clock.total_slept(), ms(600));
            // Cap is timeout/2
            assert_eq!(clock.sleeps(), vec![ms(300), ms(300)]);
        }

        #[test]
        fn test_default_timeout_message() {
            let (poller, _) = fake_poller(100);
            let err = poller.poll::<(), _>(|| Ok(None), None).unwrap_err();
            assert!(err.to_string().starts_with("wait timed out"));
        }

        #[test]
        fn test_predicate_error_propagates_immediately() {
            let (poller, clock) = fake_poller(10_000);
            let err = poller
                .poll::<(), _>(|| Err(AutomationError::browser("page crashed")), None)
                .unwrap_err();
            assert!(matches!(err, AutomationError::Browser { .. }));
            assert!(clock.sleeps().is_empty());
        }

        #[test]
        fn test_poll_until_bool() {
            let (poller, _) = fake_poller(10_000);
            let mut n = 0;
            let outcome = poller
                .poll_until(
                    || {
                        n += 1;
                        n > 2
                    },
                    None,
                )
                .unwrap();
            assert_eq!(outcome.attempts, 3);
        }

        #[test]
        fn test_slow_predicate_counts_toward_deadline() {
            let clock = FakeClock::new();
            let policy =
                BackoffPolicy::try_new(Duration::from_secs(1), ms(100), 2.0, ms(500)).unwrap();
            let poller = Poller::with_clock(policy, clock.clone());
            let err = poller
                .poll::<(), _>(
                    || {
                        clock.advance(ms(400));
                        Ok(None)
                    },
                    None,
                )
                .unwrap_err();
            let AutomationError::Timeout { attempts, .. } = err else {
                panic!("expected timeout");
            };
            // 400 +100 sleep, 400 +100 sleep (clipped to the deadline), 400 -> 1400
            assert_eq!(attempts, 3);
        }
    }

    // =========================================================================
    // poll_any Tests
    // =========================================================================

    mod poll_any_tests {
        use super::*;

        #[test]
        fn test_first_success_wins_in_order() {
            let clock = FakeClock::new();
            let poller = Poller::with_clock(BackoffPolicy::default(), clock);
            let mut predicates: Vec<AnyPredicate<'_, &str>> = vec![
                Box::new(|| Ok(None)),
                Box::new(|| Ok(Some("second"))),
                Box::new(|| Ok(Some("third"))),
            ];
            let outcome = poller
                .poll_any(&BackoffPolicy::default(), &mut predicates, None)
                .unwrap();
            assert_eq!(outcome.value, (1, "second"));
            assert_eq!(outcome.attempts, 1);
        }

        #[test]
        fn test_errors_do_not_stop_other_predicates() {
            let clock = FakeClock::new();
            let poller = Poller::with_clock(BackoffPolicy::default(), clock);
            let mut cycles = 0;
            let mut predicates: Vec<AnyPredicate<'_, u8>> = vec![
                Box::new(|| Err(AutomationError::browser("detached"))),
                Box::new(|| {
                    cycles += 1;
                    Ok((cycles == 3).then_some(7))
                }),
            ];
            let outcome = poller
                .poll_any(&BackoffPolicy::default(), &mut predicates, None)
                .unwrap();
            assert_eq!(outcome.value, (1, 7));
            assert_eq!(outcome.attempts, 3);
        }

        #[test]
        fn test_all_failing_times_out() {
            let clock = FakeClock::new();
            let policy = BackoffPolicy::try_new(ms(1000), ms(200), 1.5, ms(500)).unwrap();
            let poller = Poller::with_clock(policy, clock);
            let mut predicates: Vec<AnyPredicate<'_, ()>> = vec![
                Box::new(|| Err(AutomationError::browser("boom"))),
                Box::new(|| Ok(None)),
            ];
            let err = poller
                .poll_any(&policy, &mut predicates, Some("nothing matched"))
                .unwrap_err();
            assert!(err.is_timeout());
            assert!(err.to_string().contains("nothing matched"));
        }

        #[test]
        fn test_empty_list_is_invalid() {
            let poller = Poller::with_clock(BackoffPolicy::default(), FakeClock::new());
            let mut predicates: Vec<AnyPredicate<'_, ()>> = Vec::new();
            let err = poller
                .poll_any(&BackoffPolicy::default(), &mut predicates, None)
                .unwrap_err();
            assert!(err.is_invalid_argument());
        }
    }

    // =========================================================================
    // UrlPattern Tests
    // =========================================================================

    mod url_pattern_tests {
        use super::*;

        #[test]
        fn test_url_pattern_types() {
            let url = "https://omp.example.com/workbench/home";
            assert!(UrlPattern::Exact(url.into()).matches(url));
            assert!(UrlPattern::Prefix("https://omp".into()).matches(url));
            assert!(UrlPattern::Contains("/workbench".into()).matches(url));
            assert!(UrlPattern::Regex(r"/workbench/\w+$".into()).matches(url));
            assert!(UrlPattern::Any.matches(url));
            assert!(!UrlPattern::Contains("/login".into()).matches(url));
        }

        #[test]
        fn test_glob() {
            let url = "https://omp.example.com/workbench/home";
            assert!(UrlPattern::Glob("**/workbench**".into()).matches(url));
            assert!(UrlPattern::Glob("https://*/home".into()).matches(url));
            assert!(!UrlPattern::Glob("http://*".into()).matches(url));
            assert!(!UrlPattern::Glob("*/login*".into()).matches(url));
        }

        #[test]
        fn test_glob_without_star_is_exact() {
            assert!(UrlPattern::Glob("abc".into()).matches("abc"));
            assert!(!UrlPattern::Glob("abc".into()).matches("abcabc"));
            assert!(!UrlPattern::Glob("abc".into()).matches("xabc"));
        }

        #[test]
        fn test_glob_pieces_do_not_overlap() {
            assert!(!UrlPattern::Glob("a*ab".into()).matches("ab"));
            assert!(UrlPattern::Glob("a*ab".into()).matches("aab"));
            assert!(!UrlPattern::Glob("ab*b*ba".into()).matches("abba"));
            assert!(UrlPattern::Glob("ab*b*ba".into()).matches("abbba"));
        }

        #[test]
        fn test_invalid_regex_never_matches() {
            assert!(!UrlPattern::Regex("([".into()).matches("anything"));
        }

        #[test]
        fn test_display() {
            assert_eq!(
                UrlPattern::Contains("/workbench".into()).to_string(),
                "containing '/workbench'"
            );
        }
    }

    // =========================================================================
    // Integration Tests
    // =========================================================================

    mod integration_tests {
        use super::*;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        #[test]
        fn test_real_clock_condition_becomes_true() {
            let flag = Arc::new(AtomicBool::new(false));
            let flag_clone = flag.clone();

            std::thread::spawn(move || {
                std::thread::sleep(ms(30));
                flag_clone.store(true, Ordering::SeqCst);
            });

            let policy = BackoffPolicy::try_new(Duration::from_secs(2), ms(5), 1.5, ms(50)).unwrap();
            let poller = Poller::new(policy);
            let outcome = poller.poll_until(|| flag.load(Ordering::SeqCst), None).unwrap();
            assert!(outcome.attempts >= 2);
            assert!(outcome.elapsed >= ms(30));
        }
    }
}
