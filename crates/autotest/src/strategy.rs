//! Wait Strategy
//!
//! Binds a driver, a [`ConditionRegistry`] and a [`Poller`] into the calls
//! page objects use: wait for one element condition, wait for a custom
//! predicate, or wait for the first of several targets.

use crate::clock::{Clock, SystemClock};
use crate::condition::{ConditionArgs, ConditionHandler, ConditionRegistry, ElementCondition};
use crate::driver::PageDriver;
use crate::element::Element;
use crate::result::{AutomationError, AutomationResult};
use crate::wait::{AnyPredicate, BackoffPolicy, Poller};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Per-call overrides
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitOptions {
    /// Timeout for this call
    pub timeout: Option<Duration>,
    /// Initial poll interval for this call
    pub poll_interval: Option<Duration>,
    /// Message used when the wait times out
    pub message: Option<String>,
}

impl WaitOptions {
    /// No overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the timeout
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the poll interval
    #[must_use]
    pub const fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = Some(poll_interval);
        self
    }

    /// Override the timeout message
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// One alternative for [`WaitStrategy::wait_for_any`]
pub enum WaitTarget<'a> {
    /// An element condition
    Element {
        /// Condition to reach
        condition: ElementCondition,
        /// Its arguments
        args: ConditionArgs,
    },
    /// A custom predicate
    Custom(Box<dyn FnMut() -> AutomationResult<bool> + 'a>),
}

impl fmt::Debug for WaitTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Element { condition, args } => f
                .debug_struct("Element")
                .field("condition", condition)
                .field("args", args)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl<'a> WaitTarget<'a> {
    /// Element target
    #[must_use]
    pub const fn element(condition: ElementCondition, args: ConditionArgs) -> Self {
        Self::Element { condition, args }
    }

    /// Custom predicate target
    pub fn custom<F>(predicate: F) -> Self
    where
        F: FnMut() -> AutomationResult<bool> + 'a,
    {
        Self::Custom(Box::new(predicate))
    }
}

/// Winner of [`WaitStrategy::wait_for_any`]
#[derive(Debug, Clone, PartialEq)]
pub struct AnyMatch<'d> {
    /// Index of the target that succeeded
    pub index: usize,
    /// The element, for element targets
    pub element: Option<Element<'d>>,
}

/// Waits against a driver using the registered condition handlers
pub struct WaitStrategy<'d, C: Clock = SystemClock> {
    driver: &'d dyn PageDriver,
    registry: ConditionRegistry,
    poller: Poller<C>,
}

impl<C: Clock + fmt::Debug> fmt::Debug for WaitStrategy<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitStrategy")
            .field("registry", &self.registry)
            .field("poller", &self.poller)
            .finish_non_exhaustive()
    }
}

impl<'d> WaitStrategy<'d, SystemClock> {
    /// Strategy with default handlers and timings
    #[must_use]
    pub fn new(driver: &'d dyn PageDriver) -> Self {
        Self::with_clock(driver, BackoffPolicy::default(), SystemClock::new())
    }
}

impl<'d, C: Clock> WaitStrategy<'d, C> {
    /// Strategy on a custom clock
    #[must_use]
    pub fn with_clock(driver: &'d dyn PageDriver, policy: BackoffPolicy, clock: C) -> Self {
        Self {
            driver,
            registry: ConditionRegistry::with_defaults(),
            poller: Poller::with_clock(policy, clock),
        }
    }

    /// Replace the handler registry
    #[must_use]
    pub fn with_registry(mut self, registry: ConditionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// The driver
    #[must_use]
    pub fn driver(&self) -> &'d dyn PageDriver {
        self.driver
    }

    /// Handler registry
    #[must_use]
    pub const fn registry(&self) -> &ConditionRegistry {
        &self.registry
    }

    /// Mutable handler registry
    pub fn registry_mut(&mut self) -> &mut ConditionRegistry {
        &mut self.registry
    }

    /// Default timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.poller.policy().timeout()
    }

    /// Change the default timeout.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a zero timeout.
    pub fn set_timeout(&mut self, timeout: Duration) -> AutomationResult<()> {
        self.poller.policy_mut().set_timeout(timeout)
    }

    fn resolve(&self, condition: ElementCondition) -> AutomationResult<&dyn ConditionHandler> {
        self.registry.get_handler(condition).ok_or_else(|| {
            AutomationError::invalid_argument(format!(
                "no handler registered for condition '{condition}'"
            ))
        })
    }

    /// Wait until `condition` holds for the element in `args`.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument`: no selector, or no handler for the condition
    /// - `Timeout`: the deadline passed
    /// - `ConditionNotMet`: any other failure while waiting
    pub fn wait_for(
        &self,
        condition: ElementCondition,
        args: &ConditionArgs,
        options: &WaitOptions,
    ) -> AutomationResult<Element<'d>> {
        let selector = args.require_selector()?;
        let handler = self.resolve(condition)?;
        let policy = self
            .poller
            .policy()
            .with_overrides(options.timeout, options.poll_interval)?;
        let message = options.message.clone().unwrap_or_else(|| {
            format!(
                "waiting for '{condition}' timed out (timeout: {}s)",
                policy.timeout().as_secs_f64()
            )
        });

        debug!(%condition, selector, handler = handler.name(), "waiting for element");
        let driver = self.driver;
        let result = self.poller.poll_with(
            &policy,
            || handler.check(driver, condition, args),
            Some(&message),
        );
        settle(result.map(|outcome| outcome.value), &message)
    }

    /// Wait until a custom predicate yields a value.
    ///
    /// # Errors
    ///
    /// `Timeout` when the deadline passes, `ConditionNotMet` when the
    /// predicate fails.
    pub fn wait_until<T, F>(&self, predicate: F, options: &WaitOptions) -> AutomationResult<T>
    where
        F: FnMut() -> AutomationResult<Option<T>>,
    {
        let policy = self
            .poller
            .policy()
            .with_overrides(options.timeout, options.poll_interval)?;
        let message = options.message.clone().unwrap_or_else(|| {
            format!(
                "waiting for custom condition timed out (timeout: {}s)",
                policy.timeout().as_secs_f64()
            )
        });
        let result = self.poller.poll_with(&policy, predicate, Some(&message));
        settle(result.map(|outcome| outcome.value), &message)
    }

    /// Wait for the first of several targets.
    ///
    /// Targets are checked in order on every cycle; an error in one is
    /// logged and the others are still checked.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument`: empty list, a target without a selector, or a
    ///   condition without a handler
    /// - `Timeout`: nothing succeeded before the deadline
    pub fn wait_for_any(
        &self,
        targets: Vec<WaitTarget<'_>>,
        options: &WaitOptions,
    ) -> AutomationResult<AnyMatch<'d>> {
        if targets.is_empty() {
            return Err(AutomationError::invalid_argument(
                "at least one wait target is required",
            ));
        }

        let policy = self
            .poller
            .policy()
            .with_overrides(options.timeout, options.poll_interval)?;
        let message = options.message.clone().unwrap_or_else(|| {
            format!(
                "waiting for any of {} conditions timed out (timeout: {}s)",
                targets.len(),
                policy.timeout().as_secs_f64()
            )
        });

        let driver = self.driver;
        let mut predicates: Vec<AnyPredicate<'_, Option<Element<'d>>>> =
            Vec::with_capacity(targets.len());
        for target in targets {
            match target {
                WaitTarget::Element { condition, args } => {
                    let _ = args.require_selector()?;
                    let handler = self.resolve(condition)?;
                    predicates.push(Box::new(move || {
                        Ok(handler.check(driver, condition, &args)?.map(Some))
                    }));
                }
                WaitTarget::Custom(mut predicate) => {
                    predicates.push(Box::new(move || Ok(predicate()?.then_some(None))));
                }
            }
        }

        debug!(targets = predicates.len(), "waiting for any condition");
        let result = self
            .poller
            .poll_any(&policy, &mut predicates, Some(&message))
            .map(|outcome| {
                let (index, element) = outcome.value;
                AnyMatch { index, element }
            });
        settle(result, &message)
    }

    /// Pair each condition with its args and wait for the first to hold.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when the lists differ in length, otherwise as
    /// [`Self::wait_for_any`].
    pub fn wait_for_any_with_args(
        &self,
        conditions: &[ElementCondition],
        args: &[ConditionArgs],
        options: &WaitOptions,
    ) -> AutomationResult<AnyMatch<'d>> {
        if conditions.len() != args.len() {
            return Err(AutomationError::invalid_argument(format!(
                "{} conditions but {} argument sets",
                conditions.len(),
                args.len()
            )));
        }
        let targets = conditions
            .iter()
            .zip(args)
            .map(|(condition, args)| WaitTarget::element(*condition, args.clone()))
            .collect();
        self.wait_for_any(targets, options)
    }
}

/// Timeouts pass through; anything else becomes `ConditionNotMet`
fn settle<T>(result: AutomationResult<T>, message: &str) -> AutomationResult<T> {
    result.map_err(|e| {
        if e.is_timeout() {
            e
        } else {
            AutomationError::condition_not_met(format!("{message}: {e}"))
        }
    })
}
