//! Element Conditions and Handler Registry
//!
//! Maps each [`ElementCondition`] to the [`ConditionHandler`] that knows how
//! to check it against a driver. The wait strategy looks handlers up here on
//! every poll.
//!
//! Handler contract:
//!
//! - `Ok(Some(element))`: condition met
//! - `Ok(None)`: not met yet; keep polling
//! - `Err(InvalidArgument)`: the call can never succeed; stop waiting
//!
//! Any other driver error during a check is treated as "not met", since the
//! page may simply be mid-render.

use crate::driver::PageDriver;
use crate::element::Element;
use crate::result::{AutomationError, AutomationResult};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

// =============================================================================
// CONDITIONS
// =============================================================================

/// State an element can be waited into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementCondition {
    /// At least one match in the DOM
    Present,
    /// Rendered and visible
    Visible,
    /// Visible and enabled
    Clickable,
    /// Hidden or absent
    Invisible,
    /// Disabled
    Disabled,
    /// Enabled
    Enabled,
    /// Checkbox / radio checked
    Selected,
    /// Text content contains a string
    TextContains,
    /// Text content equals a string
    TextEquals,
    /// Input value contains a string
    ValueContains,
    /// Input value equals a string
    ValueEquals,
    /// Attribute contains a string
    AttributeContains,
    /// Attribute equals a string
    AttributeEquals,
    /// Hidden or detached from the DOM
    Staleness,
}

impl ElementCondition {
    /// All conditions, in declaration order
    pub const ALL: [Self; 14] = [
        Self::Present,
        Self::Visible,
        Self::Clickable,
        Self::Invisible,
        Self::Disabled,
        Self::Enabled,
        Self::Selected,
        Self::TextContains,
        Self::TextEquals,
        Self::ValueContains,
        Self::ValueEquals,
        Self::AttributeContains,
        Self::AttributeEquals,
        Self::Staleness,
    ];

    /// snake_case name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Visible => "visible",
            Self::Clickable => "clickable",
            Self::Invisible => "invisible",
            Self::Disabled => "disabled",
            Self::Enabled => "enabled",
            Self::Selected => "selected",
            Self::TextContains => "text_contains",
            Self::TextEquals => "text_equals",
            Self::ValueContains => "value_contains",
            Self::ValueEquals => "value_equals",
            Self::AttributeContains => "attribute_contains",
            Self::AttributeEquals => "attribute_equals",
            Self::Staleness => "staleness",
        }
    }

    /// Whether an exact comparison is the default for this condition
    #[must_use]
    pub const fn is_exact_by_default(&self) -> bool {
        matches!(
            self,
            Self::TextEquals | Self::ValueEquals | Self::AttributeEquals
        )
    }
}

impl fmt::Display for ElementCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementCondition {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| {
                AutomationError::invalid_argument(format!("unknown element condition: {s}"))
            })
    }
}

// =============================================================================
// ARGUMENTS
// =============================================================================

/// Arguments for a condition check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionArgs {
    /// Target selector
    pub selector: Option<String>,
    /// Expected text (text conditions)
    pub text: Option<String>,
    /// Attribute name (attribute conditions)
    pub attribute: Option<String>,
    /// Expected value (value and attribute conditions)
    pub value: Option<String>,
    /// Force exact or substring matching
    pub exact: Option<bool>,
}

impl ConditionArgs {
    /// Args with just a selector
    #[must_use]
    pub fn selector(selector: impl Into<String>) -> Self {
        Self {
            selector: Some(selector.into()),
            ..Self::default()
        }
    }

    /// Set expected text
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Set attribute name
    #[must_use]
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Set expected value
    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Override exact matching
    #[must_use]
    pub const fn exact(mut self, exact: bool) -> Self {
        self.exact = Some(exact);
        self
    }

    /// The selector, or an invalid-argument error
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when no selector is set.
    pub fn require_selector(&self) -> AutomationResult<&str> {
        self.selector
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AutomationError::invalid_argument("selector is required"))
    }
}

// =============================================================================
// HANDLER TRAIT
// =============================================================================

/// Checks one or more conditions against a driver
pub trait ConditionHandler: Send + Sync {
    /// Handler name for logging
    fn name(&self) -> &'static str;

    /// Whether this handler serves `condition`
    fn matches(&self, condition: ElementCondition) -> bool;

    /// Check the condition once.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when required arguments are missing.
    fn check<'d>(
        &self,
        driver: &'d dyn PageDriver,
        condition: ElementCondition,
        args: &ConditionArgs,
    ) -> AutomationResult<Option<Element<'d>>>;
}

/// Turn a probe result into a handler result
fn settle<'d>(
    driver: &'d dyn PageDriver,
    selector: &str,
    handler: &'static str,
    probe: AutomationResult<bool>,
) -> AutomationResult<Option<Element<'d>>> {
    match probe {
        Ok(true) => Ok(Some(Element::new(driver, selector))),
        Ok(false) => Ok(None),
        Err(e) if e.is_invalid_argument() => Err(e),
        Err(e) => {
            debug!(handler, selector, error = %e, "check failed, treating as not met");
            Ok(None)
        }
    }
}

fn compare(actual: &str, expected: &str, exact: bool) -> bool {
    if exact {
        actual == expected
    } else {
        actual.contains(expected)
    }
}

// =============================================================================
// BUILT-IN HANDLERS
// =============================================================================

macro_rules! state_handler {
    ($(#[$meta:meta])* $name:ident, $label:literal, $condition:path, |$driver:ident, $selector:ident| $probe:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl ConditionHandler for $name {
            fn name(&self) -> &'static str {
                $label
            }

            fn matches(&self, condition: ElementCondition) -> bool {
                condition == $condition
            }

            fn check<'d>(
                &self,
                driver: &'d dyn PageDriver,
                _condition: ElementCondition,
                args: &ConditionArgs,
            ) -> AutomationResult<Option<Element<'d>>> {
                let selector = args.require_selector()?;
                let probe = |$driver: &dyn PageDriver, $selector: &str| -> AutomationResult<bool> {
                    $probe
                };
                settle(driver, selector, $label, probe(driver, selector))
            }
        }
    };
}

state_handler!(
    /// At least one match in the DOM
    PresentHandler, "present", ElementCondition::Present,
    |d, s| d.count(s).map(|n| n > 0)
);

state_handler!(
    /// Rendered and visible
    VisibleHandler, "visible", ElementCondition::Visible,
    |d, s| d.is_visible(s)
);

state_handler!(
    /// Hidden or absent
    InvisibleHandler, "invisible", ElementCondition::Invisible,
    |d, s| d.is_hidden(s)
);

state_handler!(
    /// Visible and enabled
    ClickableHandler, "clickable", ElementCondition::Clickable,
    |d, s| Ok(d.is_visible(s)? && d.is_enabled(s)?)
);

state_handler!(
    /// Enabled
    EnabledHandler, "enabled", ElementCondition::Enabled,
    |d, s| d.is_enabled(s)
);

state_handler!(
    /// Disabled
    DisabledHandler, "disabled", ElementCondition::Disabled,
    |d, s| d.is_enabled(s).map(|enabled| !enabled)
);

state_handler!(
    /// Checkbox / radio checked
    SelectedHandler, "selected", ElementCondition::Selected,
    |d, s| d.is_checked(s)
);

state_handler!(
    /// Hidden or detached
    StalenessHandler, "staleness", ElementCondition::Staleness,
    |d, s| Ok(d.count(s)? == 0 || d.is_hidden(s)?)
);

/// Text content contains / equals
#[derive(Debug, Clone, Copy, Default)]
pub struct TextHandler;

impl ConditionHandler for TextHandler {
    fn name(&self) -> &'static str {
        "text"
    }

    fn matches(&self, condition: ElementCondition) -> bool {
        matches!(
            condition,
            ElementCondition::TextContains | ElementCondition::TextEquals
        )
    }

    fn check<'d>(
        &self,
        driver: &'d dyn PageDriver,
        condition: ElementCondition,
        args: &ConditionArgs,
    ) -> AutomationResult<Option<Element<'d>>> {
        let selector = args.require_selector()?;
        let expected = args.text.as_deref().ok_or_else(|| {
            AutomationError::invalid_argument(format!("{condition} requires 'text'"))
        })?;
        let exact = args.exact.unwrap_or(condition.is_exact_by_default());
        let probe = driver
            .text_content(selector)
            .map(|text| compare(text.as_deref().unwrap_or_default(), expected, exact));
        settle(driver, selector, self.name(), probe)
    }
}

/// Input value contains / equals
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueHandler;

impl ConditionHandler for ValueHandler {
    fn name(&self) -> &'static str {
        "value"
    }

    fn matches(&self, condition: ElementCondition) -> bool {
        matches!(
            condition,
            ElementCondition::ValueContains | ElementCondition::ValueEquals
        )
    }

    fn check<'d>(
        &self,
        driver: &'d dyn PageDriver,
        condition: ElementCondition,
        args: &ConditionArgs,
    ) -> AutomationResult<Option<Element<'d>>> {
        let selector = args.require_selector()?;
        let expected = args
            .value
            .as_deref()
            .or(args.text.as_deref())
            .ok_or_else(|| {
                AutomationError::invalid_argument(format!("{condition} requires 'value'"))
            })?;
        let exact = args.exact.unwrap_or(condition.is_exact_by_default());
        let probe = driver
            .input_value(selector)
            .map(|value| compare(&value, expected, exact));
        settle(driver, selector, self.name(), probe)
    }
}

/// Attribute contains / equals
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeHandler;

impl ConditionHandler for AttributeHandler {
    fn name(&self) -> &'static str {
        "attribute"
    }

    fn matches(&self, condition: ElementCondition) -> bool {
        matches!(
            condition,
            ElementCondition::AttributeContains | ElementCondition::AttributeEquals
        )
    }

    fn check<'d>(
        &self,
        driver: &'d dyn PageDriver,
        condition: ElementCondition,
        args: &ConditionArgs,
    ) -> AutomationResult<Option<Element<'d>>> {
        let selector = args.require_selector()?;
        let (Some(attribute), Some(expected)) = (args.attribute.as_deref(), args.value.as_deref())
        else {
            return Err(AutomationError::invalid_argument(format!(
                "{condition} requires 'attribute' and 'value'"
            )));
        };
        let exact = args.exact.unwrap_or(condition.is_exact_by_default());
        let probe = driver
            .attribute(selector, attribute)
            .map(|actual| actual.is_some_and(|actual| compare(&actual, expected, exact)));
        settle(driver, selector, self.name(), probe)
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Condition → handler dispatch table
#[derive(Clone, Default)]
pub struct ConditionRegistry {
    handlers: HashMap<ElementCondition, Arc<dyn ConditionHandler>>,
    order: Vec<Arc<dyn ConditionHandler>>,
}

impl fmt::Debug for ConditionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.order.iter().map(|h| h.name()).collect();
        f.debug_struct("ConditionRegistry")
            .field("handlers", &names)
            .finish()
    }
}

impl ConditionRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in handler
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(PresentHandler);
        registry.register(VisibleHandler);
        registry.register(InvisibleHandler);
        registry.register(ClickableHandler);
        registry.register(EnabledHandler);
        registry.register(DisabledHandler);
        registry.register(SelectedHandler);
        registry.register(StalenessHandler);
        registry.register(TextHandler);
        registry.register(ValueHandler);
        registry.register(AttributeHandler);
        registry
    }

    /// Map every condition the handler matches to it; later registrations win
    pub fn register<H: ConditionHandler + 'static>(&mut self, handler: H) {
        let handler: Arc<dyn ConditionHandler> = Arc::new(handler);
        let mut claimed = 0;
        for condition in ElementCondition::ALL {
            if handler.matches(condition) {
                let _ = self.handlers.insert(condition, Arc::clone(&handler));
                claimed += 1;
            }
        }
        debug!(handler = handler.name(), conditions = claimed, "registered condition handler");
        self.order.push(handler);
        let handlers = &self.handlers;
        self.order
            .retain(|h| handlers.values().any(|mapped| Arc::ptr_eq(mapped, h)));
    }

    /// Handler for a condition
    #[must_use]
    pub fn get_handler(&self, condition: ElementCondition) -> Option<&dyn ConditionHandler> {
        self.handlers.get(&condition).map(AsRef::as_ref)
    }

    /// Every handler still mapped to at least one condition, in
    /// registration order
    #[must_use]
    pub fn get_all_handlers(&self) -> Vec<&dyn ConditionHandler> {
        self.order.iter().map(AsRef::as_ref).collect()
    }
}
