//! Element handles.
//!
//! An [`Element`] is a selector bound to a driver. It is what condition
//! checks and waits hand back, and what page objects act on.

use crate::driver::PageDriver;
use crate::result::AutomationResult;
use std::fmt;
use tracing::debug;

/// Selector bound to a driver
#[derive(Clone)]
pub struct Element<'d> {
    driver: &'d dyn PageDriver,
    selector: String,
}

impl fmt::Debug for Element<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Element<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.selector == other.selector
    }
}

impl<'d> Element<'d> {
    /// Bind a selector to a driver
    #[must_use]
    pub fn new(driver: &'d dyn PageDriver, selector: impl Into<String>) -> Self {
        Self {
            driver,
            selector: selector.into(),
        }
    }

    /// The selector this handle addresses
    #[must_use]
    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// The underlying driver
    #[must_use]
    pub fn driver(&self) -> &'d dyn PageDriver {
        self.driver
    }

    // --- actions ---

    /// Click
    ///
    /// # Errors
    ///
    /// Propagates driver errors (not found, not visible, not interactable).
    pub fn click(&self) -> AutomationResult<()> {
        debug!(selector = %self.selector, "click");
        self.driver.click(&self.selector)
    }

    /// Double click
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn double_click(&self) -> AutomationResult<()> {
        self.driver.double_click(&self.selector)
    }

    /// Hover
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn hover(&self) -> AutomationResult<()> {
        self.driver.hover(&self.selector)
    }

    /// Replace the value
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn fill(&self, value: &str) -> AutomationResult<()> {
        debug!(selector = %self.selector, "fill");
        self.driver.fill(&self.selector, value)
    }

    /// Clear the value
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn clear(&self) -> AutomationResult<()> {
        self.driver.clear(&self.selector)
    }

    /// Type text, optionally clearing first
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn type_text(&self, text: &str, clear_first: bool) -> AutomationResult<()> {
        if clear_first {
            self.clear()?;
        }
        self.driver.type_text(&self.selector, text)
    }

    /// Press a key
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn press(&self, key: &str) -> AutomationResult<()> {
        self.driver.press(&self.selector, key)
    }

    /// Check a checkbox or radio
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn check(&self) -> AutomationResult<()> {
        self.driver.check(&self.selector)
    }

    /// Uncheck a checkbox
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn uncheck(&self) -> AutomationResult<()> {
        self.driver.uncheck(&self.selector)
    }

    /// Select an option by value
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn select_option(&self, value: &str) -> AutomationResult<()> {
        self.driver.select_option(&self.selector, value)
    }

    /// Scroll into view
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn scroll_into_view(&self) -> AutomationResult<()> {
        self.driver.scroll_into_view(&self.selector)
    }

    // --- getters ---

    /// Rendered text
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn text(&self) -> AutomationResult<String> {
        self.driver.inner_text(&self.selector)
    }

    /// Raw text content
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn text_content(&self) -> AutomationResult<Option<String>> {
        self.driver.text_content(&self.selector)
    }

    /// Attribute value
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn attribute(&self, name: &str) -> AutomationResult<Option<String>> {
        self.driver.attribute(&self.selector, name)
    }

    /// Input value
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn value(&self) -> AutomationResult<String> {
        self.driver.input_value(&self.selector)
    }

    /// Visible
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn is_visible(&self) -> AutomationResult<bool> {
        self.driver.is_visible(&self.selector)
    }

    /// Enabled
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn is_enabled(&self) -> AutomationResult<bool> {
        self.driver.is_enabled(&self.selector)
    }

    /// Checked
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn is_checked(&self) -> AutomationResult<bool> {
        self.driver.is_checked(&self.selector)
    }

    /// PNG of just this element
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn screenshot(&self) -> AutomationResult<Vec<u8>> {
        self.driver.element_screenshot(&self.selector)
    }

    /// Whether the `class` attribute lists `class_name`
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn has_class(&self, class_name: &str) -> AutomationResult<bool> {
        Ok(self
            .attribute("class")?
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class_name)))
    }

    /// Whether at least one node matches
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn exists(&self) -> AutomationResult<bool> {
        Ok(self.driver.count(&self.selector)? > 0)
    }
}
