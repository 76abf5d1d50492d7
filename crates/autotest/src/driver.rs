//! Page Driver Abstraction
//!
//! Everything above this module (conditions, wait strategy, page objects)
//! talks to a browser through [`PageDriver`]. Two implementations ship:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  PageDriver (trait, sync, selector-addressed)                │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────────────────┐   ┌───────────────────────────┐  │
//! │  │  ChromiumDriver        │   │  MockDriver               │  │
//! │  │  (feature "browser")   │   │  (in-memory DOM)          │  │
//! │  │  CDP via chromiumoxide │   │  call history, failures   │  │
//! │  └────────────────────────┘   └───────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Methods take `&self`; drivers keep their mutable state behind interior
//! mutability so element handles can borrow the driver while acting on it.

use crate::config::ConfigManager;
use crate::result::{AutomationError, AutomationResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

// =============================================================================
// BROWSER KIND
// =============================================================================

/// Browser engine to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    /// Chromium / Chrome
    #[default]
    Chromium,
    /// Firefox
    Firefox,
    /// WebKit / Safari
    Webkit,
}

impl BrowserKind {
    /// Lowercase engine name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Chromium => "chromium",
            Self::Firefox => "firefox",
            Self::Webkit => "webkit",
        }
    }
}

impl fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrowserKind {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Self::Chromium),
            "firefox" => Ok(Self::Firefox),
            "webkit" => Ok(Self::Webkit),
            other => Err(AutomationError::invalid_argument(format!(
                "unsupported browser type: {other} (supported: chromium, firefox, webkit)"
            ))),
        }
    }
}

// =============================================================================
// DRIVER CONFIG
// =============================================================================

/// Browser configuration for a driver
#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    /// Browser engine
    pub browser: BrowserKind,
    /// Run in headless mode
    pub headless: bool,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Base URL that page paths are joined onto
    pub base_url: Option<String>,
    /// Default timeout for waits and navigation
    pub timeout: Duration,
    /// Delay inserted after each action
    pub slow_mo: Duration,
    /// Executable path override
    pub executable_path: Option<String>,
    /// Run with the Chromium sandbox
    pub sandbox: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            browser: BrowserKind::Chromium,
            headless: true,
            viewport_width: 1920,
            viewport_height: 1080,
            base_url: None,
            timeout: Duration::from_secs(10),
            slow_mo: Duration::ZERO,
            executable_path: None,
            sandbox: true,
        }
    }
}

impl DriverConfig {
    /// Create new config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `web.browser.*` and `web.base_url`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigValue` for an unknown browser name or a negative timing.
    pub fn from_config(config: &ConfigManager) -> AutomationResult<Self> {
        let defaults = Self::default();

        let browser_name = config.get_str("web.browser.type", defaults.browser.as_str());
        let browser = browser_name
            .parse::<BrowserKind>()
            .map_err(|e| AutomationError::ConfigValue {
                key: "web.browser.type".to_string(),
                message: e.to_string(),
            })?;

        let secs = |key: &str, default: Duration| -> AutomationResult<Duration> {
            let value = config.get_float(key, default.as_secs_f64());
            Duration::try_from_secs_f64(value).map_err(|e| AutomationError::ConfigValue {
                key: key.to_string(),
                message: e.to_string(),
            })
        };

        let dimension = |key: &str, default: u32| -> AutomationResult<u32> {
            let value = config.get_int(key, i64::from(default));
            u32::try_from(value).map_err(|_| AutomationError::ConfigValue {
                key: key.to_string(),
                message: format!("{value} is not a valid pixel size"),
            })
        };

        let base_url = config
            .get("web.base_url")
            .and_then(serde_json::Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let executable_path = config
            .get("web.browser.executable_path")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);

        Ok(Self {
            browser,
            headless: config.get_bool("web.browser.headless", defaults.headless),
            viewport_width: dimension("web.browser.viewport.width", defaults.viewport_width)?,
            viewport_height: dimension("web.browser.viewport.height", defaults.viewport_height)?,
            base_url,
            timeout: secs("web.browser.timeout", defaults.timeout)?,
            slow_mo: secs("web.browser.slow_mo", defaults.slow_mo)?,
            executable_path,
            sandbox: config.get_bool("web.browser.sandbox", defaults.sandbox),
        })
    }

    /// Set the browser engine
    #[must_use]
    pub const fn browser(mut self, browser: BrowserKind) -> Self {
        self.browser = browser;
        self
    }

    /// Set headless mode
    #[must_use]
    pub const fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set viewport dimensions
    #[must_use]
    pub const fn viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Set base URL
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set default timeout
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Disable the Chromium sandbox
    #[must_use]
    pub const fn no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }
}

// =============================================================================
// COOKIE
// =============================================================================

/// Browser cookie
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Expiry as seconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    /// HTTPS only
    #[serde(default)]
    pub secure: bool,
    /// Hidden from scripts
    #[serde(default)]
    pub http_only: bool,
}

impl Cookie {
    /// Create a cookie with a name and value
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    /// Set the domain
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }
}

// =============================================================================
// PAGE DRIVER TRAIT
// =============================================================================

/// Synchronous, selector-addressed browser driver.
///
/// Queries on a selector that matches nothing return `ElementNotFound`,
/// except `count`, `is_visible` and `is_hidden`, which report absence.
pub trait PageDriver: Send {
    // --- navigation / page ---

    /// Navigate to a URL
    fn navigate(&self, url: &str) -> AutomationResult<()>;
    /// Reload the current page
    fn refresh(&self) -> AutomationResult<()>;
    /// History back
    fn go_back(&self) -> AutomationResult<()>;
    /// History forward
    fn go_forward(&self) -> AutomationResult<()>;
    /// Current URL
    fn current_url(&self) -> AutomationResult<String>;
    /// Document title
    fn title(&self) -> AutomationResult<String>;
    /// Serialized DOM
    fn page_source(&self) -> AutomationResult<String>;
    /// Evaluate a script and return its JSON value
    fn execute_script(&self, script: &str) -> AutomationResult<serde_json::Value>;
    /// PNG screenshot of the viewport
    fn screenshot(&self) -> AutomationResult<Vec<u8>>;

    // --- element queries ---

    /// Number of elements matching the selector
    fn count(&self, selector: &str) -> AutomationResult<usize>;
    /// Whether the first match is rendered and visible
    fn is_visible(&self, selector: &str) -> AutomationResult<bool>;
    /// Whether the first match is hidden or absent
    fn is_hidden(&self, selector: &str) -> AutomationResult<bool> {
        self.is_visible(selector).map(|visible| !visible)
    }
    /// Whether the first match is enabled
    fn is_enabled(&self, selector: &str) -> AutomationResult<bool>;
    /// Whether the first match is a checked checkbox or radio
    fn is_checked(&self, selector: &str) -> AutomationResult<bool>;
    /// Raw text content, `None` when the node has none
    fn text_content(&self, selector: &str) -> AutomationResult<Option<String>>;
    /// Rendered text
    fn inner_text(&self, selector: &str) -> AutomationResult<String>;
    /// Attribute value, `None` when not set
    fn attribute(&self, selector: &str, name: &str) -> AutomationResult<Option<String>>;
    /// Value of an input, textarea or select
    fn input_value(&self, selector: &str) -> AutomationResult<String>;
    /// PNG screenshot of a single element
    fn element_screenshot(&self, selector: &str) -> AutomationResult<Vec<u8>>;

    // --- element actions ---

    /// Click
    fn click(&self, selector: &str) -> AutomationResult<()>;
    /// Double click
    fn double_click(&self, selector: &str) -> AutomationResult<()>;
    /// Move the pointer over the element
    fn hover(&self, selector: &str) -> AutomationResult<()>;
    /// Replace the element's value
    fn fill(&self, selector: &str, value: &str) -> AutomationResult<()>;
    /// Clear the element's value
    fn clear(&self, selector: &str) -> AutomationResult<()>;
    /// Type text key by key, appending to the current value
    fn type_text(&self, selector: &str, text: &str) -> AutomationResult<()>;
    /// Press a named key (e.g. "Enter")
    fn press(&self, selector: &str, key: &str) -> AutomationResult<()>;
    /// Check a checkbox or radio
    fn check(&self, selector: &str) -> AutomationResult<()>;
    /// Uncheck a checkbox
    fn uncheck(&self, selector: &str) -> AutomationResult<()>;
    /// Select an option of a `<select>` by value
    fn select_option(&self, selector: &str, value: &str) -> AutomationResult<()>;
    /// Scroll the element into view
    fn scroll_into_view(&self, selector: &str) -> AutomationResult<()>;

    // --- cookies ---

    /// All cookies for the current page
    fn cookies(&self) -> AutomationResult<Vec<Cookie>>;
    /// Add a cookie
    fn add_cookie(&self, cookie: Cookie) -> AutomationResult<()>;
    /// Delete a cookie by name
    fn delete_cookie(&self, name: &str) -> AutomationResult<()>;
    /// Delete all cookies
    fn clear_cookies(&self) -> AutomationResult<()>;

    /// Look up a single cookie by name
    fn cookie(&self, name: &str) -> AutomationResult<Option<Cookie>> {
        Ok(self.cookies()?.into_iter().find(|c| c.name == name))
    }

    // --- lifecycle ---

    /// Shut the browser down; later calls fail with `DriverNotStarted`
    fn close(&self) -> AutomationResult<()>;
}

// =============================================================================
// MOCK DRIVER
// =============================================================================

/// State of one element in a [`MockDriver`] DOM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockElement {
    /// Tag name
    pub tag: String,
    /// Text content
    pub text: String,
    /// Input value
    pub value: String,
    /// Attributes
    pub attributes: BTreeMap<String, String>,
    /// Rendered and visible
    pub visible: bool,
    /// Accepts interaction
    pub enabled: bool,
    /// Checkbox / radio state
    pub checked: bool,
    /// Options of a `<select>`
    pub options: Vec<String>,
    /// Number of nodes matching the selector
    pub matches: usize,
    /// Screenshot bytes returned for this element
    pub screenshot: Vec<u8>,
    /// Lookups that still report the element as absent
    pub hidden_lookups: u32,
}

impl MockElement {
    /// Visible, enabled element with the given tag
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            text: String::new(),
            value: String::new(),
            attributes: BTreeMap::new(),
            visible: true,
            enabled: true,
            checked: false,
            options: Vec::new(),
            matches: 1,
            screenshot: Vec::new(),
            hidden_lookups: 0,
        }
    }

    /// `<input type="checkbox">`
    #[must_use]
    pub fn checkbox() -> Self {
        Self::new("input").with_attribute("type", "checkbox")
    }

    /// Set text content
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Set input value
    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    /// Set an attribute
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set visibility
    #[must_use]
    pub const fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Set enabled state
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set checked state
    #[must_use]
    pub const fn checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }

    /// Set `<select>` options
    #[must_use]
    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    /// Set the number of matching nodes
    #[must_use]
    pub const fn with_matches(mut self, matches: usize) -> Self {
        self.matches = matches;
        self
    }

    /// Set element screenshot bytes
    #[must_use]
    pub fn with_screenshot(mut self, bytes: Vec<u8>) -> Self {
        self.screenshot = bytes;
        self
    }

    /// Report the element as absent for the first `lookups` driver calls
    /// that address it
    #[must_use]
    pub const fn appearing_after(mut self, lookups: u32) -> Self {
        self.hidden_lookups = lookups;
        self
    }

    fn is_checkable(&self) -> bool {
        self.tag.eq_ignore_ascii_case("input")
            && self
                .attributes
                .get("type")
                .is_some_and(|t| t == "checkbox" || t == "radio")
    }
}

#[derive(Debug, Default)]
struct MockState {
    url: String,
    title: String,
    page_source: String,
    back: Vec<String>,
    forward: Vec<String>,
    titles: BTreeMap<String, String>,
    elements: BTreeMap<String, MockElement>,
    click_navigations: BTreeMap<String, String>,
    cookies: Vec<Cookie>,
    script_results: VecDeque<serde_json::Value>,
    failures: BTreeMap<String, String>,
    call_history: Vec<String>,
    closed: bool,
}

/// Mock driver for unit testing
///
/// Holds an in-memory DOM keyed by selector, records every call, and can be
/// told to fail specific methods.
#[derive(Debug)]
pub struct MockDriver {
    state: Mutex<MockState>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// PNG signature, enough for callers that only check the header
const MOCK_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

impl MockDriver {
    /// Create an empty mock driver at `about:blank`
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                url: "about:blank".to_string(),
                ..MockState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Add or replace an element
    pub fn add_element(&self, selector: impl Into<String>, element: MockElement) {
        let _ = self.lock().elements.insert(selector.into(), element);
    }

    /// Remove an element from the DOM
    pub fn remove_element(&self, selector: &str) {
        let _ = self.lock().elements.remove(selector);
    }

    /// Mutate an existing element in place
    pub fn update_element(&self, selector: &str, f: impl FnOnce(&mut MockElement)) {
        if let Some(element) = self.lock().elements.get_mut(selector) {
            f(element);
        }
    }

    /// Snapshot of an element's state
    #[must_use]
    pub fn element(&self, selector: &str) -> Option<MockElement> {
        self.lock().elements.get(selector).cloned()
    }

    /// Title to report after navigating to `url`
    pub fn set_title_for(&self, url: impl Into<String>, title: impl Into<String>) {
        let _ = self.lock().titles.insert(url.into(), title.into());
    }

    /// Set the serialized DOM
    pub fn set_page_source(&self, html: impl Into<String>) {
        self.lock().page_source = html.into();
    }

    /// Clicking `selector` navigates to `url`
    pub fn navigate_on_click(&self, selector: impl Into<String>, url: impl Into<String>) {
        let _ = self
            .lock()
            .click_navigations
            .insert(selector.into(), url.into());
    }

    /// Queue a result for the next `execute_script`
    pub fn push_script_result(&self, result: serde_json::Value) {
        self.lock().script_results.push_back(result);
    }

    /// Make every call to `method` fail with a browser error
    pub fn fail_on(&self, method: impl Into<String>, message: impl Into<String>) {
        let _ = self.lock().failures.insert(method.into(), message.into());
    }

    /// Stop failing `method`
    pub fn clear_failure(&self, method: &str) {
        let _ = self.lock().failures.remove(method);
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.lock().call_history.clone()
    }

    /// Check if method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.lock()
            .call_history
            .iter()
            .any(|c| c == method || c.starts_with(&format!("{method}:")))
    }

    /// Number of calls to a method
    #[must_use]
    pub fn call_count(&self, method: &str) -> usize {
        let prefix = format!("{method}:");
        self.lock()
            .call_history
            .iter()
            .filter(|c| *c == method || c.starts_with(&prefix))
            .count()
    }

    /// Record a call and apply closed / failure checks
    fn begin(&self, method: &str, detail: &str) -> AutomationResult<MutexGuard<'_, MockState>> {
        let mut state = self.lock();
        let entry = if detail.is_empty() {
            method.to_string()
        } else {
            format!("{method}:{detail}")
        };
        state.call_history.push(entry);
        if state.closed {
            return Err(AutomationError::DriverNotStarted);
        }
        if let Some(message) = state.failures.get(method) {
            return Err(AutomationError::browser(message.clone()));
        }
        Ok(state)
    }
}

/// Find an element, honouring `hidden_lookups`
fn lookup<'s>(state: &'s mut MockState, selector: &str) -> Option<&'s mut MockElement> {
    let element = state.elements.get_mut(selector)?;
    if element.hidden_lookups > 0 {
        element.hidden_lookups -= 1;
        return None;
    }
    Some(element)
}

fn require<'s>(state: &'s mut MockState, selector: &str) -> AutomationResult<&'s mut MockElement> {
    lookup(state, selector).ok_or_else(|| AutomationError::element_not_found(selector))
}

fn require_interactable<'s>(
    state: &'s mut MockState,
    selector: &str,
) -> AutomationResult<&'s mut MockElement> {
    let element = require(state, selector)?;
    if !element.visible {
        return Err(AutomationError::ElementNotVisible {
            selector: selector.to_string(),
        });
    }
    if !element.enabled {
        return Err(AutomationError::ElementNotInteractable {
            selector: selector.to_string(),
            message: "element is disabled".to_string(),
        });
    }
    Ok(element)
}

fn go_to(state: &mut MockState, url: &str) {
    let previous = std::mem::replace(&mut state.url, url.to_string());
    state.back.push(previous);
    state.forward.clear();
    restore_title(state);
}

fn restore_title(state: &mut MockState) {
    state.title = state.titles.get(&state.url).cloned().unwrap_or_default();
}

impl PageDriver for MockDriver {
    fn navigate(&self, url: &str) -> AutomationResult<()> {
        let mut state = self.begin("navigate", url)?;
        go_to(&mut state, url);
        debug!(url, "mock navigate");
        Ok(())
    }

    fn refresh(&self) -> AutomationResult<()> {
        let _state = self.begin("refresh", "")?;
        Ok(())
    }

    fn go_back(&self) -> AutomationResult<()> {
        let mut state = self.begin("go_back", "")?;
        if let Some(previous) = state.back.pop() {
            let current = std::mem::replace(&mut state.url, previous);
            state.forward.push(current);
            restore_title(&mut state);
        }
        Ok(())
    }

    fn go_forward(&self) -> AutomationResult<()> {
        let mut state = self.begin("go_forward", "")?;
        if let Some(next) = state.forward.pop() {
            let current = std::mem::replace(&mut state.url, next);
            state.back.push(current);
            restore_title(&mut state);
        }
        Ok(())
    }

    fn current_url(&self) -> AutomationResult<String> {
        Ok(self.begin("current_url", "")?.url.clone())
    }

    fn title(&self) -> AutomationResult<String> {
        Ok(self.begin("title", "")?.title.clone())
    }

    fn page_source(&self) -> AutomationResult<String> {
        Ok(self.begin("page_source", "")?.page_source.clone())
    }

    fn execute_script(&self, script: &str) -> AutomationResult<serde_json::Value> {
        let mut state = self.begin("execute_script", script)?;
        Ok(state
            .script_results
            .pop_front()
            .unwrap_or(serde_json::Value::Null))
    }

    fn screenshot(&self) -> AutomationResult<Vec<u8>> {
        let _state = self.begin("screenshot", "")?;
        Ok(MOCK_PNG.to_vec())
    }

    fn count(&self, selector: &str) -> AutomationResult<usize> {
        let mut state = self.begin("count", selector)?;
        Ok(lookup(&mut state, selector).map_or(0, |e| e.matches))
    }

    fn is_visible(&self, selector: &str) -> AutomationResult<bool> {
        let mut state = self.begin("is_visible", selector)?;
        Ok(lookup(&mut state, selector).is_some_and(|e| e.visible && e.matches > 0))
    }

    fn is_enabled(&self, selector: &str) -> AutomationResult<bool> {
        let mut state = self.begin("is_enabled", selector)?;
        Ok(require(&mut state, selector)?.enabled)
    }

    fn is_checked(&self, selector: &str) -> AutomationResult<bool> {
        let mut state = self.begin("is_checked", selector)?;
        Ok(require(&mut state, selector)?.checked)
    }

    fn text_content(&self, selector: &str) -> AutomationResult<Option<String>> {
        let mut state = self.begin("text_content", selector)?;
        Ok(Some(require(&mut state, selector)?.text.clone()))
    }

    fn inner_text(&self, selector: &str) -> AutomationResult<String> {
        let mut state = self.begin("inner_text", selector)?;
        let element = require(&mut state, selector)?;
        Ok(if element.visible {
            element.text.trim().to_string()
        } else {
            String::new()
        })
    }

    fn attribute(&self, selector: &str, name: &str) -> AutomationResult<Option<String>> {
        let mut state = self.begin("attribute", &format!("{selector}@{name}"))?;
        Ok(require(&mut state, selector)?.attributes.get(name).cloned())
    }

    fn input_value(&self, selector: &str) -> AutomationResult<String> {
        let mut state = self.begin("input_value", selector)?;
        Ok(require(&mut state, selector)?.value.clone())
    }

    fn element_screenshot(&self, selector: &str) -> AutomationResult<Vec<u8>> {
        let mut state = self.begin("element_screenshot", selector)?;
        let element = require(&mut state, selector)?;
        if !element.visible {
            return Err(AutomationError::ElementNotVisible {
                selector: selector.to_string(),
            });
        }
        Ok(if element.screenshot.is_empty() {
            MOCK_PNG.to_vec()
        } else {
            element.screenshot.clone()
        })
    }

    fn click(&self, selector: &str) -> AutomationResult<()> {
        let mut state = self.begin("click", selector)?;
        let _ = require_interactable(&mut state, selector)?;
        if let Some(url) = state.click_navigations.get(selector).cloned() {
            go_to(&mut state, &url);
        }
        Ok(())
    }

    fn double_click(&self, selector: &str) -> AutomationResult<()> {
        let mut state = self.begin("double_click", selector)?;
        let _ = require_interactable(&mut state, selector)?;
        Ok(())
    }

    fn hover(&self, selector: &str) -> AutomationResult<()> {
        let mut state = self.begin("hover", selector)?;
        let element = require(&mut state, selector)?;
        if !element.visible {
            return Err(AutomationError::ElementNotVisible {
                selector: selector.to_string(),
            });
        }
        Ok(())
    }

    fn fill(&self, selector: &str, value: &str) -> AutomationResult<()> {
        let mut state = self.begin("fill", &format!("{selector}={value}"))?;
        require_interactable(&mut state, selector)?.value = value.to_string();
        Ok(())
    }

    fn clear(&self, selector: &str) -> AutomationResult<()> {
        let mut state = self.begin("clear", selector)?;
        require_interactable(&mut state, selector)?.value.clear();
        Ok(())
    }

    fn type_text(&self, selector: &str, text: &str) -> AutomationResult<()> {
        let mut state = self.begin("type_text", &format!("{selector}={text}"))?;
        require_interactable(&mut state, selector)?.value.push_str(text);
        Ok(())
    }

    fn press(&self, selector: &str, key: &str) -> AutomationResult<()> {
        let mut state = self.begin("press", &format!("{selector}={key}"))?;
        let _ = require_interactable(&mut state, selector)?;
        Ok(())
    }

    fn check(&self, selector: &str) -> AutomationResult<()> {
        let mut state = self.begin("check", selector)?;
        let element = require_interactable(&mut state, selector)?;
        if !element.is_checkable() {
            return Err(AutomationError::ElementState {
                selector: selector.to_string(),
                message: "not a checkbox or radio input".to_string(),
            });
        }
        element.checked = true;
        Ok(())
    }

    fn uncheck(&self, selector: &str) -> AutomationResult<()> {
        let mut state = self.begin("uncheck", selector)?;
        let element = require_interactable(&mut state, selector)?;
        if !element.is_checkable() {
            return Err(AutomationError::ElementState {
                selector: selector.to_string(),
                message: "not a checkbox or radio input".to_string(),
            });
        }
        element.checked = false;
        Ok(())
    }

    fn select_option(&self, selector: &str, value: &str) -> AutomationResult<()> {
        let mut state = self.begin("select_option", &format!("{selector}={value}"))?;
        let element = require_interactable(&mut state, selector)?;
        if !element.options.iter().any(|o| o == value) {
            return Err(AutomationError::ElementState {
                selector: selector.to_string(),
                message: format!("no option with value '{value}'"),
            });
        }
        element.value = value.to_string();
        Ok(())
    }

    fn scroll_into_view(&self, selector: &str) -> AutomationResult<()> {
        let mut state = self.begin("scroll_into_view", selector)?;
        let _ = require(&mut state, selector)?;
        Ok(())
    }

    fn cookies(&self) -> AutomationResult<Vec<Cookie>> {
        Ok(self.begin("cookies", "")?.cookies.clone())
    }

    fn add_cookie(&self, cookie: Cookie) -> AutomationResult<()> {
        let mut state = self.begin("add_cookie", &cookie.name)?;
        state.cookies.retain(|c| c.name != cookie.name);
        state.cookies.push(cookie);
        Ok(())
    }

    fn delete_cookie(&self, name: &str) -> AutomationResult<()> {
        let mut state = self.begin("delete_cookie", name)?;
        state.cookies.retain(|c| c.name != name);
        Ok(())
    }

    fn clear_cookies(&self) -> AutomationResult<()> {
        self.begin("clear_cookies", "")?.cookies.clear();
        Ok(())
    }

    fn close(&self) -> AutomationResult<()> {
        let mut state = self.begin("close", "")?;
        state.closed = true;
        Ok(())
    }
}
