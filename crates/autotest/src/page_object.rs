//! Page Object Model Support
//!
//! A page object wraps one page of the application under test: where it
//! lives, how to tell it has loaded, and the flows a test drives through it.
//! [`BasePage`] carries the shared plumbing (URL building, history, waits);
//! concrete pages embed it.

use crate::clock::{Clock, SystemClock};
use crate::driver::PageDriver;
use crate::element::Element;
use crate::result::{AutomationError, AutomationResult};
use crate::strategy::{WaitOptions, WaitStrategy};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Trait for page objects representing a page in the UI.
///
/// # Example
///
/// ```ignore
/// struct OrdersPage<'d> {
///     base: BasePage<'d>,
/// }
///
/// impl PageObject for OrdersPage<'_> {
///     fn url_path(&self) -> &str {
///         "/orders"
///     }
///
///     fn is_loaded(&self) -> AutomationResult<bool> {
///         Ok(self.base.element("table.orders").exists()?)
///     }
///
///     fn wait_until_loaded(&self, timeout: Option<Duration>) -> AutomationResult<()> {
///         self.base.wait_until_loaded_by(self, timeout)
///     }
/// }
/// ```
pub trait PageObject {
    /// Path of this page relative to the base URL
    fn url_path(&self) -> &str;

    /// Page name for logging
    fn page_name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base)
    }

    /// Check once whether the page is ready for interaction
    ///
    /// # Errors
    ///
    /// Implementations may fail when a required element is missing.
    fn is_loaded(&self) -> AutomationResult<bool>;

    /// Poll `is_loaded` until it holds
    ///
    /// # Errors
    ///
    /// Returns `Timeout` when the page never loads.
    fn wait_until_loaded(&self, timeout: Option<Duration>) -> AutomationResult<()>;
}

/// Shared page plumbing
#[derive(Debug)]
pub struct BasePage<'d, C: Clock = SystemClock> {
    waits: WaitStrategy<'d, C>,
    base_url: Option<String>,
    path: String,
    expected_title: Option<String>,
}

impl<'d> BasePage<'d, SystemClock> {
    /// Page on the system clock
    #[must_use]
    pub fn new(driver: &'d dyn PageDriver, base_url: Option<String>, path: impl Into<String>) -> Self {
        Self::with_strategy(WaitStrategy::new(driver), base_url, path)
    }
}

impl<'d, C: Clock> BasePage<'d, C> {
    /// Page using an existing wait strategy
    #[must_use]
    pub fn with_strategy(
        waits: WaitStrategy<'d, C>,
        base_url: Option<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            waits,
            base_url,
            path: path.into(),
            expected_title: None,
        }
    }

    /// Treat the page as loaded only once the title matches
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.expected_title = Some(title.into());
        self
    }

    /// The driver
    #[must_use]
    pub fn driver(&self) -> &'d dyn PageDriver {
        self.waits.driver()
    }

    /// The wait strategy
    #[must_use]
    pub const fn waits(&self) -> &WaitStrategy<'d, C> {
        &self.waits
    }

    /// Handle for a selector
    #[must_use]
    pub fn element(&self, selector: &str) -> Element<'d> {
        Element::new(self.driver(), selector)
    }

    /// Absolute URL of this page with query params merged in; params
    /// replace existing keys of the same name.
    ///
    /// # Errors
    ///
    /// Returns `Page` when the path is relative and no base URL is set, or
    /// the result is not a valid URL.
    pub fn full_url(&self, params: &[(&str, &str)]) -> AutomationResult<String> {
        let raw = if Url::parse(&self.path).is_ok() {
            self.path.clone()
        } else {
            let base = self.base_url.as_deref().ok_or_else(|| AutomationError::Page {
                message: format!("cannot navigate to '{}': base URL is not set", self.path),
            })?;
            format!(
                "{}/{}",
                base.trim_end_matches('/'),
                self.path.trim_start_matches('/')
            )
        };

        let mut url = Url::parse(&raw).map_err(|e| AutomationError::Page {
            message: format!("invalid page URL '{raw}': {e}"),
        })?;

        if !params.is_empty() {
            let kept: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(k, _)| !params.iter().any(|(p, _)| p == k))
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            let mut pairs = url.query_pairs_mut();
            let _ = pairs.clear();
            for (k, v) in &kept {
                let _ = pairs.append_pair(k, v);
            }
            for (k, v) in params {
                let _ = pairs.append_pair(k, v);
            }
        }
        Ok(url.into())
    }

    /// Open this page.
    ///
    /// # Errors
    ///
    /// Returns `Page` for an unusable URL, or the driver's navigation error.
    pub fn navigate(&self, params: &[(&str, &str)]) -> AutomationResult<()> {
        let url = self.full_url(params)?;
        info!(url = %url, "navigating");
        self.driver().navigate(&url)
    }

    /// Reload
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn refresh(&self) -> AutomationResult<()> {
        self.driver().refresh()
    }

    /// History back
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn go_back(&self) -> AutomationResult<()> {
        self.driver().go_back()
    }

    /// History forward
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn go_forward(&self) -> AutomationResult<()> {
        self.driver().go_forward()
    }

    /// Document title
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn title(&self) -> AutomationResult<String> {
        self.driver().title()
    }

    /// Current URL
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn url(&self) -> AutomationResult<String> {
        self.driver().current_url()
    }

    /// Poll another page object's `is_loaded`.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` when the page never loads.
    pub fn wait_until_loaded_by<P: PageObject + ?Sized>(
        &self,
        page: &P,
        timeout: Option<Duration>,
    ) -> AutomationResult<()> {
        let timeout = timeout.unwrap_or_else(|| self.waits.timeout());
        debug!(page = page.page_name(), "waiting for page to load");
        self.waits.wait_until(
            || Ok(page.is_loaded()?.then_some(())),
            &WaitOptions::new().timeout(timeout).message(format!(
                "page '{}' not loaded within {}s",
                page.page_name(),
                timeout.as_secs_f64()
            )),
        )
    }
}

impl<C: Clock> PageObject for BasePage<'_, C> {
    fn url_path(&self) -> &str {
        &self.path
    }

    fn is_loaded(&self) -> AutomationResult<bool> {
        match &self.expected_title {
            Some(title) => Ok(self.title()? == *title),
            None => Ok(true),
        }
    }

    fn wait_until_loaded(&self, timeout: Option<Duration>) -> AutomationResult<()> {
        self.wait_until_loaded_by(self, timeout)
    }
}
