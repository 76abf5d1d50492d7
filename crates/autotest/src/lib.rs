//! Autotest: UI and API Test Automation
//!
//! Browser tests are written against page objects that wait on element
//! conditions with exponential backoff. API tests drive a signed payment
//! gateway client. Both share layered configuration, structured logging and
//! email notification of results.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    AUTOTEST Architecture                        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Page       │    │ Wait       │    │ Page       │            │
//! │   │ Objects    │───►│ Strategy + │───►│ Driver     │            │
//! │   │            │    │ Conditions │    │ (CDP/mock) │            │
//! │   └────────────┘    └─────┬──────┘    └────────────┘            │
//! │                           │                                     │
//! │                     ┌─────▼──────┐                              │
//! │                     │ Poller     │  min(P·B^(n-1), M)           │
//! │                     │ (backoff)  │                              │
//! │                     └────────────┘                              │
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Config     │    │ Payment    │    │ Notify     │            │
//! │   │ (layered)  │    │ (MD5 sign) │    │ (SMTP)     │            │
//! │   └────────────┘    └────────────┘    └────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use autotest::{ConditionArgs, ElementCondition, MockDriver, MockElement, WaitOptions, WaitStrategy};
//!
//! let driver = MockDriver::new();
//! driver.add_element("#submit", MockElement::new("button"));
//!
//! let waits = WaitStrategy::new(&driver);
//! let element = waits
//!     .wait_for(
//!         ElementCondition::Visible,
//!         &ConditionArgs::selector("#submit"),
//!         &WaitOptions::new(),
//!     )
//!     .unwrap();
//! assert_eq!(element.selector(), "#submit");
//! ```

#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

mod clock;
mod condition;
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
mod driver;
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
mod element;
#[allow(clippy::missing_errors_doc, clippy::doc_markdown)]
mod page_object;
mod result;
mod strategy;
mod wait;

/// Chromium driver over CDP
#[cfg(feature = "browser")]
#[allow(clippy::missing_errors_doc, clippy::items_after_statements)]
mod browser;

/// Layered configuration
pub mod config;

/// Test data generation
#[allow(clippy::missing_errors_doc, clippy::cast_possible_truncation)]
pub mod data;

/// Logging setup
pub mod logging;

/// Email notification of results
#[allow(clippy::missing_errors_doc, clippy::doc_markdown)]
pub mod notify;

/// Page objects for the application under test
pub mod pages;

/// Payment gateway client
#[cfg(feature = "api")]
#[allow(clippy::missing_errors_doc)]
pub mod payment;

/// Request signing
pub mod signature;

pub use clock::{Clock, FakeClock, SystemClock};
pub use condition::{
    AttributeHandler, ClickableHandler, ConditionArgs, ConditionHandler, ConditionRegistry,
    DisabledHandler, ElementCondition, EnabledHandler, InvisibleHandler, PresentHandler,
    SelectedHandler, StalenessHandler, TextHandler, ValueHandler, VisibleHandler,
};
pub use driver::{BrowserKind, Cookie, DriverConfig, MockDriver, MockElement, PageDriver};
pub use element::Element;
pub use page_object::{BasePage, PageObject};
pub use result::{AutomationError, AutomationResult};
pub use strategy::{AnyMatch, WaitOptions, WaitStrategy, WaitTarget};
pub use wait::{
    AnyPredicate, BackoffPolicy, Poller, UrlPattern, WaitOutcome, DEFAULT_BACKOFF_FACTOR,
    DEFAULT_MAX_POLL_INTERVAL, DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT,
};

#[cfg(feature = "browser")]
pub use browser::ChromiumDriver;

/// Prelude for convenient imports
pub mod prelude {
    pub use super::config::ConfigManager;
    pub use super::pages::LoginPage;
    pub use super::{
        AutomationError, AutomationResult, BackoffPolicy, BasePage, ConditionArgs,
        ElementCondition, MockDriver, MockElement, PageDriver, PageObject, WaitOptions,
        WaitStrategy,
    };

    #[cfg(feature = "browser")]
    pub use super::ChromiumDriver;
}
