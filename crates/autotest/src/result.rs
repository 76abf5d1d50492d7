//! Result and error types for autotest.

use std::time::Duration;
use thiserror::Error;

/// Result type for autotest operations
pub type AutomationResult<T> = Result<T, AutomationError>;

/// Errors that can occur while driving tests
#[derive(Debug, Error)]
pub enum AutomationError {
    // ------------------------------------------------------------------
    // Driver
    // ------------------------------------------------------------------
    /// Driver could not be created
    #[error("Failed to initialize driver: {message}")]
    DriverInit {
        /// Error message
        message: String,
    },

    /// Driver used before it was started
    #[error("Driver not started")]
    DriverNotStarted,

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// Browser-level failure (script evaluation, screenshots, cookies)
    #[error("Browser error: {message}")]
    Browser {
        /// Error message
        message: String,
    },

    // ------------------------------------------------------------------
    // Element
    // ------------------------------------------------------------------
    /// No element matched the selector
    #[error("Element not found: {selector}")]
    ElementNotFound {
        /// Selector that matched nothing
        selector: String,
    },

    /// Element exists but is not visible
    #[error("Element not visible: {selector}")]
    ElementNotVisible {
        /// Selector of the element
        selector: String,
    },

    /// Element cannot receive the requested interaction
    #[error("Element {selector} not interactable: {message}")]
    ElementNotInteractable {
        /// Selector of the element
        selector: String,
        /// Error message
        message: String,
    },

    /// Element is in an unexpected state
    #[error("Element {selector} in unexpected state: {message}")]
    ElementState {
        /// Selector of the element
        selector: String,
        /// Error message
        message: String,
    },

    // ------------------------------------------------------------------
    // Page
    // ------------------------------------------------------------------
    /// Page object error
    #[error("Page error: {message}")]
    Page {
        /// Error message
        message: String,
    },

    /// Login flow failed
    #[error("Login failed: {message}")]
    Login {
        /// Error message
        message: String,
    },

    // ------------------------------------------------------------------
    // Wait
    // ------------------------------------------------------------------
    /// Deadline passed before the condition was met
    #[error("{message} (elapsed {:.2}s, {attempts} attempts)", .elapsed.as_secs_f64())]
    Timeout {
        /// Error message
        message: String,
        /// Time spent waiting
        elapsed: Duration,
        /// Number of predicate evaluations
        attempts: u32,
    },

    /// Condition evaluation failed for a reason other than the deadline
    #[error("Condition not met: {message}")]
    ConditionNotMet {
        /// Error message
        message: String,
    },

    /// Caller passed an invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    // ------------------------------------------------------------------
    // Config
    // ------------------------------------------------------------------
    /// Required configuration key is missing
    #[error("Missing configuration key: {key}")]
    ConfigKey {
        /// Dot-path of the key
        key: String,
    },

    /// Configuration value has the wrong type
    #[error("Configuration key {key} is not a valid {expected}")]
    ConfigType {
        /// Dot-path of the key
        key: String,
        /// Expected type name
        expected: String,
    },

    /// Configuration value is present but unusable
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigValue {
        /// Dot-path of the key
        key: String,
        /// Error message
        message: String,
    },

    /// Configuration file missing or unreadable
    #[error("Configuration file {path}: {message}")]
    ConfigFile {
        /// File path
        path: String,
        /// Error message
        message: String,
    },

    // ------------------------------------------------------------------
    // Data / API
    // ------------------------------------------------------------------
    /// Test data could not be produced
    #[error("Test data error: {message}")]
    Data {
        /// Error message
        message: String,
    },

    /// Request could not be built or sent, or returned an error status
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Error message
        message: String,
        /// HTTP status, when a response was received
        status: Option<u16>,
    },

    /// Response body could not be parsed or failed validation
    #[error("API response invalid: {message}")]
    ApiResponse {
        /// Error message
        message: String,
    },

    /// Model validation failed
    #[error("{model} validation failed: {}", .errors.join("; "))]
    Validation {
        /// Model name
        model: String,
        /// One entry per failing field
        errors: Vec<String>,
    },

    // ------------------------------------------------------------------
    // Misc
    // ------------------------------------------------------------------
    /// Captcha could not be recognized or entered
    #[error("Captcha error: {message}")]
    Captcha {
        /// Error message
        message: String,
    },

    /// Email configuration or delivery failed
    #[error("Notification error: {message}")]
    Notification {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// HTTP transport error
    #[cfg(feature = "api")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AutomationError {
    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a browser error
    #[must_use]
    pub fn browser(message: impl Into<String>) -> Self {
        Self::Browser {
            message: message.into(),
        }
    }

    /// Create a condition-not-met error
    #[must_use]
    pub fn condition_not_met(message: impl Into<String>) -> Self {
        Self::ConditionNotMet {
            message: message.into(),
        }
    }

    /// Create an element-not-found error
    #[must_use]
    pub fn element_not_found(selector: impl Into<String>) -> Self {
        Self::ElementNotFound {
            selector: selector.into(),
        }
    }

    /// Create an API request error without a status
    #[must_use]
    pub fn api_request(message: impl Into<String>) -> Self {
        Self::ApiRequest {
            message: message.into(),
            status: None,
        }
    }

    /// Create an API response error
    #[must_use]
    pub fn api_response(message: impl Into<String>) -> Self {
        Self::ApiResponse {
            message: message.into(),
        }
    }

    /// Create a notification error
    #[must_use]
    pub fn notification(message: impl Into<String>) -> Self {
        Self::Notification {
            message: message.into(),
        }
    }

    /// Whether this error is a wait timeout
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether this error is an invalid argument
    #[must_use]
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_reports_elapsed_and_attempts() {
        let err = AutomationError::Timeout {
            message: "waiting for login".to_string(),
            elapsed: Duration::from_millis(2_500),
            attempts: 4,
        };
        let text = err.to_string();
        assert!(text.contains("waiting for login"));
        assert!(text.contains("2.50s"));
        assert!(text.contains("4 attempts"));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_validation_joins_errors() {
        let err = AutomationError::Validation {
            model: "PaymentRequest".to_string(),
            errors: vec!["total_fee: must be > 0".into(), "charset: must be UTF-8".into()],
        };
        assert_eq!(
            err.to_string(),
            "PaymentRequest validation failed: total_fee: must be > 0; charset: must be UTF-8"
        );
    }

    #[test]
    fn test_invalid_argument_helper() {
        let err = AutomationError::invalid_argument("selector is required");
        assert!(err.is_invalid_argument());
        assert!(!err.is_timeout());
        assert!(err.to_string().contains("selector is required"));
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "settings.yaml");
        let err: AutomationError = io_err.into();
        assert!(err.to_string().starts_with("I/O error"));
    }
}
