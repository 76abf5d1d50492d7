//! OMP login page.
//!
//! Flow: wait for the form, fill credentials, solve the captcha (preset
//! value or OCR through a [`CaptchaSolver`], retried), click login, then
//! judge the result by the URL the app redirects to.

use crate::clock::{Clock, SystemClock};
use crate::condition::{ConditionArgs, ElementCondition};
use crate::driver::PageDriver;
use crate::page_object::{BasePage, PageObject};
use crate::result::{AutomationError, AutomationResult};
use crate::strategy::{WaitOptions, WaitStrategy};
use crate::wait::UrlPattern;
use std::fmt;
use std::time::Duration;
use tracing::{error, info, warn};

/// Default number of captcha attempts
pub const DEFAULT_CAPTCHA_RETRIES: u32 = 7;

const CAPTCHA_LENGTH: usize = 4;
const LOAD_TIMEOUT: Duration = Duration::from_secs(3);
const CAPTCHA_IMAGE_TIMEOUT: Duration = Duration::from_secs(5);
const LOGIN_RESULT_TIMEOUT: Duration = Duration::from_secs(10);
const LOGIN_ERROR_TIMEOUT: Duration = Duration::from_secs(2);

/// Recognizes captcha text from an image
pub trait CaptchaSolver: Send + Sync {
    /// Read the characters in a PNG captcha image
    ///
    /// # Errors
    ///
    /// Returns `Captcha` when the image cannot be read.
    fn recognize(&self, image: &[u8]) -> AutomationResult<String>;
}

impl<F> CaptchaSolver for F
where
    F: Fn(&[u8]) -> AutomationResult<String> + Send + Sync,
{
    fn recognize(&self, image: &[u8]) -> AutomationResult<String> {
        self(image)
    }
}

/// OMP login page
pub struct LoginPage<'d, C: Clock = SystemClock> {
    base: BasePage<'d, C>,
    solver: Option<Box<dyn CaptchaSolver + 'd>>,
}

impl<C: Clock + fmt::Debug> fmt::Debug for LoginPage<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginPage")
            .field("base", &self.base)
            .field("solver", &self.solver.is_some())
            .finish()
    }
}

impl<'d> LoginPage<'d, SystemClock> {
    /// Login page on the system clock
    #[must_use]
    pub fn new(driver: &'d dyn PageDriver, base_url: Option<String>) -> Self {
        Self::with_strategy(WaitStrategy::new(driver), base_url)
    }
}

impl<'d, C: Clock> LoginPage<'d, C> {
    /// Username field
    pub const USERNAME_INPUT: &'static str = "input[placeholder='用户名']";
    /// Password field
    pub const PASSWORD_INPUT: &'static str = "input[type='password'][placeholder='密码']";
    /// Captcha text field
    pub const CAPTCHA_INPUT: &'static str = "input[placeholder='验证码']";
    /// Captcha image
    pub const CAPTCHA_IMG: &'static str = "img[src*='captcha']";
    /// Submit button
    pub const LOGIN_BUTTON: &'static str = "button.login-form__btn";
    /// Toast shown on a failed login
    pub const ERROR_MESSAGE: &'static str = ".el-message--error, .login-error-message";
    /// Greeting shown after login
    pub const WELCOME_MESSAGE: &'static str = ".welcome-message";
    /// Inline error block checked when no redirect happens
    pub const LOGIN_ERROR: &'static str = ".login-error";
    /// Path fragment of the landing page after login
    pub const WORKBENCH_PATH: &'static str = "/workbench";

    /// Login page using an existing wait strategy
    #[must_use]
    pub fn with_strategy(waits: WaitStrategy<'d, C>, base_url: Option<String>) -> Self {
        Self {
            base: BasePage::with_strategy(waits, base_url, "/login"),
            solver: None,
        }
    }

    /// Use an OCR backend for captchas
    #[must_use]
    pub fn with_captcha_solver<S: CaptchaSolver + 'd>(mut self, solver: S) -> Self {
        self.solver = Some(Box::new(solver));
        self
    }

    /// Shared page plumbing
    #[must_use]
    pub const fn base(&self) -> &BasePage<'d, C> {
        &self.base
    }

    fn wait_visible(&self, selector: &str, timeout: Duration) -> AutomationResult<()> {
        self.base
            .waits()
            .wait_for(
                ElementCondition::Visible,
                &ConditionArgs::selector(selector),
                &WaitOptions::new().timeout(timeout),
            )
            .map(|_| ())
    }

    fn fill_credentials(&self, username: &str, password: &str) -> AutomationResult<()> {
        info!("filling username and password");
        self.base.element(Self::USERNAME_INPUT).fill(username)?;
        self.base.element(Self::PASSWORD_INPUT).fill(password)
    }

    fn read_captcha(&self) -> AutomationResult<String> {
        let solver = self.solver.as_deref().ok_or_else(|| AutomationError::Captcha {
            message: "no captcha solver configured".to_string(),
        })?;

        self.wait_visible(Self::CAPTCHA_IMG, CAPTCHA_IMAGE_TIMEOUT)?;
        let loaded = self.base.driver().execute_script(&format!(
            "(() => {{ const el = document.querySelector({:?}); \
             return !!el && el.complete && el.naturalWidth > 0; }})()",
            Self::CAPTCHA_IMG
        ))?;
        if loaded != serde_json::Value::Bool(true) {
            return Err(AutomationError::Captcha {
                message: "captcha image has not finished loading".to_string(),
            });
        }

        let image = self.base.element(Self::CAPTCHA_IMG).screenshot()?;
        let text = solver.recognize(&image)?;
        if text.chars().count() != CAPTCHA_LENGTH {
            return Err(AutomationError::Captcha {
                message: format!("unexpected OCR result: '{text}'"),
            });
        }
        info!(captcha = %text, "captcha recognized");
        Ok(text)
    }

    /// Enter the captcha, using `preset` on the first attempt and OCR after.
    ///
    /// # Errors
    ///
    /// Returns `Captcha` with the last failure once `max_retry` attempts are used.
    pub fn handle_captcha(&self, preset: Option<&str>, max_retry: u32) -> AutomationResult<String> {
        let mut value = preset.filter(|v| !v.is_empty()).map(str::to_string);
        let mut last_error: Option<AutomationError> = None;

        for attempt in 1..=max_retry {
            let result = match value.take() {
                Some(v) => Ok(v),
                None => self.read_captcha(),
            }
            .and_then(|captcha| {
                self.base.element(Self::CAPTCHA_INPUT).fill(&captcha)?;
                Ok(captcha)
            });

            match result {
                Ok(captcha) => {
                    info!("captcha entered");
                    return Ok(captcha);
                }
                Err(e) => {
                    warn!(attempt, max_retry, error = %e, "captcha attempt failed");
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error.map_or_else(|| "no attempts made".to_string(), |e| e.to_string());
        error!(%reason, "captcha recognition failed");
        Err(AutomationError::Captcha {
            message: format!("captcha recognition failed: {reason}"),
        })
    }

    fn click_login(&self) -> AutomationResult<()> {
        self.base.element(Self::LOGIN_BUTTON).click()?;
        info!("login button clicked");
        Ok(())
    }

    /// Open the login page.
    ///
    /// # Errors
    ///
    /// Returns `Page` without a base URL, or driver errors.
    pub fn open(&self) -> AutomationResult<()> {
        self.base.navigate(&[])
    }

    /// Run the login flow up to clicking the button.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` when the form never appears, `ElementNotFound` for
    /// missing fields, or `Captcha` when the captcha cannot be entered.
    pub fn login(
        &self,
        username: &str,
        password: &str,
        captcha: Option<&str>,
        max_retry: u32,
    ) -> AutomationResult<()> {
        info!(username, "starting login");
        self.wait_until_loaded(None)?;
        self.fill_credentials(username, password)?;
        let _ = self.handle_captcha(captcha, max_retry)?;
        self.click_login()
    }

    /// Whether login landed on a URL containing `expected_path`.
    ///
    /// Returns false on timeout, after logging whether an inline login
    /// error is shown.
    #[must_use]
    pub fn wait_for_login_result(&self, timeout: Option<Duration>, expected_path: &str) -> bool {
        let timeout = timeout.unwrap_or(LOGIN_RESULT_TIMEOUT);
        let pattern = UrlPattern::Glob(format!("**{expected_path}**"));
        let driver = self.base.driver();

        let reached = self.base.waits().wait_until(
            || Ok(pattern.matches(&driver.current_url()?).then_some(())),
            &WaitOptions::new()
                .timeout(timeout)
                .message(format!("URL never matched {pattern}")),
        );

        match reached {
            Ok(()) => {
                info!(expected_path, "redirected after login");
                true
            }
            Err(e) => {
                warn!(error = %e, "no redirect after login");
                if self.wait_visible(Self::LOGIN_ERROR, LOGIN_ERROR_TIMEOUT).is_ok() {
                    info!("login error shown");
                }
                false
            }
        }
    }

    /// Log in and require the redirect to the workbench.
    ///
    /// # Errors
    ///
    /// Returns `Login` with the page's error toast when no redirect happens.
    pub fn login_and_verify(
        &self,
        username: &str,
        password: &str,
        captcha: Option<&str>,
    ) -> AutomationResult<()> {
        self.login(username, password, captcha, DEFAULT_CAPTCHA_RETRIES)?;
        if self.wait_for_login_result(None, Self::WORKBENCH_PATH) {
            return Ok(());
        }
        let message = self
            .error_message()
            .unwrap_or_else(|| format!("did not reach {}", Self::WORKBENCH_PATH));
        Err(AutomationError::Login { message })
    }

    /// Text of the error toast, if one is visible
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        let element = self.base.element(Self::ERROR_MESSAGE);
        match element.is_visible() {
            Ok(true) => element
                .text()
                .ok()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            _ => None,
        }
    }

    /// Text of the welcome banner, if shown
    #[must_use]
    pub fn welcome_message(&self) -> Option<String> {
        self.base.element(Self::WELCOME_MESSAGE).text().ok()
    }
}

impl<C: Clock> PageObject for LoginPage<'_, C> {
    fn url_path(&self) -> &str {
        self.base.url_path()
    }

    fn page_name(&self) -> &str {
        "LoginPage"
    }

    fn is_loaded(&self) -> AutomationResult<bool> {
        if self.base.driver().count(Self::USERNAME_INPUT)? == 0 {
            warn!("login page not loaded: username input missing");
            return Err(AutomationError::element_not_found(Self::USERNAME_INPUT));
        }
        Ok(true)
    }

    fn wait_until_loaded(&self, timeout: Option<Duration>) -> AutomationResult<()> {
        info!("waiting for login page");
        self.wait_visible(Self::USERNAME_INPUT, timeout.unwrap_or(LOAD_TIMEOUT))?;
        info!("login page loaded");
        Ok(())
    }
}
