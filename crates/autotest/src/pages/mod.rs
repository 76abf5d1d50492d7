//! Page objects for the application under test.

mod login;

pub use login::{CaptchaSolver, LoginPage, DEFAULT_CAPTCHA_RETRIES};
