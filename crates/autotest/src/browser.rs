//! Chromium driver over CDP.
//!
//! [`ChromiumDriver`] owns a tokio runtime and blocks on every CDP call so it
//! can implement the synchronous [`PageDriver`]. Element state is read with
//! small `Runtime.evaluate` snippets addressed by CSS selector.

use crate::driver::{BrowserKind, Cookie, DriverConfig, PageDriver};
use crate::result::{AutomationError, AutomationResult};
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    ClearBrowserCookiesParams, CookieParam, DeleteCookiesParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams,
};
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use serde_json::Value;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Wrap `body` so it runs against the first match of `selector` bound to `el`.
///
/// The script yields `{"found": false}` when nothing matches, otherwise
/// `{"found": true, "value": <body>}`.
fn element_script(selector: &str, body: &str) -> String {
    let quoted = Value::String(selector.to_string()).to_string();
    format!(
        "(() => {{ const el = document.querySelector({quoted}); \
         if (!el) {{ return {{ found: false }}; }} \
         return {{ found: true, value: ({body}) }}; }})()"
    )
}

/// Visible when laid out with a non-zero box and not hidden by style
const VISIBLE_BODY: &str = "(() => { const s = window.getComputedStyle(el); \
    const r = el.getBoundingClientRect(); \
    return s.display !== 'none' && s.visibility !== 'hidden' && s.opacity !== '0' \
    && r.width > 0 && r.height > 0; })()";

/// Set the value and fire the events frameworks listen for
fn set_value_body(value: &str) -> String {
    let quoted = Value::String(value.to_string()).to_string();
    format!(
        "(() => {{ el.focus(); el.value = {quoted}; \
         el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
         el.dispatchEvent(new Event('change', {{ bubbles: true }})); return null; }})()"
    )
}

fn set_checked_body(checked: bool) -> String {
    format!(
        "(() => {{ if (el.checked !== {checked}) {{ el.click(); }} return el.checked; }})()"
    )
}

fn select_body(value: &str) -> String {
    let quoted = Value::String(value.to_string()).to_string();
    format!(
        "(() => {{ const opt = Array.from(el.options || []).find(o => o.value === {quoted}); \
         if (!opt) {{ return false; }} el.value = opt.value; \
         el.dispatchEvent(new Event('change', {{ bubbles: true }})); return true; }})()"
    )
}

/// Split an element script result into found / value
fn unwrap_found(selector: &str, result: &Value) -> AutomationResult<Value> {
    match result.get("found").and_then(Value::as_bool) {
        Some(true) => Ok(result.get("value").cloned().unwrap_or(Value::Null)),
        Some(false) => Err(AutomationError::element_not_found(selector)),
        None => Err(AutomationError::browser(format!(
            "unexpected script result for {selector}: {result}"
        ))),
    }
}

fn cdp_err(e: impl std::fmt::Display) -> AutomationError {
    AutomationError::browser(e.to_string())
}

fn to_cookie(c: chromiumoxide::cdp::browser_protocol::network::Cookie) -> Cookie {
    Cookie {
        name: c.name,
        value: c.value,
        domain: Some(c.domain),
        path: Some(c.path),
        expires: (c.expires > 0.0).then_some(c.expires),
        secure: c.secure,
        http_only: c.http_only,
    }
}

struct Session {
    browser: CdpBrowser,
    page: CdpPage,
    handler: JoinHandle<()>,
}

/// [`PageDriver`] backed by a real Chromium instance
pub struct ChromiumDriver {
    config: DriverConfig,
    runtime: Runtime,
    session: Mutex<Option<Session>>,
}

impl std::fmt::Debug for ChromiumDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromiumDriver")
            .field("config", &self.config)
            .field("started", &self.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl ChromiumDriver {
    /// Launch Chromium and open a blank page.
    ///
    /// # Errors
    ///
    /// Returns `DriverInit` for a non-Chromium browser kind or a failed launch.
    pub fn launch(config: DriverConfig) -> AutomationResult<Self> {
        if config.browser != BrowserKind::Chromium {
            return Err(AutomationError::DriverInit {
                message: format!("{} is not supported by the CDP driver", config.browser),
            });
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| AutomationError::DriverInit {
                message: format!("cannot start runtime: {e}"),
            })?;

        let mut builder = CdpConfig::builder()
            .window_size(config.viewport_width, config.viewport_height)
            .request_timeout(config.timeout);
        if !config.headless {
            builder = builder.with_head();
        }
        if !config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = config.executable_path {
            builder = builder.chrome_executable(path);
        }
        let cdp_config = builder
            .build()
            .map_err(|message| AutomationError::DriverInit { message })?;

        info!(
            headless = config.headless,
            width = config.viewport_width,
            height = config.viewport_height,
            "launching chromium"
        );

        let session = runtime.block_on(async {
            let (browser, mut handler) =
                CdpBrowser::launch(cdp_config)
                    .await
                    .map_err(|e| AutomationError::DriverInit {
                        message: e.to_string(),
                    })?;

            let handler = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if event.is_err() {
                        break;
                    }
                }
            });

            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| AutomationError::DriverInit {
                    message: e.to_string(),
                })?;

            Ok::<_, AutomationError>(Session {
                browser,
                page,
                handler,
            })
        })?;

        Ok(Self {
            config,
            runtime,
            session: Mutex::new(Some(session)),
        })
    }

    /// Configuration the browser was launched with
    #[must_use]
    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn page(&self) -> AutomationResult<CdpPage> {
        self.lock()
            .as_ref()
            .map(|s| s.page.clone())
            .ok_or(AutomationError::DriverNotStarted)
    }

    /// Run an async CDP operation against the current page
    fn run<T, F, Fut>(&self, f: F) -> AutomationResult<T>
    where
        F: FnOnce(CdpPage) -> Fut,
        Fut: Future<Output = AutomationResult<T>>,
    {
        let page = self.page()?;
        self.runtime.block_on(f(page))
    }

    /// Pause after an action when `slow_mo` is set
    fn settle(&self) {
        if !self.config.slow_mo.is_zero() {
            std::thread::sleep(self.config.slow_mo);
        }
    }

    fn evaluate(&self, script: String) -> AutomationResult<Value> {
        self.run(|page| async move {
            let result = page.evaluate(script).await.map_err(cdp_err)?;
            Ok(result.value().cloned().unwrap_or(Value::Null))
        })
    }

    fn on_element(&self, selector: &str, body: &str) -> AutomationResult<Value> {
        let result = self.evaluate(element_script(selector, body))?;
        unwrap_found(selector, &result)
    }

    fn element_action(&self, selector: &str, body: &str) -> AutomationResult<()> {
        debug!(selector, "element action");
        let _ = self.on_element(selector, body)?;
        self.settle();
        Ok(())
    }

    /// Run a native CDP element interaction
    fn with_element<F, Fut>(&self, selector: &str, f: F) -> AutomationResult<()>
    where
        F: FnOnce(chromiumoxide::element::Element) -> Fut,
        Fut: Future<Output = Result<(), chromiumoxide::error::CdpError>>,
    {
        let sel = selector.to_string();
        self.run(|page| async move {
            let element = page
                .find_element(sel.as_str())
                .await
                .map_err(|_| AutomationError::element_not_found(sel.as_str()))?;
            f(element).await.map_err(|e| AutomationError::ElementNotInteractable {
                selector: sel.clone(),
                message: e.to_string(),
            })
        })?;
        self.settle();
        Ok(())
    }

    fn as_string(value: Value) -> String {
        match value {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

impl PageDriver for ChromiumDriver {
    fn navigate(&self, url: &str) -> AutomationResult<()> {
        info!(url, "navigate");
        let target = url.to_string();
        self.run(|page| async move {
            page.goto(target.as_str())
                .await
                .map_err(|e| AutomationError::Navigation {
                    url: target.clone(),
                    message: e.to_string(),
                })?;
            Ok(())
        })
    }

    fn refresh(&self) -> AutomationResult<()> {
        self.run(|page| async move {
            page.reload().await.map_err(cdp_err)?;
            Ok(())
        })
    }

    fn go_back(&self) -> AutomationResult<()> {
        let _ = self.evaluate("history.back()".to_string())?;
        self.settle();
        Ok(())
    }

    fn go_forward(&self) -> AutomationResult<()> {
        let _ = self.evaluate("history.forward()".to_string())?;
        self.settle();
        Ok(())
    }

    fn current_url(&self) -> AutomationResult<String> {
        self.run(|page| async move {
            Ok(page.url().await.map_err(cdp_err)?.unwrap_or_default())
        })
    }

    fn title(&self) -> AutomationResult<String> {
        self.run(|page| async move {
            Ok(page.get_title().await.map_err(cdp_err)?.unwrap_or_default())
        })
    }

    fn page_source(&self) -> AutomationResult<String> {
        self.run(|page| async move { page.content().await.map_err(cdp_err) })
    }

    fn execute_script(&self, script: &str) -> AutomationResult<Value> {
        self.evaluate(script.to_string())
    }

    fn screenshot(&self) -> AutomationResult<Vec<u8>> {
        self.run(|page| async move {
            let params = CaptureScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .build();
            let shot = page.execute(params).await.map_err(cdp_err)?;

            use base64::Engine;
            base64::engine::general_purpose::STANDARD
                .decode(&shot.data)
                .map_err(cdp_err)
        })
    }

    fn count(&self, selector: &str) -> AutomationResult<usize> {
        let quoted = Value::String(selector.to_string()).to_string();
        let value = self.evaluate(format!("document.querySelectorAll({quoted}).length"))?;
        value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| AutomationError::browser(format!("bad count for {selector}: {value}")))
    }

    fn is_visible(&self, selector: &str) -> AutomationResult<bool> {
        match self.on_element(selector, VISIBLE_BODY) {
            Ok(v) => Ok(v.as_bool().unwrap_or(false)),
            Err(AutomationError::ElementNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn is_enabled(&self, selector: &str) -> AutomationResult<bool> {
        Ok(self.on_element(selector, "!el.disabled")?.as_bool().unwrap_or(true))
    }

    fn is_checked(&self, selector: &str) -> AutomationResult<bool> {
        Ok(self.on_element(selector, "!!el.checked")?.as_bool().unwrap_or(false))
    }

    fn text_content(&self, selector: &str) -> AutomationResult<Option<String>> {
        let value = self.on_element(selector, "el.textContent")?;
        Ok(value.as_str().map(str::to_string))
    }

    fn inner_text(&self, selector: &str) -> AutomationResult<String> {
        self.on_element(selector, "el.innerText").map(Self::as_string)
    }

    fn attribute(&self, selector: &str, name: &str) -> AutomationResult<Option<String>> {
        let quoted = Value::String(name.to_string()).to_string();
        let value = self.on_element(selector, &format!("el.getAttribute({quoted})"))?;
        Ok(value.as_str().map(str::to_string))
    }

    fn input_value(&self, selector: &str) -> AutomationResult<String> {
        self.on_element(selector, "el.value").map(Self::as_string)
    }

    fn element_screenshot(&self, selector: &str) -> AutomationResult<Vec<u8>> {
        let sel = selector.to_string();
        self.run(|page| async move {
            let element = page
                .find_element(sel.as_str())
                .await
                .map_err(|_| AutomationError::element_not_found(sel.as_str()))?;
            element
                .screenshot(CaptureScreenshotFormat::Png)
                .await
                .map_err(cdp_err)
        })
    }

    fn click(&self, selector: &str) -> AutomationResult<()> {
        debug!(selector, "click");
        self.with_element(selector, |el| async move { el.click().await.map(|_| ()) })
    }

    fn double_click(&self, selector: &str) -> AutomationResult<()> {
        self.element_action(
            selector,
            "el.dispatchEvent(new MouseEvent('dblclick', { bubbles: true }))",
        )
    }

    fn hover(&self, selector: &str) -> AutomationResult<()> {
        self.with_element(selector, |el| async move { el.hover().await.map(|_| ()) })
    }

    fn fill(&self, selector: &str, value: &str) -> AutomationResult<()> {
        debug!(selector, "fill");
        self.element_action(selector, &set_value_body(value))
    }

    fn clear(&self, selector: &str) -> AutomationResult<()> {
        self.element_action(selector, &set_value_body(""))
    }

    fn type_text(&self, selector: &str, text: &str) -> AutomationResult<()> {
        let text = text.to_string();
        self.with_element(selector, |el| async move {
            el.focus().await?;
            el.type_str(text).await.map(|_| ())
        })
    }

    fn press(&self, selector: &str, key: &str) -> AutomationResult<()> {
        let key = key.to_string();
        self.with_element(selector, |el| async move {
            el.focus().await?;
            el.press_key(key).await.map(|_| ())
        })
    }

    fn check(&self, selector: &str) -> AutomationResult<()> {
        self.element_action(selector, &set_checked_body(true))
    }

    fn uncheck(&self, selector: &str) -> AutomationResult<()> {
        self.element_action(selector, &set_checked_body(false))
    }

    fn select_option(&self, selector: &str, value: &str) -> AutomationResult<()> {
        let selected = self.on_element(selector, &select_body(value))?;
        if selected.as_bool() == Some(true) {
            self.settle();
            Ok(())
        } else {
            Err(AutomationError::ElementState {
                selector: selector.to_string(),
                message: format!("no option with value '{value}'"),
            })
        }
    }

    fn scroll_into_view(&self, selector: &str) -> AutomationResult<()> {
        self.with_element(selector, |el| async move {
            el.scroll_into_view().await.map(|_| ())
        })
    }

    fn cookies(&self) -> AutomationResult<Vec<Cookie>> {
        self.run(|page| async move {
            let cookies = page.get_cookies().await.map_err(cdp_err)?;
            Ok(cookies.into_iter().map(to_cookie).collect())
        })
    }

    fn add_cookie(&self, cookie: Cookie) -> AutomationResult<()> {
        self.run(|page| async move {
            let mut param = CookieParam::new(cookie.name, cookie.value);
            param.domain = cookie.domain;
            param.path = cookie.path;
            param.secure = Some(cookie.secure);
            param.http_only = Some(cookie.http_only);
            page.set_cookie(param).await.map_err(cdp_err)?;
            Ok(())
        })
    }

    fn delete_cookie(&self, name: &str) -> AutomationResult<()> {
        let name = name.to_string();
        self.run(|page| async move {
            page.delete_cookie(DeleteCookiesParams::new(name))
                .await
                .map_err(cdp_err)?;
            Ok(())
        })
    }

    fn clear_cookies(&self) -> AutomationResult<()> {
        self.run(|page| async move {
            page.execute(ClearBrowserCookiesParams::default())
                .await
                .map_err(cdp_err)?;
            Ok(())
        })
    }

    fn close(&self) -> AutomationResult<()> {
        let Some(mut session) = self.lock().take() else {
            return Ok(());
        };
        info!("closing chromium");
        let result = self.runtime.block_on(async {
            let closed = session.browser.close().await.map(|_| ());
            let _ = session.browser.wait().await;
            closed
        });
        session.handler.abort();
        if let Err(e) = result {
            warn!(error = %e, "browser did not close cleanly");
            return Err(cdp_err(e));
        }
        Ok(())
    }
}

impl Drop for ChromiumDriver {
    fn drop(&mut self) {
        if self.lock().is_some() {
            let _ = self.close();
        }
    }
}
