//! Chrome session and the page primitives the site flow is built from.
//!
//! Every wait takes an explicit timeout and polls the DOM. Failing to find
//! an element is an error carrying a human-readable name for it.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::BrowserSettings;
use crate::download::SessionCookies;

/// Executable names looked up on PATH.
const CHROME_NAMES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

const FALLBACK_PATHS: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/run/current-system/sw/bin/google-chrome",
    "/run/current-system/sw/bin/chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

/// Find Chrome/Chromium executable.
pub fn find_chrome() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("CHROME_BIN") {
        return Some(PathBuf::from(path));
    }

    for name in CHROME_NAMES {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    FALLBACK_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.exists())
}

/// A running browser plus the task pumping its DevTools connection.
pub struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    pub async fn launch(settings: &BrowserSettings) -> Result<Self> {
        let chrome_path = match &settings.chrome_executable {
            Some(path) => path.clone(),
            None => find_chrome().context(
                "Chrome/Chromium not found. Install Chrome or set browser.chrome_executable.",
            )?,
        };
        debug!(chrome = %chrome_path.display(), headless = settings.headless, "launching browser");

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .viewport(None)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");
        if !settings.headless {
            builder = builder.with_head();
        }
        if let Some(profile_dir) = &settings.profile_dir {
            std::fs::create_dir_all(profile_dir).with_context(|| {
                format!("Failed to create profile dir: {}", profile_dir.display())
            })?;
            builder = builder.user_data_dir(profile_dir);
        }

        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to configure browser: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;
        let handler_task = tokio::spawn(async move { while (handler.next().await).is_some() {} });

        Ok(Self {
            browser,
            handler_task,
        })
    }

    pub async fn new_page(&self, url: &str) -> Result<Page> {
        self.browser
            .new_page(url)
            .await
            .with_context(|| format!("Failed to open page {url}"))
    }

    /// Close the browser and stop the handler task.
    pub async fn close(mut self) {
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "browser did not close cleanly");
        }
        self.handler_task.abort();
    }
}

/// Quote a string as a JavaScript literal.
pub(crate) fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// A page plus the polling interval used by its waits.
#[derive(Clone)]
pub struct SitePage {
    page: Page,
    poll: Duration,
}

impl SitePage {
    pub fn new(page: Page, poll: Duration) -> Self {
        Self { page, poll }
    }

    pub fn inner(&self) -> &Page {
        &self.page
    }

    /// Navigate and require a 200 response for the document.
    pub async fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.page.goto(url))
            .await
            .map_err(|_| anyhow::anyhow!("Timed out loading {url}"))?
            .with_context(|| format!("Could not go to {url}"))?;

        match self.navigation_status().await? {
            Some(200) | None => Ok(()),
            Some(status) => anyhow::bail!("Loading {url} returned HTTP {status}"),
        }
    }

    /// HTTP status of the current document, when the browser reports it.
    pub async fn navigation_status(&self) -> Result<Option<u16>> {
        let status: u16 = self
            .eval(
                "(() => { const e = performance.getEntriesByType('navigation')[0]; \
                 return e && e.responseStatus ? e.responseStatus : 0; })()",
            )
            .await?;
        Ok((status != 0).then_some(status))
    }

    pub async fn url(&self) -> Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    pub async fn content(&self) -> Result<String> {
        self.page.content().await.context("Failed to read page content")
    }

    /// Evaluate an expression and deserialize its value.
    pub async fn eval<T: DeserializeOwned>(&self, expression: &str) -> Result<T> {
        let result = self
            .page
            .evaluate(expression)
            .await
            .context("Script evaluation failed")?;
        result
            .into_value()
            .context("Script returned an unexpected value")
    }

    /// Number of elements matching `selector`.
    pub async fn count(&self, selector: &str) -> Result<usize> {
        self.eval(&format!(
            "document.querySelectorAll({}).length",
            js_string(selector)
        ))
        .await
    }

    /// The element, which must already be on the page.
    pub async fn require(&self, selector: &str, what: &str) -> Result<Element> {
        if self.count(selector).await? == 0 {
            anyhow::bail!("Could not find {what} ({selector})");
        }
        self.page
            .find_element(selector)
            .await
            .with_context(|| format!("Could not get {what} ({selector})"))
    }

    /// Poll until `selector` is attached to the DOM.
    pub async fn wait_for(&self, selector: &str, what: &str, timeout: Duration) -> Result<Element> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.count(selector).await? > 0 {
                if let Ok(element) = self.page.find_element(selector).await {
                    return Ok(element);
                }
            }
            if Instant::now() >= deadline {
                anyhow::bail!("Timed out after {timeout:?} waiting for {what} ({selector})");
            }
            tokio::time::sleep(self.poll).await;
        }
    }

    /// Like [`wait_for`](Self::wait_for) but absence is not an error.
    pub async fn wait_for_optional(
        &self,
        selector: &str,
        what: &str,
        timeout: Duration,
    ) -> Result<Option<Element>> {
        match self.wait_for(selector, what, timeout).await {
            Ok(element) => Ok(Some(element)),
            Err(err) => {
                debug!(what, error = %err, "optional element not present");
                Ok(None)
            }
        }
    }

    /// Every element currently matching `selector`.
    pub async fn find_all(&self, selector: &str) -> Result<Vec<Element>> {
        if self.count(selector).await? == 0 {
            return Ok(Vec::new());
        }
        self.page
            .find_elements(selector)
            .await
            .with_context(|| format!("Could not list {selector}"))
    }

    /// Poll until at least one element matches and return them all.
    pub async fn wait_for_all(
        &self,
        selector: &str,
        what: &str,
        timeout: Duration,
    ) -> Result<Vec<Element>> {
        self.wait_for(selector, what, timeout).await?;
        self.page
            .find_elements(selector)
            .await
            .with_context(|| format!("Could not list {what} ({selector})"))
    }

    /// Wait until the document has finished parsing.
    pub async fn wait_for_dom_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let ready: bool = self.eval("document.readyState !== 'loading'").await?;
            if ready {
                return Ok(());
            }
            if Instant::now() >= deadline {
                anyhow::bail!("Timed out after {timeout:?} waiting for DOMContentLoaded");
            }
            tokio::time::sleep(self.poll).await;
        }
    }

    pub async fn click(&self, selector: &str, what: &str) -> Result<()> {
        let element = self.require(selector, what).await?;
        element
            .click()
            .await
            .with_context(|| format!("Could not click {what}"))?;
        debug!(what, "clicked");
        Ok(())
    }

    /// Replace the value of an input.
    pub async fn fill(&self, selector: &str, what: &str, value: &str) -> Result<()> {
        let element = self.require(selector, what).await?;
        element
            .call_js_fn("function() { this.value = ''; }", false)
            .await
            .with_context(|| format!("Could not clear {what}"))?;
        element
            .click()
            .await
            .with_context(|| format!("Could not focus {what}"))?
            .type_str(value)
            .await
            .with_context(|| format!("Could not type into {what}"))?;
        Ok(())
    }

    /// Remove every element matching `selector`. Returns how many were removed.
    pub async fn remove_all(&self, selector: &str) -> Result<usize> {
        self.eval(&format!(
            "(() => {{ const els = document.querySelectorAll({}); \
             els.forEach(el => el.remove()); return els.length; }})()",
            js_string(selector)
        ))
        .await
    }

    /// `(value, label)` of every option of a `<select>`.
    pub async fn select_options(&self, selector: &str) -> Result<Vec<(String, String)>> {
        self.eval(&format!(
            "(() => {{ const el = document.querySelector({}); \
             return el ? Array.from(el.options).map(o => [o.value, o.text.trim()]) : []; }})()",
            js_string(selector)
        ))
        .await
    }

    /// Select `value` in a `<select>` and fire its change handlers.
    pub async fn select_value(&self, selector: &str, value: &str) -> Result<()> {
        let selected: bool = self
            .eval(&format!(
                "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
                 el.value = {val}; \
                 el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
                 el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
                 return el.value === {val}; }})()",
                sel = js_string(selector),
                val = js_string(value)
            ))
            .await?;
        if !selected {
            anyhow::bail!("Could not select {value:?} in {selector}");
        }
        Ok(())
    }

    /// Cookies of the current page, for HTTP requests outside the browser.
    pub async fn cookies(&self) -> Result<SessionCookies> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .context("Failed to read browser cookies")?;
        let mut session = SessionCookies::new();
        for cookie in cookies {
            session.insert(cookie.name, cookie.value);
        }
        Ok(session)
    }
}

/// Run a function with `this` bound to the element and return its string result.
pub async fn element_string(element: &Element, function: &str) -> Result<String> {
    let returns = element
        .call_js_fn(function, false)
        .await
        .context("Element script failed")?;
    Ok(returns
        .result
        .value
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default())
}

/// Run a predicate with `this` bound to the element.
pub async fn element_bool(element: &Element, function: &str) -> Result<bool> {
    let returns = element
        .call_js_fn(function, false)
        .await
        .context("Element script failed")?;
    Ok(returns
        .result
        .value
        .and_then(|v| v.as_bool())
        .unwrap_or(false))
}

pub async fn element_outer_html(element: &Element) -> Result<String> {
    Ok(element
        .outer_html()
        .await
        .context("Failed to read element markup")?
        .unwrap_or_default())
}

pub async fn element_text(element: &Element) -> Result<String> {
    Ok(element
        .inner_text()
        .await
        .context("Failed to read element text")?
        .unwrap_or_default())
}
