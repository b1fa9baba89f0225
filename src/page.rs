//! Page abstraction
//!
//! [`Page`] wraps a CDP session with the handful of interactions the
//! extraction pipeline needs. The pipeline itself depends only on the
//! [`DomPage`] trait so it can run against an in-memory fake in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::cdp::{MouseEventType, PageSession};
use crate::error::{Error, Result};

/// Global counter for unique marker IDs to prevent race conditions
static MARKER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Poll interval for all bounded waits
const POLL_MS: u64 = 100;

/// Escape a string for safe use in JavaScript string literals
fn escape_js_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('"', "\\\"")
        .replace('`', "\\`")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace("${", "\\${")
}

/// The narrow surface the extractor drives a page through.
///
/// Every operation that can wait is bounded by an explicit timeout; nothing
/// here may block indefinitely.
#[async_trait]
pub trait DomPage {
    /// Navigate and wait only until the document's initial structure is
    /// parsed (not full resource load)
    async fn goto_dom_ready(&self, url: &str, timeout_ms: u64) -> Result<()>;

    /// Current document title
    async fn title(&self) -> Result<String>;

    /// Whether a selector currently matches, without waiting
    async fn has_element(&self, selector: &str) -> bool;

    /// Wait until the selector matches a rendered (box-model-computable) element
    async fn wait_for_visible(&self, selector: &str, timeout_ms: u64) -> Result<()>;

    /// Wait until the selector matches any element in the DOM
    async fn wait_for(&self, selector: &str, timeout_ms: u64) -> Result<()>;

    /// Wait for an interactive element carrying the text, then click it
    async fn click_by_text(&self, text: &str, timeout_ms: u64) -> Result<()>;

    /// `value` of the first element matching the selector, if any
    async fn input_value(&self, selector: &str) -> Result<Option<String>>;

    /// `href` of the first element matching the selector, if any
    async fn link_href(&self, selector: &str) -> Result<Option<String>>;

    /// Full-page PNG screenshot
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Serialized document HTML
    async fn content(&self) -> Result<String>;
}

/// A live browser page
pub struct Page {
    session: PageSession,
}

impl Page {
    pub(crate) fn new(session: PageSession) -> Self {
        Self { session }
    }

    /// Current URL
    pub async fn url(&self) -> Result<String> {
        self.session.frame_url().await
    }

    /// Evaluate JavaScript and return the result, requiring a value
    pub async fn evaluate<T: serde::de::DeserializeOwned>(&self, expression: &str) -> Result<T> {
        let result = self.session.evaluate(expression).await?;

        if let Some(exception) = result.exception_details {
            return Err(Error::CdpSimple(format!(
                "JavaScript error: {} at {}:{}",
                exception.text, exception.line_number, exception.column_number
            )));
        }

        if let Some(value) = result.result.value {
            let typed: T = serde_json::from_value(value)?;
            return Ok(typed);
        }

        Err(Error::CdpSimple("No value returned from evaluate".into()))
    }

    /// Evaluate JavaScript that may legitimately produce null/undefined,
    /// mapping those to `None`
    async fn evaluate_optional_string(&self, expression: &str) -> Result<Option<String>> {
        let result = self.session.evaluate(expression).await?;

        if let Some(exception) = result.exception_details {
            return Err(Error::CdpSimple(format!(
                "JavaScript error: {} at {}:{}",
                exception.text, exception.line_number, exception.column_number
            )));
        }

        Ok(result
            .result
            .value
            .and_then(|v| v.as_str().map(str::to_owned)))
    }

    /// Execute JavaScript without expecting a return value
    pub async fn execute(&self, expression: &str) -> Result<()> {
        let result = self.session.evaluate(expression).await?;
        if let Some(exception) = result.exception_details {
            return Err(Error::CdpSimple(format!(
                "JavaScript error: {} at {}:{}",
                exception.text, exception.line_number, exception.column_number
            )));
        }
        Ok(())
    }

    /// Find an element, returning its DOM node id
    async fn find(&self, selector: &str) -> Result<i32> {
        let root = self.session.get_document().await?;
        let node_id = self.session.query_selector(root, selector).await?;
        if node_id == 0 {
            return Err(Error::ElementNotFound(selector.to_string()));
        }
        Ok(node_id)
    }

    /// Click an element through real mouse events at its center
    async fn click_node(&self, node_id: i32) -> Result<()> {
        let model = self.session.get_box_model(node_id).await?;
        let (x, y) = model.center();

        self.session
            .dispatch_mouse_event(MouseEventType::MousePressed, x, y)
            .await?;
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.session
            .dispatch_mouse_event(MouseEventType::MouseReleased, x, y)
            .await
    }

    /// Tag the first interactive element containing `text` with a one-shot
    /// marker attribute so it can be addressed by selector. Returns the
    /// marker selector, or `None` when no element matches yet.
    async fn mark_by_text(&self, text: &str) -> Result<Option<String>> {
        let marker_id = MARKER_COUNTER.fetch_add(1, Ordering::SeqCst);
        let marker_attr = format!("data-nxmkey-text-{}", marker_id);
        let needle = escape_js_string(text).to_lowercase();

        let js = format!(
            r#"
            (() => {{
                const interactive = 'a, button, input[type="submit"], input[type="button"], [role="button"], [onclick]';
                for (const el of document.querySelectorAll(interactive)) {{
                    const t = (el.innerText || el.textContent || el.value || '').toLowerCase();
                    if (t.includes('{needle}')) {{
                        el.setAttribute('{marker_attr}', 'true');
                        return true;
                    }}
                }}
                return false;
            }})()
            "#
        );

        let found: bool = self.evaluate(&js).await?;
        if !found {
            return Ok(None);
        }
        Ok(Some(format!("[{}='true']", marker_attr)))
    }
}

#[async_trait]
impl DomPage for Page {
    async fn goto_dom_ready(&self, url: &str, timeout_ms: u64) -> Result<()> {
        let nav = self.session.navigate(url).await?;
        if let Some(error) = nav.error_text {
            return Err(Error::Navigation(error));
        }

        // Let the navigation replace the previous document before polling its
        // ready state.
        tokio::time::sleep(Duration::from_millis(POLL_MS)).await;

        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);
        loop {
            // readyState leaves "loading" once the DOM is parsed, which is
            // all the extraction flow needs.
            match self.session.evaluate("document.readyState").await {
                Ok(result) => {
                    if let Some(value) = result.result.value {
                        if matches!(value.as_str(), Some("interactive") | Some("complete")) {
                            return Ok(());
                        }
                    }
                }
                Err(_) => {
                    // Mid-navigation the evaluate can fail; keep waiting.
                }
            }

            if start.elapsed() > timeout {
                return Err(Error::Timeout(format!(
                    "Navigation to {} did not reach DOM-ready within {}ms",
                    url, timeout_ms
                )));
            }

            tokio::time::sleep(Duration::from_millis(POLL_MS)).await;
        }
    }

    async fn title(&self) -> Result<String> {
        Ok(self
            .evaluate_optional_string("document.title")
            .await?
            .unwrap_or_default())
    }

    async fn has_element(&self, selector: &str) -> bool {
        self.find(selector).await.is_ok()
    }

    async fn wait_for_visible(&self, selector: &str, timeout_ms: u64) -> Result<()> {
        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);

        loop {
            if let Ok(node_id) = self.find(selector).await {
                // Box model computable means the element is actually rendered.
                if self.session.get_box_model(node_id).await.is_ok() {
                    return Ok(());
                }
            }

            if start.elapsed() > timeout {
                return Err(Error::Timeout(format!(
                    "Element '{}' not visible within {}ms",
                    selector, timeout_ms
                )));
            }

            tokio::time::sleep(Duration::from_millis(POLL_MS)).await;
        }
    }

    async fn wait_for(&self, selector: &str, timeout_ms: u64) -> Result<()> {
        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);

        loop {
            if self.find(selector).await.is_ok() {
                return Ok(());
            }

            if start.elapsed() > timeout {
                return Err(Error::Timeout(format!(
                    "Element '{}' not found within {}ms",
                    selector, timeout_ms
                )));
            }

            tokio::time::sleep(Duration::from_millis(POLL_MS)).await;
        }
    }

    async fn click_by_text(&self, text: &str, timeout_ms: u64) -> Result<()> {
        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);

        let marker_selector = loop {
            if let Some(selector) = self.mark_by_text(text).await? {
                break selector;
            }

            if start.elapsed() > timeout {
                return Err(Error::Timeout(format!(
                    "Element with text '{}' not found within {}ms",
                    text, timeout_ms
                )));
            }

            tokio::time::sleep(Duration::from_millis(POLL_MS)).await;
        };

        let clicked = match self.find(&marker_selector).await {
            Ok(node_id) => self.click_node(node_id).await,
            Err(e) => Err(e),
        };

        // Always strip the marker, even when the click failed.
        let cleanup = format!(
            "document.querySelector(\"{}\")?.removeAttribute('{}')",
            escape_js_string(&marker_selector),
            marker_selector
                .trim_start_matches('[')
                .split('=')
                .next()
                .unwrap_or_default()
        );
        let _ = self.execute(&cleanup).await;

        clicked
    }

    async fn input_value(&self, selector: &str) -> Result<Option<String>> {
        let js = format!(
            "(() => {{ const el = document.querySelector('{}'); return el ? el.value : null; }})()",
            escape_js_string(selector)
        );
        self.evaluate_optional_string(&js).await
    }

    async fn link_href(&self, selector: &str) -> Result<Option<String>> {
        let js = format!(
            "(() => {{ const el = document.querySelector('{}'); return el ? el.href : null; }})()",
            escape_js_string(selector)
        );
        self.evaluate_optional_string(&js).await
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.session.capture_screenshot().await
    }

    async fn content(&self) -> Result<String> {
        Ok(self
            .evaluate_optional_string("document.documentElement.outerHTML")
            .await?
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_js_string() {
        assert_eq!(escape_js_string("plain"), "plain");
        assert_eq!(
            escape_js_string(r#"a[href^="nxm://"]"#),
            r#"a[href^=\"nxm://\"]"#
        );
        assert_eq!(escape_js_string("it's"), "it\\'s");
        assert_eq!(escape_js_string("${x}"), "\\${x}");
    }
}
