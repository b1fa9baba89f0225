//! CDP connection and per-target session management

use std::sync::Arc;

use super::transport::Transport;
use super::types::*;
use crate::error::{Error, Result};
use crate::session::SessionCookie;

/// A CDP connection to the browser endpoint (Target and Browser domains)
pub struct Connection {
    transport: Arc<Transport>,
}

impl Connection {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    /// Get browser version info
    pub async fn version(&self) -> Result<BrowserGetVersionResult> {
        self.transport
            .send(None, "Browser.getVersion", &BrowserGetVersion {})
            .await
    }

    /// Create a new target (tab)
    pub async fn create_target(&self, url: &str) -> Result<String> {
        let result: TargetCreateTargetResult = self
            .transport
            .send(
                None,
                "Target.createTarget",
                &TargetCreateTarget {
                    url: url.to_string(),
                },
            )
            .await?;
        Ok(result.target_id)
    }

    /// Attach to a target and get a command session for it
    pub async fn attach_to_target(&self, target_id: &str) -> Result<PageSession> {
        let result: TargetAttachToTargetResult = self
            .transport
            .send(
                None,
                "Target.attachToTarget",
                &TargetAttachToTarget {
                    target_id: target_id.to_string(),
                    flatten: Some(true),
                },
            )
            .await?;

        Ok(PageSession {
            transport: Arc::clone(&self.transport),
            session_id: result.session_id,
        })
    }

    /// Ask the browser to shut down, then kill the process
    pub async fn close(&self) -> Result<()> {
        let _ = self
            .transport
            .send::<_, serde_json::Value>(None, "Browser.close", &BrowserClose {})
            .await;
        self.transport.close().await
    }
}

/// A CDP session attached to one page target
pub struct PageSession {
    transport: Arc<Transport>,
    session_id: String,
}

impl PageSession {
    async fn send<C, R>(&self, method: &str, params: &C) -> Result<R>
    where
        C: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        self.transport
            .send(Some(&self.session_id), method, params)
            .await
    }

    /// Enable page events
    pub async fn page_enable(&self) -> Result<()> {
        self.send::<_, serde_json::Value>("Page.enable", &PageEnable {})
            .await?;
        Ok(())
    }

    /// Start navigating to a URL
    pub async fn navigate(&self, url: &str) -> Result<PageNavigateResult> {
        self.send(
            "Page.navigate",
            &PageNavigate {
                url: url.to_string(),
            },
        )
        .await
    }

    /// Capture a full-page PNG screenshot
    pub async fn capture_screenshot(&self) -> Result<Vec<u8>> {
        let result: PageCaptureScreenshotResult = self
            .send(
                "Page.captureScreenshot",
                &PageCaptureScreenshot {
                    format: Some("png".into()),
                    quality: None,
                    capture_beyond_viewport: Some(true),
                },
            )
            .await?;

        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(&result.data)
            .map_err(|e| Error::Decode(e.to_string()))
    }

    /// Current URL of the main frame
    pub async fn frame_url(&self) -> Result<String> {
        let result: PageGetFrameTreeResult =
            self.send("Page.getFrameTree", &PageGetFrameTree {}).await?;
        Ok(result.frame_tree.frame.url)
    }

    /// Evaluate a JavaScript expression, returning the result by value
    pub async fn evaluate(&self, expression: &str) -> Result<RuntimeEvaluateResult> {
        self.send(
            "Runtime.evaluate",
            &RuntimeEvaluate {
                expression: expression.to_string(),
                return_by_value: Some(true),
                await_promise: Some(true),
            },
        )
        .await
    }

    /// Get the document root node id
    pub async fn get_document(&self) -> Result<i32> {
        let result: DOMGetDocumentResult = self
            .send(
                "DOM.getDocument",
                &DOMGetDocument {
                    depth: Some(0),
                    pierce: Some(true),
                },
            )
            .await?;
        Ok(result.root.node_id)
    }

    /// Query for a single element under a node; 0 means no match
    pub async fn query_selector(&self, node_id: i32, selector: &str) -> Result<i32> {
        let result: DOMQuerySelectorResult = self
            .send(
                "DOM.querySelector",
                &DOMQuerySelector {
                    node_id,
                    selector: selector.to_string(),
                },
            )
            .await?;
        Ok(result.node_id)
    }

    /// Get the box model for an element; errors if the element is not rendered
    pub async fn get_box_model(&self, node_id: i32) -> Result<BoxModel> {
        let result: DOMGetBoxModelResult = self
            .send(
                "DOM.getBoxModel",
                &DOMGetBoxModel {
                    node_id: Some(node_id),
                },
            )
            .await?;
        Ok(result.model)
    }

    /// Dispatch a left-button mouse press or release
    pub async fn dispatch_mouse_event(
        &self,
        event_type: MouseEventType,
        x: f64,
        y: f64,
    ) -> Result<()> {
        self.send::<_, serde_json::Value>(
            "Input.dispatchMouseEvent",
            &InputDispatchMouseEvent {
                r#type: event_type,
                x,
                y,
                button: Some(MouseButton::Left),
                click_count: Some(1),
            },
        )
        .await?;
        Ok(())
    }

    /// Seed one session cookie into the browser's cookie jar
    pub async fn set_cookie(&self, cookie: &SessionCookie) -> Result<bool> {
        let result: NetworkSetCookieResult = self
            .send(
                "Network.setCookie",
                &NetworkSetCookie {
                    name: cookie.name.clone(),
                    value: cookie.value.clone(),
                    domain: Some(cookie.domain.clone()),
                    path: Some(cookie.path.clone()),
                    secure: Some(cookie.secure),
                    http_only: Some(cookie.http_only),
                    same_site: cookie.same_site.map(|s| s.as_str().to_string()),
                    expires: cookie.expires.map(|e| e as f64),
                },
            )
            .await?;
        Ok(result.success)
    }
}
