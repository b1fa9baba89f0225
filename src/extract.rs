//! Page extraction pipeline
//!
//! Drives an authenticated page through one of the two fixed interaction
//! sequences and returns the validated secret. Challenge interstitials fail
//! fast and distinctly from ordinary timeouts: a challenge needs a human, a
//! timeout usually means layout drift, so the latter also drops screenshot
//! and HTML diagnostics for offline inspection.

use serde::Serialize;

use crate::browser::Browser;
use crate::error::{Error, Result};
use crate::page::DomPage;
use crate::session::Session;
use crate::validate::{parse_download_link, validate_api_key};
use crate::SiteConfig;

/// What to pull out of the site on this invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionTarget {
    /// The account's personal API key from the settings page
    ApiKey,
    /// A single-use download credential for one file of one mod
    DownloadKey {
        game_domain: String,
        mod_id: u64,
        file_id: u64,
    },
}

impl ExtractionTarget {
    /// The page this target is extracted from
    pub fn url(&self, config: &SiteConfig) -> String {
        match self {
            ExtractionTarget::ApiKey => config.api_key_url(),
            ExtractionTarget::DownloadKey {
                game_domain,
                mod_id,
                file_id,
            } => config.file_page_url(game_domain, *mod_id, *file_id),
        }
    }
}

/// Download credential parsed from a generated `nxm://` link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadKey {
    pub key: String,
    pub expires: String,
    pub download_url: String,
}

/// A validated extraction result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    ApiKey(String),
    DownloadKey(DownloadKey),
}

/// Run the full pipeline: load session, open browser, extract, tear down.
///
/// The browser is closed on every path once it has launched; teardown
/// failures are logged and never mask the extraction outcome. A session
/// failure surfaces before any browser process exists.
pub async fn run(config: &SiteConfig, target: &ExtractionTarget) -> Result<Extraction> {
    let session = Session::load(&config.cookies_path, &config.registrable_domain)?;
    let (browser, page) = Browser::open(&session).await?;

    let result = extract(&page, target, config).await;

    if let Err(e) = browser.close().await {
        tracing::warn!("Browser teardown failed: {}", e);
    }

    result
}

/// Navigate to the target page and extract its secret.
///
/// Generic over [`DomPage`] so the whole flow is testable without a browser.
pub async fn extract<P: DomPage + Sync>(
    page: &P,
    target: &ExtractionTarget,
    config: &SiteConfig,
) -> Result<Extraction> {
    let url = target.url(config);
    tracing::info!(%url, "navigating to target page");
    page.goto_dom_ready(&url, config.timeout_ms).await?;

    // Interstitial check comes before any extraction attempt. Non-retryable:
    // the operator has to clear the challenge in a real session first.
    let title = page.title().await?;
    if title.contains(&config.challenge_title)
        || page.has_element(&config.selectors.captcha_frame).await
    {
        tracing::warn!(%title, "challenge interstitial instead of target page");
        return Err(Error::ChallengeDetected { title });
    }

    match target {
        ExtractionTarget::ApiKey => extract_api_key(page, config).await,
        ExtractionTarget::DownloadKey { .. } => extract_download_key(page, config).await,
    }
}

async fn extract_api_key<P: DomPage + Sync>(page: &P, config: &SiteConfig) -> Result<Extraction> {
    let selector = &config.selectors.api_key_input;

    if let Err(err) = page.wait_for_visible(selector, config.timeout_ms).await {
        capture_failure_artifacts(page, config).await;
        return Err(err);
    }

    let raw = page
        .input_value(selector)
        .await?
        .ok_or_else(|| Error::field_missing("API key input"))?;

    let api_key = validate_api_key(&raw)?;
    Ok(Extraction::ApiKey(api_key))
}

async fn extract_download_key<P: DomPage + Sync>(
    page: &P,
    config: &SiteConfig,
) -> Result<Extraction> {
    let staged: Result<()> = async {
        page.click_by_text(&config.selectors.slow_download_text, config.timeout_ms)
            .await?;
        page.wait_for(&config.selectors.download_link, config.timeout_ms)
            .await?;
        Ok(())
    }
    .await;

    if let Err(err) = staged {
        capture_failure_artifacts(page, config).await;
        return Err(err);
    }

    let href = page
        .link_href(&config.selectors.download_link)
        .await?
        .ok_or_else(|| Error::field_missing("download link"))?;

    if href.trim().is_empty() {
        return Err(Error::field_empty("download link"));
    }

    let (key, expires) = parse_download_link(&href)?;
    Ok(Extraction::DownloadKey(DownloadKey {
        key,
        expires,
        download_url: href,
    }))
}

/// Best-effort diagnostics for wait failures. Own failures are logged and
/// discarded so the original error stays the propagated cause.
async fn capture_failure_artifacts<P: DomPage + Sync>(page: &P, config: &SiteConfig) {
    match page.screenshot().await {
        Ok(png) => {
            if let Err(e) = std::fs::write(&config.failure_screenshot, png) {
                tracing::warn!("Failed to write failure screenshot: {}", e);
            } else {
                tracing::info!(path = %config.failure_screenshot.display(), "wrote failure screenshot");
            }
        }
        Err(e) => tracing::warn!("Failed to capture failure screenshot: {}", e),
    }

    match page.content().await {
        Ok(html) => {
            if let Err(e) = std::fs::write(&config.failure_html, html) {
                tracing::warn!("Failed to write failure HTML snapshot: {}", e);
            } else {
                tracing::info!(path = %config.failure_html.display(), "wrote failure HTML snapshot");
            }
        }
        Err(e) => tracing::warn!("Failed to capture failure HTML: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const PNG_STUB: &[u8] = &[0x89, b'P', b'N', b'G'];

    /// In-memory page scripted per test
    struct FakePage {
        title: String,
        captcha_present: bool,
        input_value: Option<String>,
        link_href: Option<String>,
        waits_time_out: bool,
        screenshot_fails: bool,
        calls: Mutex<Vec<String>>,
    }

    impl Default for FakePage {
        fn default() -> Self {
            Self {
                title: "Mod page".into(),
                captcha_present: false,
                input_value: None,
                link_href: None,
                waits_time_out: false,
                screenshot_fails: false,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl FakePage {
        fn log(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn timed_out(&self, what: &str) -> Error {
            Error::Timeout(format!("{what} (scripted)"))
        }
    }

    #[async_trait]
    impl DomPage for FakePage {
        async fn goto_dom_ready(&self, url: &str, _timeout_ms: u64) -> Result<()> {
            self.log(format!("goto:{url}"));
            Ok(())
        }

        async fn title(&self) -> Result<String> {
            self.log("title");
            Ok(self.title.clone())
        }

        async fn has_element(&self, selector: &str) -> bool {
            self.log(format!("has:{selector}"));
            self.captcha_present
        }

        async fn wait_for_visible(&self, selector: &str, _timeout_ms: u64) -> Result<()> {
            self.log(format!("wait_visible:{selector}"));
            if self.waits_time_out {
                return Err(self.timed_out(selector));
            }
            Ok(())
        }

        async fn wait_for(&self, selector: &str, _timeout_ms: u64) -> Result<()> {
            self.log(format!("wait:{selector}"));
            if self.waits_time_out {
                return Err(self.timed_out(selector));
            }
            Ok(())
        }

        async fn click_by_text(&self, text: &str, _timeout_ms: u64) -> Result<()> {
            self.log(format!("click_text:{text}"));
            if self.waits_time_out {
                return Err(self.timed_out(text));
            }
            Ok(())
        }

        async fn input_value(&self, selector: &str) -> Result<Option<String>> {
            self.log(format!("input_value:{selector}"));
            Ok(self.input_value.clone())
        }

        async fn link_href(&self, selector: &str) -> Result<Option<String>> {
            self.log(format!("link_href:{selector}"));
            Ok(self.link_href.clone())
        }

        async fn screenshot(&self) -> Result<Vec<u8>> {
            self.log("screenshot");
            if self.screenshot_fails {
                return Err(Error::CdpSimple("screenshot unavailable".into()));
            }
            Ok(PNG_STUB.to_vec())
        }

        async fn content(&self) -> Result<String> {
            self.log("content");
            Ok("<html><body>fixture</body></html>".into())
        }
    }

    fn test_config(dir: &tempfile::TempDir) -> SiteConfig {
        SiteConfig {
            failure_screenshot: dir.path().join("debug-failure.png"),
            failure_html: dir.path().join("debug-failure.html"),
            ..SiteConfig::default()
        }
    }

    fn download_target() -> ExtractionTarget {
        ExtractionTarget::DownloadKey {
            game_domain: "skyrimspecialedition".into(),
            mod_id: 266,
            file_id: 1000,
        }
    }

    #[test]
    fn test_target_urls() {
        let config = SiteConfig::default();
        assert_eq!(
            ExtractionTarget::ApiKey.url(&config),
            "https://www.nexusmods.com/settings/api-keys"
        );
        assert_eq!(
            download_target().url(&config),
            "https://www.nexusmods.com/skyrimspecialedition/mods/266?tab=files&file_id=1000&nmm=1"
        );
    }

    #[tokio::test]
    async fn test_challenge_title_fails_before_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let page = FakePage {
            title: "Just a moment...".into(),
            ..FakePage::default()
        };

        let err = extract(&page, &ExtractionTarget::ApiKey, &config)
            .await
            .unwrap_err();
        assert!(err.is_challenge());

        let calls = page.calls();
        assert!(
            !calls.iter().any(|c| c.starts_with("wait") || c.starts_with("input_value")),
            "no extraction attempt expected after challenge, got {calls:?}"
        );
    }

    #[tokio::test]
    async fn test_captcha_frame_fails_even_with_benign_title() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let page = FakePage {
            captcha_present: true,
            ..FakePage::default()
        };

        let err = extract(&page, &download_target(), &config)
            .await
            .unwrap_err();
        assert!(err.is_challenge());
    }

    #[tokio::test]
    async fn test_api_key_happy_path_trims() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let key = "f".repeat(32);
        let page = FakePage {
            input_value: Some(format!("  {key}  ")),
            ..FakePage::default()
        };

        let result = extract(&page, &ExtractionTarget::ApiKey, &config)
            .await
            .unwrap();
        assert_eq!(result, Extraction::ApiKey(key));
    }

    #[tokio::test]
    async fn test_api_key_whitespace_only_is_field_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let page = FakePage {
            input_value: Some("   ".into()),
            ..FakePage::default()
        };

        let err = extract(&page, &ExtractionTarget::ApiKey, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FieldEmpty { .. }));
    }

    #[tokio::test]
    async fn test_api_key_missing_input_is_field_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let page = FakePage::default(); // input_value: None

        let err = extract(&page, &ExtractionTarget::ApiKey, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FieldMissing { .. }));
    }

    #[tokio::test]
    async fn test_download_key_happy_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let href = "nxm://Game/mods/12/files/34?key=ABC&expires=99";
        let page = FakePage {
            link_href: Some(href.into()),
            ..FakePage::default()
        };

        let result = extract(&page, &download_target(), &config).await.unwrap();
        assert_eq!(
            result,
            Extraction::DownloadKey(DownloadKey {
                key: "ABC".into(),
                expires: "99".into(),
                download_url: href.into(),
            })
        );

        // Button clicked before the link wait.
        let calls = page.calls();
        let click = calls.iter().position(|c| c == "click_text:Slow download");
        let wait = calls.iter().position(|c| c.starts_with("wait:.donation"));
        assert!(click.unwrap() < wait.unwrap(), "{calls:?}");
    }

    #[tokio::test]
    async fn test_download_key_serializes_single_line_camel_case() {
        let value = DownloadKey {
            key: "ABC".into(),
            expires: "99".into(),
            download_url: "nxm://x?key=ABC&expires=99".into(),
        };
        let json = serde_json::to_string(&value).unwrap();
        assert!(!json.contains('\n'));
        assert!(json.contains("\"downloadUrl\""));
    }

    #[tokio::test]
    async fn test_wait_timeout_writes_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let page = FakePage {
            waits_time_out: true,
            ..FakePage::default()
        };

        let err = extract(&page, &download_target(), &config)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(std::fs::read(&config.failure_screenshot).unwrap(), PNG_STUB);
        assert!(std::fs::read_to_string(&config.failure_html)
            .unwrap()
            .contains("fixture"));
    }

    #[tokio::test]
    async fn test_diagnostic_failure_does_not_mask_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let page = FakePage {
            waits_time_out: true,
            screenshot_fails: true,
            ..FakePage::default()
        };

        let err = extract(&page, &ExtractionTarget::ApiKey, &config)
            .await
            .unwrap_err();
        assert!(err.is_timeout(), "got {err:?}");
        // HTML snapshot still captured even though the screenshot failed.
        assert!(config.failure_html.exists());
        assert!(!config.failure_screenshot.exists());
    }

    #[tokio::test]
    async fn test_empty_href_is_field_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let page = FakePage {
            link_href: Some("  ".into()),
            ..FakePage::default()
        };

        let err = extract(&page, &download_target(), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FieldEmpty { .. }));
    }
}
