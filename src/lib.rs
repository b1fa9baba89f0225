//! # nxmkey
//!
//! Authenticated secret extraction from Nexus Mods through a real Chrome session.
//!
//! Nexus Mods fronts its pages with bot detection that rejects plain HTTP
//! clients, so both secrets this crate retrieves - the account's personal API
//! key and the short-lived `key`/`expires` pair embedded in a generated
//! `nxm://` download link - have to be pulled out of a live, logged-in browser.
//! nxmkey drives a visible Chrome over a minimal custom CDP (Chrome DevTools
//! Protocol) implementation, seeded with cookies exported from the user's own
//! browser.
//!
//! ## Pipeline
//!
//! 1. [`Session::load`] - read, normalize and validate the exported cookies
//! 2. [`Browser::open`] - launch visible Chrome, seed the session, hand back a page
//! 3. [`extract::extract`] - navigate, detect challenge pages, wait and pull fields
//! 4. [`validate`] - format sanity checks before the value is trusted
//!
//! The browser process is torn down on every exit path; teardown failures are
//! logged and swallowed so they never mask the primary error.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nxmkey::{extract::ExtractionTarget, SiteConfig};
//!
//! #[tokio::main]
//! async fn main() -> nxmkey::Result<()> {
//!     let config = SiteConfig::default();
//!     let target = ExtractionTarget::DownloadKey {
//!         game_domain: "skyrimspecialedition".into(),
//!         mod_id: 266,
//!         file_id: 1000,
//!     };
//!
//!     let result = nxmkey::extract::run(&config, &target).await?;
//!     println!("{:?}", result);
//!     Ok(())
//! }
//! ```

pub mod browser;
pub mod cdp;
pub mod error;
pub mod extract;
pub mod page;
pub mod session;
pub mod validate;

use std::path::PathBuf;

// Re-exports
pub use browser::{Browser, ContextProfile};
pub use error::{Error, Result};
pub use extract::{Extraction, ExtractionTarget};
pub use page::Page;
pub use session::{SameSite, Session, SessionCookie};

/// Everything about the target site that the pipeline must not hard-code:
/// URLs, the session file, timeouts, selectors, and diagnostic paths.
///
/// Tests point `origin` and the selectors at fixture pages; production runs
/// use [`SiteConfig::default`].
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// Site origin, no trailing slash
    pub origin: String,
    /// Registrable domain the session cookies must belong to
    pub registrable_domain: String,
    /// Path to the exported cookies file
    pub cookies_path: PathBuf,
    /// Bound for navigation and every element wait
    pub timeout_ms: u64,
    /// Page title substring that marks a challenge interstitial
    pub challenge_title: String,
    pub selectors: Selectors,
    /// Screenshot written when an element wait fails
    pub failure_screenshot: PathBuf,
    /// HTML snapshot written when an element wait fails
    pub failure_html: PathBuf,
}

/// CSS selectors (and one button label) for the two fixed page shapes
#[derive(Debug, Clone)]
pub struct Selectors {
    /// Read-only input holding the API key on the settings page
    pub api_key_input: String,
    /// Visible label of the manual-download trigger on a file page
    pub slow_download_text: String,
    /// Link revealed after the slow-download flow starts
    pub download_link: String,
    /// Embedded challenge frame, the other interstitial signal besides the title
    pub captcha_frame: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            origin: "https://www.nexusmods.com".into(),
            registrable_domain: "nexusmods.com".into(),
            cookies_path: PathBuf::from("./cookies.json"),
            timeout_ms: 15_000,
            challenge_title: "Just a moment".into(),
            selectors: Selectors::default(),
            failure_screenshot: PathBuf::from("./debug-failure.png"),
            failure_html: PathBuf::from("./debug-failure.html"),
        }
    }
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            api_key_input: "input[readonly]".into(),
            slow_download_text: "Slow download".into(),
            download_link: r#".donation-wrapper a[href^="nxm://"]"#.into(),
            captcha_frame: r#"iframe[src*="captcha"]"#.into(),
        }
    }
}

impl SiteConfig {
    /// Settings page exposing the API key
    pub fn api_key_url(&self) -> String {
        format!("{}/settings/api-keys", self.origin)
    }

    /// File page parameterized for the manual ("slow") download path
    pub fn file_page_url(&self, game_domain: &str, mod_id: u64, file_id: u64) -> String {
        format!(
            "{}/{}/mods/{}?tab=files&file_id={}&nmm=1",
            self.origin, game_domain, mod_id, file_id
        )
    }
}
