//! Browser session management
//!
//! Launches a visible Chrome with automation-hiding flags, seeds the
//! validated cookie session into a fresh context, and hands back exactly one
//! page. The underlying process is released on every exit path: explicit
//! [`Browser::close`], or the transport's kill-on-drop backstop.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

use crate::cdp::transport::launch_chrome;
use crate::cdp::{Connection, Transport};
use crate::error::{Error, Result};
use crate::page::Page;
use crate::session::Session;

/// Global counter for unique user data directories
static BROWSER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Desktop Chrome user agent matching the launched binary's major line
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/144.0.0.0 Safari/537.36";

/// Per-launch browser context parameters.
///
/// The viewport is drawn from a fixed base plus a narrow jitter band so
/// repeated runs do not present a byte-identical fingerprint; locale and
/// timezone are a fixed, internally consistent pair (a mismatched pair is
/// itself a detection signal).
#[derive(Debug, Clone)]
pub struct ContextProfile {
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub user_agent: String,
    pub locale: String,
    pub timezone_id: String,
}

impl ContextProfile {
    /// Generate the profile for one launch
    pub fn randomized() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            viewport_width: 1280 + rng.gen_range(0..100),
            viewport_height: 720 + rng.gen_range(0..100),
            user_agent: USER_AGENT.to_string(),
            locale: "en".to_string(),
            timezone_id: "Asia/Bangkok".to_string(),
        }
    }
}

/// Find a Chrome/Chromium binary on the system
pub fn find_chrome() -> Result<PathBuf> {
    let candidates = if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "linux") {
        vec![
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ]
    } else if cfg!(target_os = "windows") {
        vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    } else {
        vec![]
    };

    for candidate in candidates {
        let path = std::path::Path::new(candidate);
        if path.exists() {
            return Ok(path.to_path_buf());
        }
    }

    Err(Error::ChromeNotFound)
}

/// Launch arguments. Context parameters travel here rather than through CDP
/// Emulation overrides, which page scripts can detect.
fn launch_args(profile: &ContextProfile) -> Vec<String> {
    vec![
        // Automation hiding
        "--disable-blink-features=AutomationControlled".into(),
        "--disable-automation".into(),
        "--disable-features=IsolateOrigins,site-per-process,AutomationControlled,EnableAutomation"
            .into(),
        "--disable-infobars".into(),
        "--disable-dev-shm-usage".into(),
        // Make the instance look like a normal desktop profile
        "--no-first-run".into(),
        "--no-default-browser-check".into(),
        "--no-sandbox".into(),
        "--disable-default-apps".into(),
        "--disable-hang-monitor".into(),
        "--disable-popup-blocking".into(),
        "--disable-prompt-on-repost".into(),
        "--disable-sync".into(),
        "--metrics-recording-only".into(),
        "--password-store=basic".into(),
        "--use-mock-keychain".into(),
        // Context parameters
        format!(
            "--window-size={},{}",
            profile.viewport_width, profile.viewport_height
        ),
        format!("--user-agent={}", profile.user_agent),
        format!("--lang={}", profile.locale),
        // Never headless: the target's bot detection is far more aggressive
        // against headless signatures.
    ]
}

/// A running Chrome seeded with an authenticated session
pub struct Browser {
    connection: Connection,
    /// User data directory (cleaned up on close)
    user_data_dir: PathBuf,
    profile: ContextProfile,
}

impl Browser {
    /// Launch Chrome, seed `session`'s cookies, and open one page.
    ///
    /// If anything past process spawn fails, the process is closed before the
    /// error propagates.
    pub async fn open(session: &Session) -> Result<(Self, Page)> {
        Self::open_with_profile(session, ContextProfile::randomized()).await
    }

    /// Launch with an explicit context profile
    pub async fn open_with_profile(
        session: &Session,
        profile: ContextProfile,
    ) -> Result<(Self, Page)> {
        let instance_id = BROWSER_COUNTER.fetch_add(1, Ordering::Relaxed);
        let user_data_dir = std::env::temp_dir().join(format!(
            "nxmkey-browser-{}-{}",
            std::process::id(),
            instance_id
        ));

        let _ = std::fs::remove_dir_all(&user_data_dir);
        std::fs::create_dir_all(&user_data_dir)?;

        let chrome_path = find_chrome()?;

        let mut args = launch_args(&profile);
        args.push(format!("--user-data-dir={}", user_data_dir.display()));

        tracing::info!("Launching Chrome from {:?}", chrome_path);
        let (child, ws_url) = launch_chrome(&chrome_path, &args, &profile.timezone_id)?;

        let transport = Transport::connect(child, &ws_url)?;
        let connection = Connection::new(transport);

        let browser = Self {
            connection,
            user_data_dir,
            profile,
        };

        // From here on the process is running; close it before surfacing any
        // initialization failure.
        match browser.init_page(session).await {
            Ok(page) => Ok((browser, page)),
            Err(e) => {
                if let Err(close_err) = browser.connection.close().await {
                    tracing::warn!("Teardown after failed init also failed: {}", close_err);
                }
                Err(e)
            }
        }
    }

    async fn init_page(&self, session: &Session) -> Result<Page> {
        let version = self.connection.version().await?;
        tracing::info!("Connected to Chrome: {}", version.product);

        let target_id = self.connection.create_target("about:blank").await?;
        let page_session = self.connection.attach_to_target(&target_id).await?;
        page_session.page_enable().await?;

        // Cookies must land before the first real navigation.
        let mut seeded = 0usize;
        for cookie in session.cookies() {
            if page_session.set_cookie(cookie).await? {
                seeded += 1;
            } else {
                tracing::warn!(name = %cookie.name, domain = %cookie.domain, "browser rejected cookie");
            }
        }
        tracing::debug!(seeded, total = session.cookies().len(), "session cookies injected");

        Ok(Page::new(page_session))
    }

    /// The context profile this browser was launched with
    pub fn profile(&self) -> &ContextProfile {
        &self.profile
    }

    /// Close the browser and remove its user data directory
    pub async fn close(self) -> Result<()> {
        self.connection.close().await?;
        let _ = std::fs::remove_dir_all(&self.user_data_dir);
        Ok(())
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        // Best-effort cleanup if close() wasn't called; the Transport's Drop
        // impl handles killing the Chrome process.
        let _ = std::fs::remove_dir_all(&self.user_data_dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_jitter_band() {
        for _ in 0..50 {
            let p = ContextProfile::randomized();
            assert!((1280..1380).contains(&p.viewport_width));
            assert!((720..820).contains(&p.viewport_height));
            assert_eq!(p.locale, "en");
            assert_eq!(p.timezone_id, "Asia/Bangkok");
        }
    }

    #[test]
    fn test_launch_args_carry_profile() {
        let profile = ContextProfile {
            viewport_width: 1300,
            viewport_height: 750,
            user_agent: "UA".into(),
            locale: "en".into(),
            timezone_id: "Asia/Bangkok".into(),
        };
        let args = launch_args(&profile);
        assert!(args.contains(&"--window-size=1300,750".to_string()));
        assert!(args.contains(&"--user-agent=UA".to_string()));
        assert!(args.contains(&"--lang=en".to_string()));
        assert!(!args.iter().any(|a| a.contains("headless")));
    }
}
