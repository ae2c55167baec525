//! Chrome session plumbing: launch, navigation, nudges, teardown.
//!
//! The session keeps a persistent profile directory under the XDG state
//! dir, so cookies and local storage survive across runs and the
//! traffic looks like a returning visitor rather than a fresh
//! automation profile on every page.

use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{Headers, SetExtraHttpHeadersParams};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, NavigateParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::config::ProbeConfig;

use super::error::ProbeError;

/// Runs before any site script on every new document.
const STEALTH_JS: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
window.chrome = window.chrome || { runtime: {} };
"#;

const SCROLL_JS: &str = "window.scrollBy(0, 400);";

/// Mutes and starts the player if there is one, otherwise clicks
/// whatever looks like an overlay play button.
const PLAYER_POKE_JS: &str = r#"() => {
    const v = document.querySelector('video');
    if (v) {
        v.muted = true;
        const p = v.play();
        if (p && p.catch) { p.catch(() => {}); }
        return 'play';
    }
    const btn = document.querySelector(
        '.vjs-big-play-button, .plyr__control--overlaid, [class*="play-button"], [class*="btn-play"]');
    if (btn) { btn.click(); return 'click'; }
    return 'none';
}
"#;

pub(super) struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    pub async fn launch(settings: &ProbeConfig) -> Result<Self, ProbeError> {
        let profile = profile_dir()?;
        let mut builder = BrowserConfig::builder()
            .user_data_dir(&profile)
            .window_size(1366, 768)
            .no_sandbox()
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--autoplay-policy=no-user-gesture-required")
            .arg("--mute-audio")
            .arg("--lang=en-US,en");
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(ProbeError::Launch)?;

        let (browser, mut handler) = Browser::launch(config).await?;
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });
        tracing::debug!(profile = %profile.display(), "browser session up");

        Ok(Self { browser, handler_task })
    }

    /// A fresh page with the automation fingerprint masked before any
    /// site script gets to look.
    pub async fn new_page(&self) -> Result<Page, ProbeError> {
        let page = self.browser.new_page("about:blank").await?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_JS))
            .await?;
        Ok(page)
    }

    /// Pins Referer/Origin on everything the page requests from here on.
    pub async fn set_stage_headers(
        &self,
        page: &Page,
        referer: &str,
        origin: Option<&str>,
    ) -> Result<(), ProbeError> {
        let mut map = serde_json::Map::new();
        map.insert("Referer".to_string(), referer.into());
        if let Some(origin) = origin {
            map.insert("Origin".to_string(), origin.into());
        }
        let headers = Headers::new(serde_json::Value::Object(map));
        page.execute(SetExtraHttpHeadersParams::new(headers)).await?;
        Ok(())
    }

    /// Navigates and waits for the load to settle, bounded by `timeout`.
    pub async fn navigate(
        &self,
        page: &Page,
        url: &str,
        referrer: Option<&str>,
        timeout: Duration,
    ) -> Result<(), ProbeError> {
        let mut params = NavigateParams::builder().url(url);
        if let Some(referrer) = referrer {
            params = params.referrer(referrer);
        }
        let params = params.build().map_err(ProbeError::Protocol)?;

        let nav = async {
            page.goto(params).await?;
            page.wait_for_navigation().await?;
            Ok::<(), CdpError>(())
        };
        match tokio::time::timeout(timeout, nav).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ProbeError::NavigationTimeout(timeout)),
        }
    }

    /// Light page interaction to coax lazy script into firing its
    /// requests. Scrolls every tick, pokes the player every fifth.
    pub async fn nudge(&self, page: &Page, tick: u32) {
        let js = if tick % 5 == 4 { PLAYER_POKE_JS } else { SCROLL_JS };
        if let Err(err) = page.evaluate(js).await {
            tracing::debug!(error = %err, "page nudge failed");
        }
    }

    /// Rendered HTML of the current document.
    pub async fn content(&self, page: &Page) -> Result<String, ProbeError> {
        Ok(page.content().await?)
    }

    pub async fn close(mut self) {
        if let Err(err) = self.browser.close().await {
            tracing::debug!(error = %err, "browser close failed");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
    }
}

fn profile_dir() -> Result<PathBuf, ProbeError> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dvr")
        .map_err(|e| ProbeError::Launch(format!("XDG lookup failed: {e}")))?;
    let dir = xdg_dirs.get_state_home().join("profile");
    std::fs::create_dir_all(&dir)
        .map_err(|e| ProbeError::Launch(format!("creating profile dir {}: {e}", dir.display())))?;
    Ok(dir)
}
