use anyhow::{anyhow, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::browser_protocol::storage::{GetCookiesParams, SetCookiesParams};
use chromiumoxide::Page;
use futures_util::StreamExt;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

use super::actions::LookupError;
use super::state::{OriginState, StorageState, READ_LOCAL_STORAGE_SCRIPT};

const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub headless: bool,
    pub viewport: Viewport,
}

/// Chromium session shared by the orchestrator and the session context.
///
/// Clones share one browser; `close` takes it out so it is released exactly once.
#[derive(Clone)]
pub struct BrowserSession {
    pub(super) browser: Arc<Mutex<Option<Browser>>>,
    /// Everything restored so far; persisting lays the live pages over it
    restored: Arc<Mutex<StorageState>>,
    /// Scripts registered on every page before its first navigation
    init_scripts: Arc<Mutex<Vec<String>>>,
    viewport: Viewport,
}

impl BrowserSession {
    /// Launch Chromium and start draining its CDP event stream
    pub async fn launch(options: LaunchOptions) -> Result<Self> {
        let viewport = options.viewport;
        let mut config = BrowserConfig::builder().window_size(viewport.width, viewport.height);

        if !options.headless {
            config = config.with_head();
        }

        // Disable automation detection flags for cleaner sessions
        config = config
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-default-apps");

        let config = config.build().map_err(|e| anyhow!("Failed to build browser config: {}", e))?;

        let (browser, mut handler) = timeout(LAUNCH_TIMEOUT, Browser::launch(config))
            .await
            .map_err(|_| anyhow!("Browser launch timeout (30s) - Chrome may not be installed or is unresponsive"))?
            .map_err(|e| anyhow!("Failed to launch browser: {}", e))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!("Browser handler event error: {}", e);
                }
            }
        });

        tracing::info!(
            "Browser launched ({}, {}x{})",
            if options.headless { "headless" } else { "headed" },
            viewport.width,
            viewport.height
        );

        Ok(Self {
            browser: Arc::new(Mutex::new(Some(browser))),
            restored: Arc::new(Mutex::new(StorageState::default())),
            init_scripts: Arc::new(Mutex::new(Vec::new())),
            viewport,
        })
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Open a new page sized to the session viewport, optionally navigating it
    pub async fn new_page(&self, url: Option<&str>) -> Result<Page> {
        let page = {
            let guard = self.browser.lock().await;
            let browser = guard.as_ref().ok_or_else(|| anyhow!("Browser is closed"))?;
            browser
                .new_page("about:blank")
                .await
                .map_err(|e| anyhow!("Failed to create page: {}", e))?
        };

        for script in self.init_scripts.lock().await.iter() {
            page.execute(AddScriptToEvaluateOnNewDocumentParams::new(script.clone()))
                .await
                .map_err(|e| anyhow!("Failed to register init script: {}", e))?;
        }

        let emulation_params = SetDeviceMetricsOverrideParams::builder()
            .width(self.viewport.width as i64)
            .height(self.viewport.height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(|e| anyhow!("Failed to build viewport params: {}", e))?;

        page.execute(emulation_params)
            .await
            .map_err(|e| anyhow!("Failed to set viewport: {}", e))?;

        if let Some(url) = url {
            navigate(&page, url).await?;
        }

        Ok(page)
    }

    /// Seed cookies and localStorage from a state file.
    ///
    /// localStorage reaches pages opened afterwards; callers apply it to already open pages.
    pub async fn restore_state(&self, path: &Path) -> Result<StorageState> {
        let state = StorageState::load(path)?;

        let cookies = state.cookie_params();
        if !cookies.is_empty() {
            let guard = self.browser.lock().await;
            let browser = guard.as_ref().ok_or_else(|| anyhow!("Browser is closed"))?;
            browser
                .execute(SetCookiesParams::new(cookies.clone()))
                .await
                .map_err(|e| anyhow!("Failed to restore cookies: {}", e))?;
        }

        if let Some(script) = state.local_storage_script() {
            self.init_scripts.lock().await.push(script);
        }

        {
            let mut restored = self.restored.lock().await;
            *restored = StorageState::snapshot(&restored, state.cookies.clone(), state.origins.clone());
        }

        tracing::info!(
            "Restored state from {:?} ({} cookie(s), {} origin(s))",
            path,
            cookies.len(),
            state.origins.len()
        );
        Ok(state)
    }

    /// Write the browser's cookies and localStorage to `path`.
    ///
    /// Cookies are read for the whole browser, not per page. localStorage is read from
    /// `pages` and laid over the origins restored earlier, so origins with no open page survive.
    pub async fn persist_state<'a>(&self, pages: impl IntoIterator<Item = &'a Page>, path: &Path) -> Result<StorageState> {
        let response = {
            let guard = self.browser.lock().await;
            let browser = guard.as_ref().ok_or_else(|| anyhow!("Browser is closed"))?;
            browser
                .execute(GetCookiesParams::default())
                .await
                .map_err(|e| anyhow!("Failed to read cookies: {}", e))?
        };
        let cookies = response
            .result
            .cookies
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut live_origins = Vec::new();
        for page in pages {
            match page.evaluate(READ_LOCAL_STORAGE_SCRIPT).await {
                Ok(result) => match result.into_value::<OriginState>() {
                    Ok(origin) => live_origins.push(origin),
                    Err(e) => tracing::warn!("Unexpected localStorage payload: {}", e),
                },
                Err(e) => tracing::warn!("Failed to read localStorage: {}", e),
            }
        }

        let state = StorageState::snapshot(&*self.restored.lock().await, cookies, live_origins);
        state.save(path)?;
        tracing::info!(
            "Persisted state to {:?} ({} cookie(s), {} origin(s))",
            path,
            state.cookies.len(),
            state.origins.len()
        );
        Ok(state)
    }

    /// Close the browser; later calls are no-ops
    pub async fn close(&self) -> Result<()> {
        let Some(mut browser) = self.browser.lock().await.take() else {
            return Ok(());
        };

        browser
            .close()
            .await
            .map_err(|e| anyhow!("Failed to close browser: {}", e))?;
        let _ = browser.wait().await;

        tracing::info!("Browser closed");
        Ok(())
    }

    pub async fn is_open(&self) -> bool {
        self.browser.lock().await.is_some()
    }
}

/// Navigate a page and wait for the load to settle
pub async fn navigate(page: &Page, url: &str) -> Result<()> {
    page.goto(url).await.map_err(|e| LookupError::Navigation {
        url: url.to_string(),
        detail: e.to_string(),
    })?;
    Ok(())
}
