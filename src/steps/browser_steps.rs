use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::BringToFrontParams;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;

use super::{browser_failure, Step};
use crate::browser::{actions, download, manager, Selector};
use crate::error::{BotError, Result};
use crate::runs::{timestamp, Outcome};
use crate::session::SessionContext;

/// Default time WaitForSelector polls before giving up
pub const DEFAULT_SELECTOR_TIMEOUT_MS: u64 = 10_000;

/// Open a new page sized to the session viewport and make it current
#[derive(Debug, Clone, Default)]
pub struct OpenPage {
    url: Option<String>,
    wait_ms: u64,
}

impl OpenPage {
    pub fn new(url: Option<String>) -> Self {
        Self {
            url: url.filter(|u| !u.is_empty()),
            wait_ms: 0,
        }
    }

    pub fn with_wait(mut self, wait_ms: u64) -> Self {
        self.wait_ms = wait_ms;
        self
    }
}

#[async_trait]
impl Step for OpenPage {
    fn name(&self) -> &'static str {
        "OpenPage"
    }

    async fn execute(&self, mut ctx: SessionContext) -> Result<SessionContext> {
        let browser = ctx.browser()?.clone();
        let page = browser
            .new_page(self.url.as_deref())
            .await
            .map_err(browser_failure)?;

        let viewport = browser.viewport();
        ctx.log().record(
            Outcome::Display,
            format!("Set viewport size to {}x{}", viewport.width, viewport.height),
        );
        ctx.open_page(page);
        ctx.log().record(Outcome::Navigate, "Opened new browser page.");
        if let Some(url) = &self.url {
            ctx.log().record(Outcome::Navigate, format!("Navigated to {}", url));
        }

        ctx.pause(self.wait_ms).await;
        Ok(ctx)
    }
}

/// Navigate the current page
#[derive(Debug, Clone)]
pub struct GoToUrl {
    url: String,
    wait_ms: u64,
}

impl GoToUrl {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(BotError::Configuration("go_to_url requires a url".to_string()));
        }
        Ok(Self { url, wait_ms: 0 })
    }

    pub fn with_wait(mut self, wait_ms: u64) -> Self {
        self.wait_ms = wait_ms;
        self
    }
}

#[async_trait]
impl Step for GoToUrl {
    fn name(&self) -> &'static str {
        "GoToUrl"
    }

    async fn execute(&self, ctx: SessionContext) -> Result<SessionContext> {
        manager::navigate(ctx.page()?, &self.url)
            .await
            .map_err(browser_failure)?;
        ctx.log().record(Outcome::Navigate, format!("Navigated to {}", self.url));
        ctx.pause(self.wait_ms).await;
        Ok(ctx)
    }
}

/// Make another open page current; negative indices count from the newest page
#[derive(Debug, Clone)]
pub struct SwitchPage {
    index: i64,
}

impl SwitchPage {
    pub fn new(index: i64) -> Self {
        Self { index }
    }
}

#[async_trait]
impl Step for SwitchPage {
    fn name(&self) -> &'static str {
        "SwitchPage"
    }

    async fn execute(&self, mut ctx: SessionContext) -> Result<SessionContext> {
        ctx.pages_mut().select(self.index)?;
        if let Ok(page) = ctx.page() {
            // Bring the tab to the front so headed runs show what is being driven
            if let Err(e) = page.execute(BringToFrontParams::default()).await {
                tracing::debug!("Failed to bring page to front: {}", e);
            }
        }
        ctx.log().record(Outcome::Navigate, format!("Switched to page {}", self.index));
        Ok(ctx)
    }
}

/// Fixed pause
#[derive(Debug, Clone)]
pub struct Wait {
    ms: u64,
}

impl Wait {
    pub fn new(ms: u64) -> Self {
        Self { ms }
    }
}

#[async_trait]
impl Step for Wait {
    fn name(&self) -> &'static str {
        "Wait"
    }

    async fn execute(&self, ctx: SessionContext) -> Result<SessionContext> {
        ctx.pause(self.ms).await;
        Ok(ctx)
    }
}

/// Click an element and remember it as the current element
#[derive(Debug, Clone)]
pub struct ClickElement {
    selector: Selector,
    wait_ms: u64,
}

impl ClickElement {
    pub fn new(xpath: Option<&str>, css: Option<&str>) -> Result<Self> {
        Ok(Self::with_selector(Selector::resolve(xpath, css)?))
    }

    pub fn with_selector(selector: Selector) -> Self {
        Self { selector, wait_ms: 0 }
    }

    pub fn with_wait(mut self, wait_ms: u64) -> Self {
        self.wait_ms = wait_ms;
        self
    }
}

#[async_trait]
impl Step for ClickElement {
    fn name(&self) -> &'static str {
        "ClickElement"
    }

    async fn execute(&self, mut ctx: SessionContext) -> Result<SessionContext> {
        actions::click(ctx.page()?, &self.selector)
            .await
            .map_err(browser_failure)?;
        ctx.set_current_element(self.selector.clone());
        ctx.log().record(Outcome::Click, format!("Clicked element {}", self.selector));
        ctx.pause(self.wait_ms).await;
        Ok(ctx)
    }
}

/// Replace an input's value
#[derive(Debug, Clone)]
pub struct FillInput {
    selector: Selector,
    value: String,
    wait_ms: u64,
}

impl FillInput {
    pub fn new(xpath: Option<&str>, css: Option<&str>, value: impl Into<String>) -> Result<Self> {
        Ok(Self::with_selector(Selector::resolve(xpath, css)?, value))
    }

    pub fn with_selector(selector: Selector, value: impl Into<String>) -> Self {
        Self {
            selector,
            value: value.into(),
            wait_ms: 0,
        }
    }

    pub fn with_wait(mut self, wait_ms: u64) -> Self {
        self.wait_ms = wait_ms;
        self
    }
}

#[async_trait]
impl Step for FillInput {
    fn name(&self) -> &'static str {
        "FillInput"
    }

    async fn execute(&self, mut ctx: SessionContext) -> Result<SessionContext> {
        actions::fill(ctx.page()?, &self.selector, &self.value)
            .await
            .map_err(browser_failure)?;
        ctx.set_current_element(self.selector.clone());
        ctx.log().record(
            Outcome::Input,
            format!("Filled input {} with {}", self.selector, self.value),
        );
        ctx.pause(self.wait_ms).await;
        Ok(ctx)
    }
}

/// Fill an input, then press Enter in it
#[derive(Debug, Clone)]
pub struct FillAndSubmit {
    selector: Selector,
    value: String,
    wait_ms: u64,
}

impl FillAndSubmit {
    pub fn new(xpath: Option<&str>, css: Option<&str>, value: impl Into<String>) -> Result<Self> {
        Ok(Self::with_selector(Selector::resolve(xpath, css)?, value))
    }

    pub fn with_selector(selector: Selector, value: impl Into<String>) -> Self {
        Self {
            selector,
            value: value.into(),
            wait_ms: 0,
        }
    }

    pub fn with_wait(mut self, wait_ms: u64) -> Self {
        self.wait_ms = wait_ms;
        self
    }
}

#[async_trait]
impl Step for FillAndSubmit {
    fn name(&self) -> &'static str {
        "FillAndSubmit"
    }

    async fn execute(&self, mut ctx: SessionContext) -> Result<SessionContext> {
        let page = ctx.page()?;
        actions::fill(page, &self.selector, &self.value)
            .await
            .map_err(browser_failure)?;
        actions::press_key(page, &self.selector, "Enter")
            .await
            .map_err(browser_failure)?;
        ctx.set_current_element(self.selector.clone());
        ctx.pause(self.wait_ms).await;
        ctx.log().record(
            Outcome::Input,
            format!("Filled and submitted {} with {}", self.selector, self.value),
        );
        Ok(ctx)
    }
}

/// Submit a form through its submit control, or Enter when it has none
#[derive(Debug, Clone)]
pub struct SubmitForm {
    selector: Selector,
    wait_ms: u64,
}

impl SubmitForm {
    pub fn new(xpath: Option<&str>, css: Option<&str>) -> Self {
        let selector = Selector::resolve(xpath, css).unwrap_or_else(|_| Selector::Css("form".to_string()));
        Self { selector, wait_ms: 0 }
    }

    pub fn with_wait(mut self, wait_ms: u64) -> Self {
        self.wait_ms = wait_ms;
        self
    }
}

impl Default for SubmitForm {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[async_trait]
impl Step for SubmitForm {
    fn name(&self) -> &'static str {
        "SubmitForm"
    }

    async fn execute(&self, ctx: SessionContext) -> Result<SessionContext> {
        actions::submit_form(ctx.page()?, &self.selector)
            .await
            .map_err(browser_failure)?;
        ctx.log().record(Outcome::Input, format!("Submitted form {}", self.selector));
        ctx.pause(self.wait_ms).await;
        Ok(ctx)
    }
}

/// Block until an element appears
#[derive(Debug, Clone)]
pub struct WaitForSelector {
    selector: Selector,
    timeout_ms: u64,
}

impl WaitForSelector {
    pub fn new(xpath: Option<&str>, css: Option<&str>) -> Result<Self> {
        Ok(Self {
            selector: Selector::resolve(xpath, css)?,
            timeout_ms: DEFAULT_SELECTOR_TIMEOUT_MS,
        })
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

#[async_trait]
impl Step for WaitForSelector {
    fn name(&self) -> &'static str {
        "WaitForSelector"
    }

    async fn execute(&self, mut ctx: SessionContext) -> Result<SessionContext> {
        actions::wait_for(ctx.page()?, &self.selector, self.timeout_ms)
            .await
            .map_err(browser_failure)?;
        ctx.set_current_element(self.selector.clone());
        ctx.log().record(Outcome::Search, format!("Found element {}", self.selector));
        Ok(ctx)
    }
}

/// Read an element's text into the data store
#[derive(Debug, Clone)]
pub struct ExtractText {
    selector: Selector,
    store_as: Option<String>,
}

impl ExtractText {
    pub fn new(xpath: Option<&str>, css: Option<&str>, store_as: Option<String>) -> Result<Self> {
        Ok(Self {
            selector: Selector::resolve(xpath, css)?,
            store_as: store_as.filter(|k| !k.is_empty()),
        })
    }

    /// Data key the text is stored under; the selector itself when no key is given
    pub fn key(&self) -> String {
        self.store_as
            .clone()
            .unwrap_or_else(|| self.selector.to_string())
    }
}

#[async_trait]
impl Step for ExtractText {
    fn name(&self) -> &'static str {
        "ExtractText"
    }

    async fn execute(&self, mut ctx: SessionContext) -> Result<SessionContext> {
        let text = actions::inner_text(ctx.page()?, &self.selector)
            .await
            .map_err(browser_failure)?;
        let key = self.key();
        ctx.log().record(
            Outcome::Input,
            format!("Extracted text from {} into {}", self.selector, key),
        );
        ctx.store_data(key, Value::String(text));
        ctx.set_current_element(self.selector.clone());
        Ok(ctx)
    }
}

/// Click an element that triggers a download and save the file.
///
/// Failures are logged and the run continues.
#[derive(Debug, Clone)]
pub struct ClickAndDownload {
    selector: Selector,
    directory: Option<PathBuf>,
    file_name: Option<String>,
    wait_ms: u64,
}

impl ClickAndDownload {
    pub fn new(xpath: Option<&str>, css: Option<&str>) -> Result<Self> {
        Ok(Self {
            selector: Selector::resolve(xpath, css)?,
            directory: None,
            file_name: None,
            wait_ms: 0,
        })
    }

    /// Save into `directory` instead of the configured downloads folder
    pub fn into_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn named(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_wait(mut self, wait_ms: u64) -> Self {
        self.wait_ms = wait_ms;
        self
    }
}

#[async_trait]
impl Step for ClickAndDownload {
    fn name(&self) -> &'static str {
        "ClickAndDownload"
    }

    async fn execute(&self, mut ctx: SessionContext) -> Result<SessionContext> {
        let directory = self
            .directory
            .clone()
            .unwrap_or_else(|| ctx.config().downloads_dir.clone());

        let outcome = match ctx.browser().and_then(|browser| Ok((browser, ctx.page()?))) {
            Ok((browser, page)) => download::click_and_download(
                browser,
                page,
                &self.selector,
                &directory,
                self.file_name.as_deref(),
                &timestamp(),
            )
            .await
            .map_err(browser_failure),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(completed) => {
                ctx.log().record(Outcome::Storage, format!("Download started: {}", completed.url));
                let name = completed
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                ctx.log().record(Outcome::Storage, format!("Download completed: {}", name));
                ctx.log().record(Outcome::Click, format!("Clicked element {}", self.selector));
                ctx.set_current_element(self.selector.clone());
            }
            Err(e) => {
                ctx.log().failure(format!("Download via {} failed: {}", self.selector, e));
            }
        }

        ctx.pause(self.wait_ms).await;
        Ok(ctx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogPolicy {
    #[default]
    Accept,
    Dismiss,
}

/// Answer all future JavaScript dialogs on the current page
#[derive(Debug, Clone)]
pub struct HandleDialog {
    policy: DialogPolicy,
    wait_ms: u64,
}

impl HandleDialog {
    pub fn new(policy: DialogPolicy) -> Self {
        Self { policy, wait_ms: 0 }
    }

    pub fn with_wait(mut self, wait_ms: u64) -> Self {
        self.wait_ms = wait_ms;
        self
    }
}

#[async_trait]
impl Step for HandleDialog {
    fn name(&self) -> &'static str {
        "HandleDialog"
    }

    async fn execute(&self, mut ctx: SessionContext) -> Result<SessionContext> {
        let accept = self.policy == DialogPolicy::Accept;
        let responder = actions::answer_dialogs(ctx.page()?, accept)
            .await
            .map_err(browser_failure)?;
        if let Some(index) = ctx.pages().current_index() {
            ctx.replace_dialog_responder(index, responder);
        }

        if accept {
            ctx.log().record(Outcome::Accepted, "Set up dialog handler to accept dialogs");
        } else {
            ctx.log().ok("Set up dialog handler to dismiss dialogs");
        }
        ctx.pause(self.wait_ms).await;
        Ok(ctx)
    }
}

/// Save cookies and localStorage of the open pages under a name
#[derive(Debug, Clone)]
pub struct StoreState {
    name: String,
}

impl StoreState {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            name: state_name(name.into())?,
        })
    }
}

#[async_trait]
impl Step for StoreState {
    fn name(&self) -> &'static str {
        "StoreState"
    }

    async fn execute(&self, ctx: SessionContext) -> Result<SessionContext> {
        let path = ctx.config().state_path(&self.name);
        ctx.browser()?
            .persist_state(ctx.pages().iter(), &path)
            .await
            .map_err(|e| BotError::Resource(e.to_string()))?;
        ctx.log().record(Outcome::Storage, format!("Stored state {}", self.name));
        Ok(ctx)
    }
}

/// Restore a named state into the running browser
#[derive(Debug, Clone)]
pub struct LoadState {
    name: String,
}

impl LoadState {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            name: state_name(name.into())?,
        })
    }
}

#[async_trait]
impl Step for LoadState {
    fn name(&self) -> &'static str {
        "LoadState"
    }

    async fn execute(&self, ctx: SessionContext) -> Result<SessionContext> {
        let path = ctx.config().state_path(&self.name);
        let state = ctx
            .browser()?
            .restore_state(&path)
            .await
            .map_err(|e| BotError::Resource(e.to_string()))?;

        if let Some(script) = state.local_storage_script() {
            for page in ctx.pages().iter() {
                if let Err(e) = page.evaluate(script.as_str()).await {
                    tracing::warn!("Failed to seed localStorage on open page: {}", e);
                }
            }
        }

        ctx.log().record(Outcome::Storage, format!("Loaded state {}", self.name));
        Ok(ctx)
    }
}

fn state_name(name: String) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.contains(['/', '\\']) {
        return Err(BotError::Configuration(format!("invalid state name '{}'", name)));
    }
    Ok(trimmed.to_string())
}
