use chromiumoxide::Page;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;

use super::pages::PageStack;
use crate::browser::{BrowserSession, Selector};
use crate::config::Config;
use crate::desktop::InputDevice;
use crate::error::{BotError, Result};
use crate::runs::{ActionLog, Outcome, RunWorkspace};

/// State threaded through the steps of a run.
///
/// Each step receives the context by value and hands it back, so only the
/// executing step can touch it.
pub struct SessionContext {
    browser: Option<BrowserSession>,
    pages: PageStack<Page>,
    current_element: Option<Selector>,
    /// Dialog responder per page index
    dialog_responders: HashMap<usize, AbortHandle>,
    data: HashMap<String, Value>,
    workspace: RunWorkspace,
    log: ActionLog,
    input: Option<Arc<dyn InputDevice>>,
    config: Arc<Config>,
}

impl SessionContext {
    pub fn new(workspace: RunWorkspace, log: ActionLog, config: Arc<Config>) -> Self {
        Self {
            browser: None,
            pages: PageStack::new(),
            current_element: None,
            dialog_responders: HashMap::new(),
            data: HashMap::new(),
            workspace,
            log,
            input: None,
            config,
        }
    }

    pub fn with_browser(mut self, browser: BrowserSession) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn with_input(mut self, input: Arc<dyn InputDevice>) -> Self {
        self.input = Some(input);
        self
    }

    // ============ Browser ============

    pub fn browser(&self) -> Result<&BrowserSession> {
        self.browser
            .as_ref()
            .ok_or_else(|| BotError::Browser("no browser in this session".to_string()))
    }

    pub fn has_browser(&self) -> bool {
        self.browser.is_some()
    }

    /// The active page
    pub fn page(&self) -> Result<&Page> {
        self.pages
            .current()
            .ok_or_else(|| BotError::Resolution("no page is open".to_string()))
    }

    pub fn pages(&self) -> &PageStack<Page> {
        &self.pages
    }

    pub fn pages_mut(&mut self) -> &mut PageStack<Page> {
        &mut self.pages
    }

    /// Register a new page and make it the active one
    pub fn open_page(&mut self, page: Page) -> &Page {
        self.pages.push(page)
    }

    pub fn current_element(&self) -> Option<&Selector> {
        self.current_element.as_ref()
    }

    pub fn set_current_element(&mut self, selector: Selector) {
        self.current_element = Some(selector);
    }

    /// Install the dialog responder for a page, stopping the one it replaces.
    ///
    /// Returns whether an earlier responder was stopped.
    pub fn replace_dialog_responder(&mut self, page_index: usize, responder: AbortHandle) -> bool {
        match self.dialog_responders.insert(page_index, responder) {
            Some(previous) => {
                previous.abort();
                true
            }
            None => false,
        }
    }

    // ============ Desktop ============

    pub fn input(&self) -> Result<&dyn InputDevice> {
        self.input
            .as_deref()
            .ok_or_else(|| BotError::Input("desktop input is not available in this session".to_string()))
    }

    // ============ Data store ============

    pub fn store_data(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    pub fn get_data(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn data(&self) -> &HashMap<String, Value> {
        &self.data
    }

    // ============ Run ============

    pub fn workspace(&self) -> &RunWorkspace {
        &self.workspace
    }

    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Sleep for `wait_ms` and record it; zero is a no-op
    pub async fn pause(&self, wait_ms: u64) {
        if wait_ms == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        self.log.record(Outcome::Wait, format!("Waited {}ms", wait_ms));
    }
}
