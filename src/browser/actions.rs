use anyhow::{anyhow, Result};
use chromiumoxide::cdp::browser_protocol::page::{EventJavascriptDialogOpening, HandleJavaScriptDialogParams};
use chromiumoxide::element::Element;
use chromiumoxide::Page;
use futures_util::StreamExt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::AbortHandle;

use super::selector::Selector;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The page was reachable but did not have what the step asked for
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Element {selector} not found{}", .detail.as_deref().map(|d| format!(": {}", d)).unwrap_or_default())]
    NotFound { selector: String, detail: Option<String> },

    #[error("Timeout waiting for element {selector} after {timeout_ms}ms")]
    Timeout { selector: String, timeout_ms: u64 },

    #[error("Failed to navigate to {url}: {detail}")]
    Navigation { url: String, detail: String },
}

impl LookupError {
    fn not_found(selector: &Selector, detail: Option<String>) -> anyhow::Error {
        Self::NotFound {
            selector: selector.to_string(),
            detail,
        }
        .into()
    }
}

/// Resolve a selector to an element on the page
pub async fn find_element(page: &Page, selector: &Selector) -> Result<Element> {
    match selector {
        Selector::Css(css) => page
            .find_element(css.as_str())
            .await
            .map_err(|e| LookupError::not_found(selector, Some(e.to_string()))),
        Selector::XPath(xpath) => {
            // chromiumoxide only queries by css, so tag the xpath match and look it up by attribute
            let marker = uuid::Uuid::new_v4().to_string();
            let found: bool = page
                .evaluate(Selector::xpath_marker_script(xpath, &marker))
                .await
                .map_err(|e| anyhow!("Failed to evaluate {}: {}", selector, e))?
                .into_value()
                .map_err(|e| anyhow!("Unexpected xpath result for {}: {}", selector, e))?;

            if !found {
                return Err(LookupError::not_found(selector, None));
            }

            page.find_element(Selector::marker_css(&marker))
                .await
                .map_err(|e| LookupError::not_found(selector, Some(e.to_string())))
        }
    }
}

pub async fn click(page: &Page, selector: &Selector) -> Result<()> {
    let element = find_element(page, selector).await?;
    element
        .click()
        .await
        .map_err(|e| anyhow!("Failed to click element {}: {}", selector, e))?;
    Ok(())
}

/// Focus the element, clear its value, then type `text`
pub async fn fill(page: &Page, selector: &Selector, text: &str) -> Result<()> {
    let element = find_element(page, selector).await?;

    element
        .click()
        .await
        .map_err(|e| anyhow!("Failed to focus element {}: {}", selector, e))?;

    element
        .call_js_fn(
            "function() { if ('value' in this) { this.value = ''; this.dispatchEvent(new Event('input', { bubbles: true })); } }",
            false,
        )
        .await
        .map_err(|e| anyhow!("Failed to clear element {}: {}", selector, e))?;

    element
        .type_str(text)
        .await
        .map_err(|e| anyhow!("Failed to type into element {}: {}", selector, e))?;

    Ok(())
}

/// Press a named key (e.g. "Enter") while the element has focus
pub async fn press_key(page: &Page, selector: &Selector, key: &str) -> Result<()> {
    let element = find_element(page, selector).await?;
    element
        .press_key(key)
        .await
        .map_err(|e| anyhow!("Failed to press {} on {}: {}", key, selector, e))?;
    Ok(())
}

/// Submit a form: click its submit control when it has one, otherwise press Enter in it
pub async fn submit_form(page: &Page, form: &Selector) -> Result<()> {
    let form_element = find_element(page, form).await?;
    match form_element
        .find_element("button[type=submit], input[type=submit]")
        .await
    {
        Ok(button) => {
            button
                .click()
                .await
                .map_err(|e| anyhow!("Failed to click submit in {}: {}", form, e))?;
        }
        Err(_) => {
            form_element
                .click()
                .await
                .map_err(|e| anyhow!("Failed to focus form {}: {}", form, e))?;
            form_element
                .press_key("Enter")
                .await
                .map_err(|e| anyhow!("Failed to submit form {}: {}", form, e))?;
        }
    }
    Ok(())
}

/// Poll until the selector resolves or `timeout_ms` elapses
pub async fn wait_for(page: &Page, selector: &Selector, timeout_ms: u64) -> Result<()> {
    let timeout = Duration::from_millis(timeout_ms);
    let start = Instant::now();

    loop {
        if find_element(page, selector).await.is_ok() {
            return Ok(());
        }

        if start.elapsed() > timeout {
            return Err(LookupError::Timeout {
                selector: selector.to_string(),
                timeout_ms,
            }
            .into());
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Rendered text of the element
pub async fn inner_text(page: &Page, selector: &Selector) -> Result<String> {
    let element = find_element(page, selector).await?;
    let text = element
        .inner_text()
        .await
        .map_err(|e| anyhow!("Failed to read text of {}: {}", selector, e))?;
    Ok(text.unwrap_or_default())
}

/// Answer every JavaScript dialog the page opens from now on.
///
/// The returned handle stops the responder; the caller keeps at most one per page.
pub async fn answer_dialogs(page: &Page, accept: bool) -> Result<AbortHandle> {
    let mut dialogs = page
        .event_listener::<EventJavascriptDialogOpening>()
        .await
        .map_err(|e| anyhow!("Failed to listen for dialogs: {}", e))?;

    let responder = page.clone();
    let task = tokio::spawn(async move {
        while let Some(event) = dialogs.next().await {
            tracing::debug!("Dialog opened ({:?}): {}", event.r#type, event.message);
            if let Err(e) = responder.execute(HandleJavaScriptDialogParams::new(accept)).await {
                tracing::warn!("Failed to answer dialog: {}", e);
            }
        }
    });

    Ok(task.abort_handle())
}

/// Current page URL, if it has one
pub async fn current_url(page: &Page) -> Result<Option<String>> {
    page.url().await.map_err(|e| anyhow!("Failed to get URL: {}", e))
}
