// src/pipeline/screenshot.rs — Highlight-free screenshot capture

use std::time::Duration;

use crate::browser::{BrowserHandle, ExecutionRecord};
use crate::infra::errors::PilotError;

/// Strips the overlay container and per-element markers the automation
/// engine adds when element highlighting is on.
pub const REMOVE_HIGHLIGHTS_JS: &str = r#"() => {
    const container = document.getElementById('playwright-highlight-container');
    if (container) container.remove();
    document
        .querySelectorAll('[browser-user-highlight-id]')
        .forEach(el => el.removeAttribute('browser-user-highlight-id'));
    return true;
}"#;

/// Locate the active page, strip highlights, settle, then capture.
pub async fn capture_clean(
    browser: &dyn BrowserHandle,
    full_page: bool,
    settle: Duration,
) -> Result<String, PilotError> {
    browser.ensure_page().await?;
    browser.evaluate(REMOVE_HIGHLIGHTS_JS).await?;
    if !settle.is_zero() {
        tokio::time::sleep(settle).await;
    }
    browser.screenshot(full_page).await
}

/// What a screenshot request produced, and whether it had to degrade.
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub screenshot: Option<String>,
    pub degraded: bool,
}

/// Clean capture, else the last step's inline screenshot, else nothing.
pub async fn capture_or_fallback(
    browser: &dyn BrowserHandle,
    record: &ExecutionRecord,
    settle: Duration,
) -> Capture {
    match capture_clean(browser, true, settle).await {
        Ok(png) if !png.is_empty() => Capture {
            screenshot: Some(png),
            degraded: false,
        },
        outcome => {
            if let Err(e) = outcome {
                tracing::warn!(browser = browser.id(), "Clean screenshot failed: {}", e);
            }
            let fallback = record.inline_screenshot().map(String::from);
            if fallback.is_none() {
                tracing::warn!(browser = browser.id(), "No screenshot available");
            }
            Capture {
                screenshot: fallback,
                degraded: true,
            }
        }
    }
}
