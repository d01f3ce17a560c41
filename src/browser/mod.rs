// src/browser/mod.rs — Automation engine boundary
//
// The engine that actually drives a browser is an external collaborator.
// This module owns the launch configuration, the handle/launcher traits the
// pool and pipeline program against, and the typed execution record.

pub mod record;
pub mod remote;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::infra::config::BrowserSettings;
use crate::infra::errors::PilotError;
use crate::infra::secret::Secret;

pub use record::{ExecutionRecord, StepRecord};

/// Placeholder name → secret value, referenced by name inside task text.
pub type Credentials = HashMap<String, Secret>;

/// Per-context settings: page-load waits, identity, and highlighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    pub minimum_wait_page_load_time: f64,
    pub wait_for_network_idle_page_load_time: f64,
    pub maximum_wait_page_load_time: f64,
    pub window_width: u32,
    pub window_height: u32,
    pub locale: String,
    pub user_agent: String,
    pub highlight_elements: bool,
    pub viewport_expansion: i64,
    pub wait_between_actions: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserConfig {
    pub headless: bool,
    pub disable_security: bool,
    pub extra_args: Vec<String>,
    /// Keep the browser running after a task finishes.
    pub keep_alive: bool,
    pub context: ContextConfig,
}

impl BrowserConfig {
    /// The hardened configuration every pooled browser is launched with.
    pub fn hardened(settings: &BrowserSettings) -> Self {
        Self {
            headless: settings.headless,
            disable_security: settings.disable_security,
            extra_args: settings.extra_args.clone(),
            keep_alive: true,
            context: ContextConfig {
                minimum_wait_page_load_time: settings.minimum_wait_page_load_secs,
                wait_for_network_idle_page_load_time: settings.wait_for_network_idle_secs,
                maximum_wait_page_load_time: settings.maximum_wait_page_load_secs,
                window_width: settings.window_width,
                window_height: settings.window_height,
                locale: settings.locale.clone(),
                user_agent: settings.user_agent.clone(),
                highlight_elements: settings.highlight_elements,
                viewport_expansion: settings.viewport_expansion,
                wait_between_actions: settings.wait_between_actions_secs,
            },
        }
    }
}

/// A live browser kept alive across requests.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    fn id(&self) -> &str;

    /// Run a natural-language task to completion.
    async fn run(&self, task: &str, credentials: &Credentials)
        -> Result<ExecutionRecord, PilotError>;

    /// Locate the active page, opening one if the browser has none.
    async fn ensure_page(&self) -> Result<(), PilotError>;

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, PilotError>;

    /// Base64 PNG of the active page.
    async fn screenshot(&self, full_page: bool) -> Result<String, PilotError>;

    async fn close(&self) -> Result<(), PilotError>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, config: &BrowserConfig) -> Result<Arc<dyn BrowserHandle>, PilotError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardened_forces_keep_alive() {
        let cfg = BrowserConfig::hardened(&BrowserSettings::default());
        assert!(cfg.keep_alive);
        assert!(cfg.headless);
        assert_eq!(cfg.context.locale, "en-US");
        assert!((cfg.context.wait_for_network_idle_page_load_time - 3.0).abs() < 0.001);
    }
}
