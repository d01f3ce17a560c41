// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::infra::errors::PilotError;
use crate::infra::paths;

/// Longest idle window a session may be configured with (30 days).
pub const MAX_IDLE_TIMEOUT_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub browser: BrowserSettings,

    #[serde(default)]
    pub driver: DriverConfig,

    #[serde(default)]
    pub models: ModelsConfig,

    /// External reasoning service (optional section in config.toml).
    #[serde(default)]
    pub reasoning: Option<ReasoningConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins. Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub idle_timeout_secs: u64,
    pub reclaim_interval_secs: u64,
    pub store: StoreBackend,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 1800,
            reclaim_interval_secs: 300,
            store: StoreBackend::Sqlite,
            db_path: None,
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_secs.max(1))
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(paths::db_path)
    }

    pub fn validate(&self) -> Result<(), PilotError> {
        if !(1..=MAX_IDLE_TIMEOUT_SECS).contains(&self.idle_timeout_secs) {
            return Err(PilotError::Config(format!(
                "session.idle_timeout_secs must be between 1 and {MAX_IDLE_TIMEOUT_SECS}, got {}",
                self.idle_timeout_secs
            )));
        }
        Ok(())
    }
}

/// Hardened launch settings applied to every pooled browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub disable_security: bool,
    pub extra_args: Vec<String>,
    pub window_width: u32,
    pub window_height: u32,
    pub locale: String,
    pub user_agent: String,
    pub highlight_elements: bool,
    pub viewport_expansion: i64,
    pub minimum_wait_page_load_secs: f64,
    pub wait_for_network_idle_secs: f64,
    pub maximum_wait_page_load_secs: f64,
    pub wait_between_actions_secs: f64,
    pub screenshot_settle_ms: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            disable_security: true,
            extra_args: [
                "--disable-blink-features=AutomationControlled",
                "--disable-features=IsolateOrigins",
                "--disable-site-isolation-trials",
                "--disable-web-security",
                "--no-sandbox",
                "--disable-infobars",
                "--disable-dev-shm-usage",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            window_width: 1920,
            window_height: 1080,
            locale: "en-US".into(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
                .into(),
            highlight_elements: true,
            viewport_expansion: 800,
            minimum_wait_page_load_secs: 1.0,
            wait_for_network_idle_secs: 3.0,
            maximum_wait_page_load_secs: 8.0,
            wait_between_actions_secs: 1.0,
            screenshot_settle_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Base URL of the automation sidecar.
    pub endpoint: String,
    pub request_timeout_secs: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9333".into(),
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Refinement model in "provider/model" form.
    pub refiner: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            refiner: "google/gemini-2.0-flash-exp".into(),
            max_tokens: None,
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    pub endpoint: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_reasoning_key_env")]
    pub api_key_env: String,
    /// Caller identity reported to the service.
    #[serde(default = "default_reasoning_user")]
    pub user: String,
}

fn default_reasoning_key_env() -> String {
    "REASONING_API_KEY".into()
}

fn default_reasoning_user() -> String {
    "browserpilot".into()
}

impl Config {
    /// Load config from the default location, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PilotError> {
        self.session.validate()
    }
}
