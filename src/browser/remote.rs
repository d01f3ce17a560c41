// src/browser/remote.rs — HTTP client for the automation sidecar

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::{BrowserConfig, BrowserHandle, BrowserLauncher, Credentials, ExecutionRecord};
use crate::infra::config::DriverConfig;
use crate::infra::errors::PilotError;

#[derive(Deserialize)]
struct LaunchResponse {
    browser_id: String,
}

#[derive(Deserialize)]
struct EvaluateResponse {
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Deserialize)]
struct ScreenshotResponse {
    screenshot: String,
}

/// Shared HTTP plumbing for launcher and handles.
#[derive(Clone)]
struct DriverClient {
    client: reqwest::Client,
    base: String,
}

impl DriverClient {
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    /// POST JSON and decode the reply. Errors come back as plain messages;
    /// callers pick the error variant that fits their stage.
    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, String> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| format!("driver unreachable: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {status}: {error_body}"));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| format!("Failed to parse driver response: {e}"))
    }
}

/// Launches browsers on a remote automation sidecar.
pub struct RemoteLauncher {
    driver: DriverClient,
}

impl RemoteLauncher {
    pub fn new(config: &DriverConfig) -> Result<Self, PilotError> {
        let parsed = url::Url::parse(&config.endpoint)
            .map_err(|e| PilotError::Config(format!("driver.endpoint: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| PilotError::Config(format!("driver client: {e}")))?;

        Ok(Self {
            driver: DriverClient {
                client,
                base: parsed.as_str().trim_end_matches('/').to_string(),
            },
        })
    }
}

#[async_trait]
impl BrowserLauncher for RemoteLauncher {
    async fn launch(&self, config: &BrowserConfig) -> Result<Arc<dyn BrowserHandle>, PilotError> {
        let body = serde_json::json!({ "config": config });
        let resp: LaunchResponse =
            self.driver
                .post("browsers", &body)
                .await
                .map_err(|message| PilotError::ResourceInit {
                    resource_id: "(unassigned)".into(),
                    message,
                })?;

        tracing::info!(browser_id = %resp.browser_id, "Remote browser launched");
        Ok(Arc::new(RemoteBrowser {
            id: resp.browser_id,
            driver: self.driver.clone(),
        }))
    }
}

/// One browser living on the sidecar.
pub struct RemoteBrowser {
    id: String,
    driver: DriverClient,
}

impl RemoteBrowser {
    fn path(&self, action: &str) -> String {
        format!("browsers/{}/{}", self.id, action)
    }
}

#[async_trait]
impl BrowserHandle for RemoteBrowser {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(
        &self,
        task: &str,
        credentials: &Credentials,
    ) -> Result<ExecutionRecord, PilotError> {
        let body = serde_json::json!({
            "task": task,
            "sensitive_data": credentials,
        });
        self.driver
            .post(&self.path("run"), &body)
            .await
            .map_err(PilotError::Automation)
    }

    async fn ensure_page(&self) -> Result<(), PilotError> {
        self.driver
            .post::<serde_json::Value>(&self.path("page"), &serde_json::json!({}))
            .await
            .map(|_| ())
            .map_err(PilotError::Automation)
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, PilotError> {
        let resp: EvaluateResponse = self
            .driver
            .post(&self.path("evaluate"), &serde_json::json!({ "script": script }))
            .await
            .map_err(PilotError::Automation)?;
        Ok(resp.result)
    }

    async fn screenshot(&self, full_page: bool) -> Result<String, PilotError> {
        let resp: ScreenshotResponse = self
            .driver
            .post(
                &self.path("screenshot"),
                &serde_json::json!({ "full_page": full_page }),
            )
            .await
            .map_err(PilotError::Automation)?;
        Ok(resp.screenshot)
    }

    async fn close(&self) -> Result<(), PilotError> {
        let response = self
            .driver
            .client
            .delete(self.driver.url(&format!("browsers/{}", self.id)))
            .send()
            .await
            .map_err(|e| PilotError::Automation(format!("driver unreachable: {e}")))?;

        // already gone is as good as closed
        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(PilotError::Automation(format!("close failed: HTTP {status}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_endpoint() {
        let cfg = DriverConfig {
            endpoint: "not a url".into(),
            request_timeout_secs: 5,
        };
        assert!(matches!(
            RemoteLauncher::new(&cfg),
            Err(PilotError::Config(_))
        ));
    }

    #[test]
    fn test_url_joining_strips_slashes() {
        let launcher = RemoteLauncher::new(&DriverConfig {
            endpoint: "http://driver:9333/".into(),
            request_timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(
            launcher.driver.url("/browsers"),
            "http://driver:9333/browsers"
        );
    }
}
