// src/api/types.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::browser::Credentials;
use crate::infra::secret::Secret;
use crate::pipeline::{TaskInput, TaskOutcome};
use crate::session::HistoryEntry;

/// One credential substitution in list form.
#[derive(Debug, Clone, Deserialize)]
pub struct SensitiveEntry {
    pub key: String,
    pub value: Secret,
}

/// Credential substitutions, accepted as a map or as `[{key, value}]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SensitiveData {
    Map(HashMap<String, Secret>),
    List(Vec<SensitiveEntry>),
}

impl SensitiveData {
    /// Later duplicates in list form win.
    pub fn into_credentials(self) -> Credentials {
        match self {
            SensitiveData::Map(map) => map,
            SensitiveData::List(entries) => {
                entries.into_iter().map(|e| (e.key, e.value)).collect()
            }
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

/// Request body for `POST /execute-task`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskRequest {
    pub task: String,
    #[serde(default = "default_true")]
    pub include_screenshot: bool,
    /// Seconds. Zero disables the deadline.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub sensitive_data: Option<SensitiveData>,
    #[serde(default)]
    pub new_session: bool,
    #[serde(default)]
    pub external_session_id: Option<String>,
}

impl TaskRequest {
    pub fn into_input(self) -> TaskInput {
        TaskInput {
            task: self.task,
            include_screenshot: self.include_screenshot,
            timeout: (self.timeout > 0).then(|| Duration::from_secs(self.timeout)),
            credentials: self
                .sensitive_data
                .map(SensitiveData::into_credentials)
                .unwrap_or_default(),
            new_session: self.new_session,
            external_session_id: self.external_session_id.filter(|s| !s.is_empty()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_session_id: Option<String>,
}

impl From<TaskOutcome> for TaskResponse {
    fn from(outcome: TaskOutcome) -> Self {
        Self {
            status: "success".into(),
            message: outcome.message,
            screenshot: outcome.screenshot,
            session_id: outcome.session_id,
            current_url: outcome.current_url,
            external_session_id: outcome.external_session_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub current_url: Option<String>,
    pub history_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize)]
pub struct NewSessionResponse {
    pub session_id: String,
    pub message: String,
}

fn default_full_page() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ScreenshotQuery {
    #[serde(default = "default_full_page")]
    pub full_page: bool,
}

#[derive(Debug, Serialize)]
pub struct ScreenshotResponse {
    pub screenshot: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}
