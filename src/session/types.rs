// src/session/types.rs — Session records and history entries

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const SESSION_PREFIX: &str = "session:";
pub const HISTORY_PREFIX: &str = "history:";

const F_CREATED_AT: &str = "created_at";
const F_LAST_ACTIVE: &str = "last_active";
const F_CURRENT_URL: &str = "current_url";
const F_RESOURCE_ID: &str = "resource_id";

pub fn session_key(session_id: &str) -> String {
    format!("{SESSION_PREFIX}{session_id}")
}

pub fn history_key(session_id: &str) -> String {
    format!("{HISTORY_PREFIX}{session_id}")
}

/// Durable per-session metadata, stored as a field map under `session:{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub current_url: Option<String>,
    pub resource_id: String,
}

impl SessionRecord {
    pub fn new(session_id: String, resource_id: String, now: DateTime<Utc>) -> Self {
        Self {
            session_id,
            created_at: now,
            last_active: now,
            current_url: None,
            resource_id,
        }
    }

    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            (F_CREATED_AT.into(), self.created_at.to_rfc3339()),
            (F_LAST_ACTIVE.into(), self.last_active.to_rfc3339()),
            (
                F_CURRENT_URL.into(),
                self.current_url.clone().unwrap_or_default(),
            ),
            (F_RESOURCE_ID.into(), self.resource_id.clone()),
        ]
    }

    pub fn from_fields(session_id: &str, fields: &HashMap<String, String>) -> anyhow::Result<Self> {
        let created_at = parse_time(fields, F_CREATED_AT)?;
        let last_active = parse_time(fields, F_LAST_ACTIVE)?;
        let resource_id = fields
            .get(F_RESOURCE_ID)
            .filter(|v| !v.is_empty())
            .cloned()
            .with_context(|| format!("session '{session_id}' has no resource_id"))?;
        let current_url = fields
            .get(F_CURRENT_URL)
            .filter(|v| !v.is_empty())
            .cloned();

        Ok(Self {
            session_id: session_id.to_string(),
            created_at,
            last_active,
            current_url,
            resource_id,
        })
    }
}

fn parse_time(fields: &HashMap<String, String>, name: &str) -> anyhow::Result<DateTime<Utc>> {
    let raw = fields
        .get(name)
        .with_context(|| format!("missing field '{name}'"))?;
    parse_timestamp(raw).with_context(|| format!("bad timestamp in '{name}': {raw}"))
}

pub fn parse_timestamp(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

/// Partial update merged into a record. `resource_id` and `created_at`
/// are deliberately absent: they are immutable once assigned.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub current_url: Option<String>,
    pub last_active: Option<DateTime<Utc>>,
}

impl SessionUpdate {
    pub fn touch(now: DateTime<Utc>) -> Self {
        Self {
            last_active: Some(now),
            ..Default::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.current_url = Some(url.into());
        self
    }

    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = Vec::new();
        if let Some(ref url) = self.current_url {
            fields.push((F_CURRENT_URL.to_string(), url.clone()));
        }
        if let Some(at) = self.last_active {
            fields.push((F_LAST_ACTIVE.to_string(), at.to_rfc3339()));
        }
        fields
    }
}

/// What a completed task contributes to the session history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub task: String,
    pub refined_task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_answer: Option<String>,
    pub result: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// A history item stamped by the store on append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub item: HistoryItem,
    pub timestamp: DateTime<Utc>,
}
