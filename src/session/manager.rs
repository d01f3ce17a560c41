// src/session/manager.rs — Session affinity: store records + pooled browsers

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::pool::{Lease, ResourcePool};
use super::store::SessionStore;
use super::types::*;
use crate::browser::BrowserConfig;
use crate::infra::errors::PilotError;

/// Outcome of one reclamation pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReclaimReport {
    /// Sessions whose records were deleted.
    pub reclaimed: Vec<String>,
    /// Idle sessions left alone because a request still holds their browser.
    pub skipped_in_use: Vec<String>,
    /// Browsers released because no live record referenced them.
    pub orphans_released: Vec<String>,
}

/// Binds public session ids to durable records and, lazily, to pooled
/// browsers. One instance per process, built at startup and torn down with
/// [`SessionManager::shutdown`].
///
/// `update` on an unknown id fails with `NotFound` instead of writing a
/// partial record.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    pool: ResourcePool,
    idle_timeout: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, pool: ResourcePool, idle_timeout: Duration) -> Self {
        Self {
            store,
            pool,
            idle_timeout,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    /// Return the presented id if it names a live session (refreshing it),
    /// otherwise mint a new session. Absence is never an error.
    pub async fn resolve(&self, presented: Option<&str>) -> Result<String, PilotError> {
        if let Some(id) = presented.map(str::trim).filter(|s| !s.is_empty()) {
            let touched = self
                .store
                .hset_existing(
                    &session_key(id),
                    &SessionUpdate::touch(Utc::now()).to_fields(),
                    self.idle_timeout,
                )
                .await
                .map_err(PilotError::store)?;
            if touched {
                tracing::debug!(session_id = id, "Session resumed");
                return Ok(id.to_string());
            }
            tracing::info!(session_id = id, "Presented session unknown or expired; creating new");
        }
        self.create().await
    }

    /// Unconditionally mint a new session with a fresh resource id.
    pub async fn create(&self) -> Result<String, PilotError> {
        let session_id = Uuid::new_v4().to_string();
        let record = SessionRecord::new(session_id.clone(), Uuid::new_v4().to_string(), Utc::now());
        let key = session_key(&session_id);

        self.store
            .hset(&key, &record.to_fields())
            .await
            .map_err(PilotError::store)?;
        self.store
            .expire(&key, self.idle_timeout)
            .await
            .map_err(PilotError::store)?;

        tracing::info!(session_id = %session_id, resource_id = %record.resource_id, "Session created");
        Ok(session_id)
    }

    /// Strict lookup for callers that already hold a concrete id.
    pub async fn get_data(&self, session_id: &str) -> Result<SessionRecord, PilotError> {
        let fields = self
            .store
            .hgetall(&session_key(session_id))
            .await
            .map_err(PilotError::store)?;
        if fields.is_empty() {
            return Err(PilotError::NotFound(session_id.to_string()));
        }
        SessionRecord::from_fields(session_id, &fields).map_err(PilotError::store)
    }

    /// Merge fields into an existing record and refresh its expiry.
    pub async fn update(&self, session_id: &str, update: &SessionUpdate) -> Result<(), PilotError> {
        let updated = self
            .store
            .hset_existing(&session_key(session_id), &update.to_fields(), self.idle_timeout)
            .await
            .map_err(PilotError::store)?;
        if !updated {
            return Err(PilotError::NotFound(session_id.to_string()));
        }
        Ok(())
    }

    /// Append a history entry stamped with the current time.
    pub async fn append_history(
        &self,
        session_id: &str,
        item: HistoryItem,
    ) -> Result<HistoryEntry, PilotError> {
        let entry = HistoryEntry {
            item,
            timestamp: Utc::now(),
        };
        let key = history_key(session_id);
        let json = serde_json::to_string(&entry).map_err(|e| PilotError::Other(e.into()))?;

        self.store
            .rpush(&key, json)
            .await
            .map_err(PilotError::store)?;
        self.store
            .expire(&key, self.idle_timeout)
            .await
            .map_err(PilotError::store)?;
        Ok(entry)
    }

    /// Append in the background. Failures are logged and never reach the
    /// caller, so this is safe to call after the response is built.
    pub fn spawn_append_history(
        self: &Arc<Self>,
        session_id: String,
        item: HistoryItem,
    ) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = manager.append_history(&session_id, item).await {
                tracing::error!(session_id = %session_id, "History append failed: {}", e);
            }
        })
    }

    /// Chronological history; with `limit > 0` only the newest `limit` entries.
    pub async fn get_history(
        &self,
        session_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryEntry>, PilotError> {
        let (start, stop) = match limit {
            Some(n) if n > 0 => (-(n as i64), -1),
            _ => (0, -1),
        };
        let raw = self
            .store
            .lrange(&history_key(session_id), start, stop)
            .await
            .map_err(PilotError::store)?;

        Ok(raw
            .iter()
            .filter_map(|item| match serde_json::from_str::<HistoryEntry>(item) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(session_id, "Skipping unreadable history entry: {}", e);
                    None
                }
            })
            .collect())
    }

    pub async fn history_count(&self, session_id: &str) -> Result<usize, PilotError> {
        self.store
            .llen(&history_key(session_id))
            .await
            .map_err(PilotError::store)
    }

    /// Lease the session's browser, launching it on first use.
    pub async fn acquire_resource(
        &self,
        session_id: &str,
        config: &BrowserConfig,
    ) -> Result<Lease, PilotError> {
        let record = self.get_data(session_id).await?;
        self.pool.acquire(&record.resource_id, config).await
    }

    /// Lease the session's browser only if one is already running.
    pub async fn live_resource(&self, session_id: &str) -> Result<Lease, PilotError> {
        let record = self.get_data(session_id).await?;
        self.pool
            .get(&record.resource_id)
            .ok_or_else(|| PilotError::ResourceNotFound(session_id.to_string()))
    }

    /// Release browsers and delete records of sessions idle longer than the
    /// timeout, measured from the start of the scan.
    pub async fn reclaim_idle(&self) -> Result<ReclaimReport, PilotError> {
        let scan_start = Utc::now();
        let idle = chrono::Duration::from_std(self.idle_timeout)
            .unwrap_or_else(|_| chrono::Duration::MAX);

        let purged = self
            .store
            .purge_expired()
            .await
            .map_err(PilotError::store)?;
        if purged > 0 {
            tracing::debug!("Purged {} expired store keys", purged);
        }

        let keys = self
            .store
            .keys(SESSION_PREFIX)
            .await
            .map_err(PilotError::store)?;

        let mut report = ReclaimReport::default();
        let mut live_resources = HashSet::new();

        for key in keys {
            let Some(session_id) = key.strip_prefix(SESSION_PREFIX) else {
                continue;
            };
            let resource_id = self
                .store
                .hget(&key, "resource_id")
                .await
                .map_err(PilotError::store)?;
            let last_active = self
                .store
                .hget(&key, "last_active")
                .await
                .map_err(PilotError::store)?
                .and_then(|raw| parse_timestamp(&raw).ok());

            let Some(last_active) = last_active else {
                live_resources.extend(resource_id);
                continue;
            };
            if scan_start - last_active <= idle {
                live_resources.extend(resource_id);
                continue;
            }

            if self.touched_since(&key, last_active).await? {
                live_resources.extend(resource_id);
                continue;
            }

            if let Some(ref rid) = resource_id {
                if !self.pool.release(rid).await && self.pool.contains(rid) {
                    tracing::debug!(session_id, "Idle session still in use; skipping");
                    live_resources.insert(rid.clone());
                    report.skipped_in_use.push(session_id.to_string());
                    continue;
                }
            }

            // The browser is gone either way; a session touched while it
            // closed keeps its record and relaunches on next use.
            if self.touched_since(&key, last_active).await? {
                tracing::debug!(session_id, "Session resumed during reclamation; keeping");
                continue;
            }

            self.store
                .delete(&[key.clone(), history_key(session_id)])
                .await
                .map_err(PilotError::store)?;
            tracing::info!(session_id, "Idle session reclaimed");
            report.reclaimed.push(session_id.to_string());
        }

        report.orphans_released = self.pool.release_unreferenced(&live_resources).await;
        for rid in &report.orphans_released {
            tracing::info!(resource_id = %rid, "Released browser of expired session");
        }
        Ok(report)
    }

    /// Whether the record's `last_active` moved past `seen`.
    async fn touched_since(
        &self,
        key: &str,
        seen: chrono::DateTime<Utc>,
    ) -> Result<bool, PilotError> {
        let current = self
            .store
            .hget(key, "last_active")
            .await
            .map_err(PilotError::store)?
            .and_then(|raw| parse_timestamp(&raw).ok());
        Ok(current.is_some_and(|at| at > seen))
    }

    /// Close every pooled browser. Store records are left to expire.
    pub async fn shutdown(&self) {
        let live = self.pool.len();
        self.pool.shutdown().await;
        tracing::info!("Session manager shut down ({} browsers closed)", live);
    }
}
