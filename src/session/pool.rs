// src/session/pool.rs — Process-local pool of live browsers
//
// Each resource id owns a slot with a one-shot creation cell. Concurrent
// acquisitions for the same id await the same cell, so at most one browser
// is ever launched per id. A failed launch leaves the cell empty and the
// next acquisition retries.

use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;

use crate::browser::{BrowserConfig, BrowserHandle, BrowserLauncher};
use crate::infra::errors::PilotError;

#[derive(Default)]
struct Slot {
    browser: OnceCell<Arc<dyn BrowserHandle>>,
    leases: AtomicUsize,
}

/// Borrowed access to a pooled browser. While any lease is alive the
/// reclamation pass will not release the browser.
pub struct Lease {
    browser: Arc<dyn BrowserHandle>,
    slot: Arc<Slot>,
}

impl Deref for Lease {
    type Target = dyn BrowserHandle;

    fn deref(&self) -> &Self::Target {
        self.browser.as_ref()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.slot.leases.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Decrements the lease count if acquisition fails before a `Lease` exists.
struct PendingLease {
    slot: Arc<Slot>,
    armed: bool,
}

impl PendingLease {
    fn into_lease(mut self, browser: Arc<dyn BrowserHandle>) -> Lease {
        self.armed = false;
        Lease {
            browser,
            slot: self.slot.clone(),
        }
    }
}

impl Drop for PendingLease {
    fn drop(&mut self) {
        if self.armed {
            self.slot.leases.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

pub struct ResourcePool {
    launcher: Arc<dyn BrowserLauncher>,
    slots: Mutex<HashMap<String, Arc<Slot>>>,
}

impl ResourcePool {
    pub fn new(launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            launcher,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Slot>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the live browser for `resource_id`, launching it on first use.
    /// The configuration is always launched with keep-alive forced on.
    pub async fn acquire(
        &self,
        resource_id: &str,
        config: &BrowserConfig,
    ) -> Result<Lease, PilotError> {
        // Register the lease under the map lock so a concurrent release
        // cannot remove the slot between lookup and use.
        let pending = {
            let mut slots = self.lock();
            let slot = slots.entry(resource_id.to_string()).or_default().clone();
            slot.leases.fetch_add(1, Ordering::AcqRel);
            PendingLease { slot, armed: true }
        };
        let slot = pending.slot.clone();

        let browser = slot
            .browser
            .get_or_try_init(|| async {
                let mut config = config.clone();
                config.keep_alive = true;
                tracing::info!(resource_id, "Launching browser");
                self.launcher
                    .launch(&config)
                    .await
                    .map_err(|e| match e {
                        PilotError::ResourceInit { message, .. } => PilotError::ResourceInit {
                            resource_id: resource_id.to_string(),
                            message,
                        },
                        other => PilotError::ResourceInit {
                            resource_id: resource_id.to_string(),
                            message: other.to_string(),
                        },
                    })
            })
            .await?
            .clone();

        Ok(pending.into_lease(browser))
    }

    /// Lease the browser only if it is already running.
    pub fn get(&self, resource_id: &str) -> Option<Lease> {
        let slots = self.lock();
        let slot = slots.get(resource_id)?;
        let browser = slot.browser.get()?.clone();
        slot.leases.fetch_add(1, Ordering::AcqRel);
        Some(Lease {
            browser,
            slot: slot.clone(),
        })
    }

    pub fn contains(&self, resource_id: &str) -> bool {
        self.lock()
            .get(resource_id)
            .is_some_and(|s| s.browser.initialized())
    }

    pub fn is_leased(&self, resource_id: &str) -> bool {
        self.lock()
            .get(resource_id)
            .is_some_and(|s| s.leases.load(Ordering::Acquire) > 0)
    }

    /// Number of live browsers.
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|s| s.browser.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and close the browser for `resource_id` unless it is leased.
    /// Returns true when a live browser was closed.
    pub async fn release(&self, resource_id: &str) -> bool {
        let slot = {
            let mut slots = self.lock();
            match slots.get(resource_id) {
                Some(s) if s.leases.load(Ordering::Acquire) == 0 => slots.remove(resource_id),
                _ => None,
            }
        };
        match slot.and_then(|s| s.browser.get().cloned()) {
            Some(browser) => {
                close_browser(resource_id, browser).await;
                true
            }
            None => false,
        }
    }

    /// Release every idle browser whose id is not in `keep`. Catches
    /// browsers whose session record expired out of the store on its own.
    pub async fn release_unreferenced(&self, keep: &HashSet<String>) -> Vec<String> {
        let orphans: Vec<String> = self
            .lock()
            .keys()
            .filter(|id| !keep.contains(*id))
            .cloned()
            .collect();

        let mut released = Vec::new();
        for id in orphans {
            if self.release(&id).await {
                released.push(id);
            }
        }
        released
    }

    /// Close every browser regardless of leases. Called once on shutdown.
    pub async fn shutdown(&self) {
        let drained: Vec<(String, Arc<Slot>)> = self.lock().drain().collect();
        let closes = drained.into_iter().filter_map(|(id, slot)| {
            slot.browser
                .get()
                .cloned()
                .map(|browser| close_browser_owned(id, browser))
        });
        futures::future::join_all(closes).await;
    }
}

async fn close_browser(resource_id: &str, browser: Arc<dyn BrowserHandle>) {
    match browser.close().await {
        Ok(()) => tracing::info!(resource_id, "Browser released"),
        Err(e) => tracing::warn!(resource_id, "Browser close failed: {}", e),
    }
}

async fn close_browser_owned(resource_id: String, browser: Arc<dyn BrowserHandle>) {
    close_browser(&resource_id, browser).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{Credentials, ExecutionRecord};
    use crate::infra::config::BrowserSettings;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    struct StubBrowser {
        id: String,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl BrowserHandle for StubBrowser {
        fn id(&self) -> &str {
            &self.id
        }
        async fn run(&self, _: &str, _: &Credentials) -> Result<ExecutionRecord, PilotError> {
            Ok(ExecutionRecord::default())
        }
        async fn ensure_page(&self) -> Result<(), PilotError> {
            Ok(())
        }
        async fn evaluate(&self, _: &str) -> Result<serde_json::Value, PilotError> {
            Ok(serde_json::Value::Null)
        }
        async fn screenshot(&self, _: bool) -> Result<String, PilotError> {
            Ok("png".into())
        }
        async fn close(&self) -> Result<(), PilotError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingLauncher {
        launches: AtomicUsize,
        fail_first: AtomicBool,
        keep_alive_seen: AtomicBool,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl BrowserLauncher for CountingLauncher {
        async fn launch(
            &self,
            config: &BrowserConfig,
        ) -> Result<Arc<dyn BrowserHandle>, PilotError> {
            // widen the race window between concurrent callers
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail_first.swap(false, Ordering::SeqCst) {
                return Err(PilotError::ResourceInit {
                    resource_id: String::new(),
                    message: "chromium missing".into(),
                });
            }
            self.keep_alive_seen.store(config.keep_alive, Ordering::SeqCst);
            let n = self.launches.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(StubBrowser {
                id: format!("b-{n}"),
                closed: self.closed.clone(),
            }))
        }
    }

    fn config_without_keep_alive() -> BrowserConfig {
        let mut cfg = BrowserConfig::hardened(&BrowserSettings::default());
        cfg.keep_alive = false;
        cfg
    }

    #[tokio::test]
    async fn test_concurrent_acquire_launches_once() {
        let launcher = Arc::new(CountingLauncher::default());
        let pool = Arc::new(ResourcePool::new(launcher.clone()));
        let cfg = config_without_keep_alive();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                let cfg = cfg.clone();
                tokio::spawn(async move { pool.acquire("r-1", &cfg).await.map(|l| l.id().to_string()) })
            })
            .collect();

        let ids: Vec<String> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
        assert!(ids.iter().all(|id| id == "b-0"));
        assert!(launcher.keep_alive_seen.load(Ordering::SeqCst));
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_launch_is_retried() {
        let launcher = Arc::new(CountingLauncher::default());
        launcher.fail_first.store(true, Ordering::SeqCst);
        let pool = ResourcePool::new(launcher.clone());
        let cfg = config_without_keep_alive();

        let err = pool.acquire("r-1", &cfg).await.err().unwrap();
        match err {
            PilotError::ResourceInit { resource_id, .. } => assert_eq!(resource_id, "r-1"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!pool.contains("r-1"));
        assert!(!pool.is_leased("r-1"));

        let lease = pool.acquire("r-1", &cfg).await.unwrap();
        assert_eq!(lease.id(), "b-0");
    }

    #[tokio::test]
    async fn test_release_skips_leased_browser() {
        let launcher = Arc::new(CountingLauncher::default());
        let pool = ResourcePool::new(launcher.clone());
        let lease = pool
            .acquire("r-1", &config_without_keep_alive())
            .await
            .unwrap();

        assert!(pool.is_leased("r-1"));
        assert!(!pool.release("r-1").await);
        assert!(pool.contains("r-1"));

        drop(lease);
        assert!(pool.release("r-1").await);
        assert!(!pool.contains("r-1"));
        assert!(launcher.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_get_only_returns_live_browsers() {
        let pool = ResourcePool::new(Arc::new(CountingLauncher::default()));
        assert!(pool.get("r-1").is_none());
        drop(pool.acquire("r-1", &config_without_keep_alive()).await.unwrap());
        assert!(pool.get("r-1").is_some());
    }

    #[tokio::test]
    async fn test_release_unreferenced() {
        let pool = ResourcePool::new(Arc::new(CountingLauncher::default()));
        let cfg = config_without_keep_alive();
        drop(pool.acquire("keep", &cfg).await.unwrap());
        drop(pool.acquire("orphan", &cfg).await.unwrap());

        let keep: HashSet<String> = ["keep".to_string()].into_iter().collect();
        let released = pool.release_unreferenced(&keep).await;
        assert_eq!(released, vec!["orphan".to_string()]);
        assert!(pool.contains("keep"));
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything() {
        let launcher = Arc::new(CountingLauncher::default());
        let pool = ResourcePool::new(launcher.clone());
        let _held = pool
            .acquire("r-1", &config_without_keep_alive())
            .await
            .unwrap();
        pool.shutdown().await;
        assert!(pool.is_empty());
        assert!(launcher.closed.load(Ordering::SeqCst));
    }
}
