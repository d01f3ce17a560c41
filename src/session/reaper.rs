// src/session/reaper.rs — Periodic idle-session reclamation

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::manager::SessionManager;

/// Handle to the background reclamation task. Dropping it does not stop the
/// task; call [`ReaperHandle::stop`] during shutdown.
pub struct ReaperHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl ReaperHandle {
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.join.await {
            tracing::warn!("Reclamation task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Run `reclaim_idle` every `interval` until stopped.
pub fn spawn_reaper(manager: Arc<SessionManager>, interval: Duration) -> ReaperHandle {
    let token = CancellationToken::new();
    let child = token.clone();

    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Consume the immediate first tick
        ticker.tick().await;

        tracing::info!("Session reclamation every {:?}", interval);
        loop {
            tokio::select! {
                _ = child.cancelled() => break,
                _ = ticker.tick() => {
                    match manager.reclaim_idle().await {
                        Ok(report) => {
                            if !report.reclaimed.is_empty() || !report.orphans_released.is_empty() {
                                tracing::info!(
                                    "Reclaimed {} idle sessions, released {} orphaned browsers",
                                    report.reclaimed.len(),
                                    report.orphans_released.len()
                                );
                            }
                        }
                        Err(e) => tracing::error!("Session reclamation failed: {}", e),
                    }
                }
            }
        }
        tracing::info!("Session reclamation stopped");
    });

    ReaperHandle { token, join }
}
