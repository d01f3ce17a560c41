// src/cli/serve.rs — Service wiring, startup, and graceful shutdown

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::ServeArgs;
use crate::api::{self, ApiState};
use crate::browser::remote::RemoteLauncher;
use crate::browser::BrowserConfig;
use crate::infra::config::{Config, StoreBackend};
use crate::pipeline::{TaskPipeline, TaskRefiner};
use crate::provider;
use crate::reasoning::{ChatMessagesClient, ReasoningService};
use crate::session::store::{spawn_store_server, MemoryStore, SessionStore, SqliteKv};
use crate::session::{spawn_reaper, ResourcePool, SessionManager};

/// Open the configured store. The join handle is present for the SQLite
/// actor and completes once every store handle has been dropped.
fn open_store(
    config: &Config,
) -> anyhow::Result<(Arc<dyn SessionStore>, Option<tokio::task::JoinHandle<()>>)> {
    match config.session.store {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory session store; sessions will not survive restart");
            Ok((Arc::new(MemoryStore::new()), None))
        }
        StoreBackend::Sqlite => {
            let path = config.session.resolved_db_path();
            let kv = SqliteKv::open(&path)?;
            let (handle, join) = spawn_store_server(kv);
            tracing::info!("Session store: {}", path.display());
            Ok((Arc::new(handle), Some(join)))
        }
    }
}

fn build_pipeline(config: &Config, sessions: Arc<SessionManager>) -> anyhow::Result<TaskPipeline> {
    let resolved = provider::resolve_refiner(&config.models)?;
    if resolved.is_none() {
        tracing::warn!("No GEMINI_API_KEY/GOOGLE_API_KEY set; tasks will not be refined");
    }
    let refiner = TaskRefiner::from_resolved(resolved)
        .with_sampling(config.models.max_tokens, config.models.temperature);

    let mut pipeline = TaskPipeline::new(
        sessions,
        refiner,
        BrowserConfig::hardened(&config.browser),
    )
    .with_screenshot_settle(Duration::from_millis(config.browser.screenshot_settle_ms));

    if let Some(ref reasoning) = config.reasoning {
        let client: Arc<dyn ReasoningService> = Arc::new(ChatMessagesClient::from_config(reasoning)?);
        tracing::info!("External reasoning enabled: {}", reasoning.endpoint);
        pipeline = pipeline.with_reasoning(client);
    }
    Ok(pipeline)
}

/// Run the service until Ctrl+C.
pub async fn run_serve(mut config: Config, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let (store, store_join) = open_store(&config)?;
    let launcher = Arc::new(RemoteLauncher::new(&config.driver)?);
    let sessions = Arc::new(SessionManager::new(
        store,
        ResourcePool::new(launcher),
        config.session.idle_timeout(),
    ));
    let pipeline = Arc::new(build_pipeline(&config, Arc::clone(&sessions))?);

    let reaper = spawn_reaper(Arc::clone(&sessions), config.session.reclaim_interval());

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
        }
        signal.cancel();
    });

    let served = api::start_server(&config.server, ApiState::new(pipeline), shutdown.clone()).await;
    shutdown.cancel();

    reaper.stop().await;
    sessions.shutdown().await;
    drop(sessions);
    if let Some(join) = store_join {
        // Handles may still be held by detached history appends.
        if tokio::time::timeout(Duration::from_secs(5), join).await.is_err() {
            tracing::warn!("Session store did not close within 5s");
        }
    }

    served
}
