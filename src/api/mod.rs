// src/api/mod.rs — HTTP surface for task execution and session inspection

pub mod handlers;
pub mod types;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::infra::config::ServerConfig;
use crate::pipeline::TaskPipeline;
use crate::session::SessionManager;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<TaskPipeline>,
    pub sessions: Arc<SessionManager>,
}

impl ApiState {
    pub fn new(pipeline: Arc<TaskPipeline>) -> Self {
        let sessions = Arc::clone(pipeline.sessions());
        Self { pipeline, sessions }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", o);
                None
            }
        })
        .collect();

    let allow_origin = if allowed.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(allowed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the axum router with all API routes.
pub fn build_router(state: ApiState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/execute-task", post(handlers::execute_task))
        .route("/session/info", get(handlers::session_info))
        .route("/session/history", get(handlers::session_history))
        .route("/session/new", post(handlers::new_session))
        .route(
            "/session/{id}/clean-screenshot",
            get(handlers::clean_screenshot),
        )
        .route("/health", get(handlers::health))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

/// Serve until `shutdown` is cancelled.
pub async fn start_server(
    config: &ServerConfig,
    state: ApiState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let router = build_router(state, &config.cors_origins);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("API server listening on http://{addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
