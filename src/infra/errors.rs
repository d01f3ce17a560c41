// src/infra/errors.rs — Error types for browserpilot

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PilotError {
    // Lookup errors
    #[error("Session '{0}' not found")]
    NotFound(String),

    #[error("No live browser bound to session '{0}'")]
    ResourceNotFound(String),

    // Infra (not retried by this layer)
    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Browser resource '{resource_id}' failed to start: {message}")]
    ResourceInit {
        resource_id: String,
        message: String,
    },

    // Upstream collaborators
    #[error("External reasoning service returned no usable answer: {0}")]
    UpstreamReasoning(String),

    #[error("Automation run failed: {0}")]
    Automation(String),

    #[error("Provider '{provider}' error: {message}")]
    Provider {
        provider: String,
        message: String,
        retriable: bool,
    },

    // User errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PilotError {
    /// Wrap a storage-layer failure.
    pub fn store(err: impl std::fmt::Display) -> Self {
        PilotError::StoreUnavailable(err.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PilotError::NotFound(_) | PilotError::ResourceNotFound(_)
        )
    }

    /// HTTP status the API layer reports for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            PilotError::NotFound(_) | PilotError::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            PilotError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            PilotError::Provider {
                retriable: true,
                ..
            } | PilotError::StoreUnavailable(_)
                | PilotError::ResourceInit { .. }
        )
    }
}
