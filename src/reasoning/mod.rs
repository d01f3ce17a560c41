// src/reasoning/mod.rs — External knowledge/chat service boundary

pub mod chat;

use async_trait::async_trait;

use crate::infra::errors::PilotError;

pub use chat::ChatMessagesClient;

#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningAnswer {
    pub answer: String,
    /// The service-side conversation the answer belongs to.
    pub conversation_id: String,
}

#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Ask a question, optionally inside an existing conversation.
    async fn ask(
        &self,
        question: &str,
        conversation_id: Option<&str>,
    ) -> Result<ReasoningAnswer, PilotError>;
}
