// src/reasoning/chat.rs — Chat-messages style knowledge service client

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{ReasoningAnswer, ReasoningService};
use crate::infra::config::ReasoningConfig;
use crate::infra::errors::PilotError;

#[derive(Deserialize)]
struct ChatMessageReply {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    conversation_id: Option<String>,
}

/// Talks to a service exposing `POST /chat-messages` in blocking mode.
pub struct ChatMessagesClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    user: String,
}

impl ChatMessagesClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, user: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            user: user.into(),
        }
    }

    /// Build from config, reading the key from the configured env var.
    pub fn from_config(config: &ReasoningConfig) -> Result<Self, PilotError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            PilotError::Config(format!(
                "reasoning service enabled but ${} is not set",
                config.api_key_env
            ))
        })?;
        Ok(Self::new(&config.endpoint, api_key, &config.user))
    }

    fn request_body(&self, question: &str, conversation_id: Option<&str>) -> serde_json::Value {
        serde_json::json!({
            "inputs": {},
            "query": question,
            "response_mode": "blocking",
            "conversation_id": conversation_id.unwrap_or(""),
            "user": self.user,
        })
    }
}

/// An answer is usable only if both parts are present and non-blank.
fn into_answer(reply: ChatMessageReply) -> Result<ReasoningAnswer, PilotError> {
    let answer = reply
        .answer
        .filter(|a| !a.trim().is_empty())
        .ok_or_else(|| PilotError::UpstreamReasoning("reply carried no answer".into()))?;
    let conversation_id = reply
        .conversation_id
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| PilotError::UpstreamReasoning("reply carried no conversation id".into()))?;
    Ok(ReasoningAnswer {
        answer,
        conversation_id,
    })
}

#[async_trait]
impl ReasoningService for ChatMessagesClient {
    async fn ask(
        &self,
        question: &str,
        conversation_id: Option<&str>,
    ) -> Result<ReasoningAnswer, PilotError> {
        let response = self
            .client
            .post(format!("{}/chat-messages", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(question, conversation_id))
            .send()
            .await
            .map_err(|e| PilotError::UpstreamReasoning(format!("service unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(PilotError::UpstreamReasoning(format!(
                "HTTP {status}: {error_body}"
            )));
        }

        let reply: ChatMessageReply = response
            .json()
            .await
            .map_err(|e| PilotError::UpstreamReasoning(format!("Failed to parse reply: {e}")))?;
        into_answer(reply)
    }
}
