// src/provider/google.rs — Google Generative AI (Gemini) provider

use async_trait::async_trait;
use std::time::Duration;

use super::{ChatRequest, ChatResponse, ModelProvider, Role, StopReason, TokenUsage};
use crate::infra::errors::PilotError;

pub struct GoogleProvider {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

impl GoogleProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: http_client(REQUEST_TIMEOUT),
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
        }
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    /// Read `GEMINI_API_KEY`, then `GOOGLE_API_KEY`.
    pub fn from_env() -> Option<Self> {
        ["GEMINI_API_KEY", "GOOGLE_API_KEY"]
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|v| !v.trim().is_empty())
            .map(Self::new)
    }

    /// Point at a different API root (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build the Gemini request body from a ChatRequest.
    fn build_request_body(&self, request: &ChatRequest) -> serde_json::Value {
        let contents: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter_map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                    Role::System => return None, // system handled via system_instruction
                };
                Some(serde_json::json!({
                    "role": role,
                    "parts": [{ "text": m.content }],
                }))
            })
            .collect();

        let mut body = serde_json::json!({
            "contents": contents,
        });

        if let Some(ref system) = request.system {
            body["system_instruction"] = serde_json::json!({
                "parts": [{ "text": system }],
            });
        }

        let mut gen_config = serde_json::json!({});
        if let Some(max_tokens) = request.max_tokens {
            gen_config["maxOutputTokens"] = serde_json::json!(max_tokens);
        }
        if let Some(temp) = request.temperature {
            gen_config["temperature"] = serde_json::json!(temp);
        }
        if gen_config != serde_json::json!({}) {
            body["generationConfig"] = gen_config;
        }

        body
    }
}

/// Pull the text, usage, and stop reason out of a generateContent reply.
fn parse_response(resp: &serde_json::Value) -> ChatResponse {
    let content = resp["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default();

    let usage = TokenUsage {
        input_tokens: resp["usageMetadata"]["promptTokenCount"]
            .as_u64()
            .unwrap_or(0) as u32,
        output_tokens: resp["usageMetadata"]["candidatesTokenCount"]
            .as_u64()
            .unwrap_or(0) as u32,
    };

    let stop_reason = match resp["candidates"][0]["finishReason"].as_str() {
        Some("STOP") => StopReason::EndTurn,
        Some("MAX_TOKENS") => StopReason::MaxTokens,
        Some("SAFETY") => StopReason::Safety,
        _ => StopReason::Unknown,
    };

    ChatResponse {
        content,
        usage,
        stop_reason,
    }
}

#[async_trait]
impl ModelProvider for GoogleProvider {
    fn id(&self) -> &str {
        "google"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, PilotError> {
        let body = self.build_request_body(&request);

        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, request.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PilotError::Provider {
                provider: "google".into(),
                message: e.to_string(),
                retriable: e.is_timeout() || e.is_connect(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(PilotError::Provider {
                provider: "google".into(),
                message: format!("HTTP {}: {}", status, error_body),
                retriable: status.is_server_error()
                    || status == reqwest::StatusCode::TOO_MANY_REQUESTS,
            });
        }

        let resp: serde_json::Value = response.json().await.map_err(|e| PilotError::Provider {
            provider: "google".into(),
            message: format!("Failed to parse response: {}", e),
            retriable: false,
        })?;

        Ok(parse_response(&resp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Message;

    #[tokio::test]
    async fn test_unresponsive_endpoint_times_out() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let p = GoogleProvider::new("k".into())
            .with_base_url(format!("http://{addr}"))
            .with_timeout(Duration::from_millis(200));
        let req = ChatRequest {
            model: "m".into(),
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        let result = tokio::time::timeout(Duration::from_secs(5), p.chat(req))
            .await
            .expect("client timeout never fired");
        match result {
            Err(PilotError::Provider { retriable, .. }) => assert!(retriable),
            other => panic!("expected a provider timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_request_body_shape() {
        let p = GoogleProvider::new("k".into());
        let req = ChatRequest {
            model: "gemini-2.0-flash-exp".into(),
            messages: vec![Message::user("hi"), Message::assistant("hello")],
            system: Some("be brief".into()),
            temperature: Some(0.1),
            ..Default::default()
        };
        let body = p.build_request_body(&req);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["system_instruction"]["parts"][0]["text"], "be brief");
        assert!(body["generationConfig"]["temperature"].is_number());
        assert!(body["generationConfig"].get("maxOutputTokens").is_none());
    }

    #[test]
    fn test_no_generation_config_when_unset() {
        let p = GoogleProvider::new("k".into());
        let body = p.build_request_body(&ChatRequest {
            model: "m".into(),
            messages: vec![Message::user("x")],
            ..Default::default()
        });
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn test_parse_response_joins_parts() {
        let resp = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "1. Go to " }, { "text": "example.com" }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 12, "candidatesTokenCount": 7 }
        });
        let out = parse_response(&resp);
        assert_eq!(out.content, "1. Go to example.com");
        assert_eq!(out.usage.total(), 19);
        assert!(matches!(out.stop_reason, StopReason::EndTurn));
    }

    #[test]
    fn test_parse_response_empty() {
        let out = parse_response(&serde_json::json!({}));
        assert!(out.content.is_empty());
        assert!(matches!(out.stop_reason, StopReason::Unknown));
    }
}
