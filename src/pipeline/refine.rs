// src/pipeline/refine.rs — Best-effort instruction refinement

use std::sync::Arc;

use crate::provider::{ChatRequest, Message, ModelProvider, ModelRef};

/// Result of a refinement attempt. `degraded` is set when a model was
/// available but the call failed and the raw task was passed through.
#[derive(Debug, Clone, PartialEq)]
pub struct Refinement {
    pub text: String,
    pub degraded: bool,
}

impl Refinement {
    /// The unrefined task, still carrying any reference answer.
    pub fn fallback(task: &str, reference: Option<&str>, degraded: bool) -> Self {
        let text = match reference {
            Some(answer) => ground(task, answer),
            None => task.to_string(),
        };
        Self { text, degraded }
    }
}

/// Turns a vague user request into numbered browser steps.
pub struct TaskRefiner {
    provider: Option<Arc<dyn ModelProvider>>,
    model: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl TaskRefiner {
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>) -> Self {
        Self {
            provider: Some(provider),
            model: model.into(),
            max_tokens: None,
            temperature: None,
        }
    }

    /// A refiner that passes every task through unchanged.
    pub fn passthrough() -> Self {
        Self {
            provider: None,
            model: String::new(),
            max_tokens: None,
            temperature: None,
        }
    }

    /// Build from the resolved provider, or a passthrough when none is configured.
    pub fn from_resolved(resolved: Option<(Arc<dyn ModelProvider>, ModelRef)>) -> Self {
        match resolved {
            Some((provider, model_ref)) => Self::new(provider, model_ref.model),
            None => Self::passthrough(),
        }
    }

    pub fn with_sampling(mut self, max_tokens: Option<u32>, temperature: Option<f32>) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// Refine `task`, folding in `reference` (an external answer) when
    /// present. Never fails: any provider error or an empty reply falls
    /// back to the original text.
    pub async fn refine(
        &self,
        task: &str,
        current_url: Option<&str>,
        reference: Option<&str>,
    ) -> Refinement {
        let Some(provider) = &self.provider else {
            return Refinement::fallback(task, reference, false);
        };

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![Message::user(build_prompt(task, current_url, reference))],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: None,
        };

        match provider.chat(request).await {
            Ok(resp) if !resp.content.trim().is_empty() => {
                tracing::debug!(
                    tokens = resp.usage.total(),
                    "Refined task with {}",
                    provider.id()
                );
                Refinement {
                    text: resp.content.trim().to_string(),
                    degraded: false,
                }
            }
            Ok(_) => {
                tracing::warn!("Refiner returned an empty reply; using the original task");
                Refinement::fallback(task, reference, true)
            }
            Err(e) => {
                tracing::warn!("Task refinement failed, using the original task: {}", e);
                Refinement::fallback(task, reference, true)
            }
        }
    }
}

pub fn build_prompt(task: &str, current_url: Option<&str>, reference: Option<&str>) -> String {
    let mut prompt = String::from(
        "You are a browser automation assistant. Convert the following user request into \
         clear, step-by-step browser instructions that an automation agent can follow.\n\n\
         For example, if the user says \"check the weather in New York\", you should generate:\n\
         1. Go to weather.com\n\
         2. Search for New York\n\
         3. Find and extract the current temperature and conditions\n\n\
         Be precise and include all necessary details for automation. If the request involves \
         logging in, refer to credentials only by their placeholder names; they are substituted \
         with real values at run time.\n",
    );

    if let Some(url) = current_url.filter(|u| !u.is_empty()) {
        prompt.push_str(&format!(
            "\nThe browser is already open at: {url}\n\
             Continue from this page unless the request clearly needs a different site.\n"
        ));
    }

    if let Some(answer) = reference.filter(|a| !a.trim().is_empty()) {
        prompt.push_str(&format!(
            "\nReference information for this task:\n{answer}\n\
             Use it to fill in any details the request leaves out.\n"
        ));
    }

    prompt.push_str(&format!(
        "\nUser Request: {task}\n\nStep-by-step instructions:"
    ));
    prompt
}

/// Attach an external reasoning answer to an unrefined instruction.
pub fn ground(instruction: &str, answer: &str) -> String {
    format!("{instruction}\n\nReference information for this task:\n{answer}")
}
