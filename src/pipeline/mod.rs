// src/pipeline/mod.rs — Task pipeline: reason, refine, acquire, run, extract
//
// One request flows Resolved → [Reasoned] → Refined → ResourceAcquired →
// Executed → Extracted → Responded. An optional deadline bounds every stage
// up to and including the automation run. Refinement, screenshot capture, and
// history append degrade in place; every other stage fails the request.

pub mod extract;
pub mod refine;
pub mod screenshot;

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::browser::{BrowserConfig, Credentials};
use crate::infra::errors::PilotError;
use crate::reasoning::{ReasoningAnswer, ReasoningService};
use crate::session::{HistoryItem, SessionManager, SessionUpdate};

pub use extract::Extraction;
pub use refine::{Refinement, TaskRefiner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolved,
    Reasoned,
    Refined,
    ResourceAcquired,
    Executed,
    Extracted,
    Responded,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Resolved => "resolved",
            Stage::Refined => "refined",
            Stage::Reasoned => "reasoned",
            Stage::ResourceAcquired => "resource_acquired",
            Stage::Executed => "executed",
            Stage::Extracted => "extracted",
            Stage::Responded => "responded",
        };
        f.write_str(s)
    }
}

/// A best-effort step that fell back instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degradation {
    Refinement,
    Screenshot,
}

#[derive(Debug, Clone)]
pub struct TaskInput {
    pub task: String,
    pub include_screenshot: bool,
    /// Deadline for the reasoning calls and the automation run. `None`
    /// leaves them unbounded.
    pub timeout: Option<Duration>,
    pub credentials: Credentials,
    pub new_session: bool,
    pub external_session_id: Option<String>,
}

impl TaskInput {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            include_screenshot: true,
            timeout: None,
            credentials: Credentials::new(),
            new_session: false,
            external_session_id: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub session_id: String,
    pub message: String,
    pub screenshot: Option<String>,
    pub current_url: Option<String>,
    pub external_session_id: Option<String>,
    pub degraded: Vec<Degradation>,
}

pub struct TaskPipeline {
    sessions: Arc<SessionManager>,
    refiner: TaskRefiner,
    reasoning: Option<Arc<dyn ReasoningService>>,
    browser_config: BrowserConfig,
    screenshot_settle: Duration,
}

impl TaskPipeline {
    pub fn new(sessions: Arc<SessionManager>, refiner: TaskRefiner, browser_config: BrowserConfig) -> Self {
        Self {
            sessions,
            refiner,
            reasoning: None,
            browser_config,
            screenshot_settle: Duration::from_millis(500),
        }
    }

    pub fn with_reasoning(mut self, service: Arc<dyn ReasoningService>) -> Self {
        self.reasoning = Some(service);
        self
    }

    pub fn with_screenshot_settle(mut self, settle: Duration) -> Self {
        self.screenshot_settle = settle;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Run one task end to end for the session named by `presented`
    /// (or a fresh one).
    pub async fn execute(
        &self,
        presented: Option<&str>,
        input: TaskInput,
    ) -> Result<TaskOutcome, PilotError> {
        if input.task.trim().is_empty() {
            return Err(PilotError::InvalidRequest("task must not be empty".into()));
        }
        let deadline = input.timeout.and_then(|t| Instant::now().checked_add(t));
        let mut degraded = Vec::new();

        let session_id = if input.new_session {
            self.sessions.create().await?
        } else {
            self.sessions.resolve(presented).await?
        };
        let record = self.sessions.get_data(&session_id).await?;
        tracing::info!(session_id = %session_id, stage = %Stage::Resolved, "Received task");

        let mut external_session_id = input.external_session_id.clone();
        let mut external_answer = None;
        if let Some(service) = &self.reasoning {
            let answer = within(
                deadline,
                Stage::Reasoned,
                consult(service.as_ref(), &input.task, external_session_id.as_deref()),
            )
            .await
            .inspect_err(|e| {
                tracing::error!(session_id = %session_id, stage = %Stage::Reasoned, "{}", e)
            })?;
            tracing::info!(
                session_id = %session_id,
                stage = %Stage::Reasoned,
                conversation_id = %answer.conversation_id,
                "External answer received"
            );
            external_session_id = Some(answer.conversation_id);
            external_answer = Some(answer.answer);
        }

        let refinement = self
            .refine_within(
                deadline,
                &input.task,
                record.current_url.as_deref(),
                external_answer.as_deref(),
            )
            .await;
        if refinement.degraded {
            degraded.push(Degradation::Refinement);
        }
        tracing::info!(
            session_id = %session_id,
            stage = %Stage::Refined,
            degraded = refinement.degraded,
            "Task refined"
        );
        let instruction = refinement.text;

        let browser = within(
            deadline,
            Stage::ResourceAcquired,
            self.sessions.acquire_resource(&session_id, &self.browser_config),
        )
        .await
        .inspect_err(|e| {
            tracing::error!(session_id = %session_id, stage = %Stage::ResourceAcquired, "{}", e)
        })?;
        tracing::debug!(session_id = %session_id, browser = browser.id(), stage = %Stage::ResourceAcquired);

        let execution = within(
            deadline,
            Stage::Executed,
            browser.run(&instruction, &input.credentials),
        )
        .await
        .inspect_err(|e| {
            tracing::error!(session_id = %session_id, stage = %Stage::Executed, "{}", e)
        })?;
        tracing::info!(
            session_id = %session_id,
            stage = %Stage::Executed,
            steps = execution.steps.len(),
            "Automation run finished"
        );

        let extraction = Extraction::from_record(&execution);
        if extraction.captcha_detected {
            tracing::warn!(session_id = %session_id, "CAPTCHA encountered during run");
        }

        let screenshot = if input.include_screenshot {
            let capture =
                screenshot::capture_or_fallback(&*browser, &execution, self.screenshot_settle).await;
            if capture.degraded {
                degraded.push(Degradation::Screenshot);
            }
            capture.screenshot
        } else {
            None
        };
        drop(browser);
        tracing::debug!(session_id = %session_id, stage = %Stage::Extracted);

        let mut update = SessionUpdate::touch(Utc::now());
        if let Some(url) = &extraction.final_url {
            update = update.with_url(url);
        }
        self.sessions.update(&session_id, &update).await?;

        let current_url = extraction.final_url.clone().or(record.current_url);
        self.sessions.spawn_append_history(
            session_id.clone(),
            HistoryItem {
                task: input.task,
                refined_task: instruction,
                external_answer,
                result: extraction.message.clone(),
                url: current_url.clone(),
            },
        );

        tracing::info!(session_id = %session_id, stage = %Stage::Responded, "Task complete");
        Ok(TaskOutcome {
            session_id,
            message: extraction.message,
            screenshot,
            current_url,
            external_session_id,
            degraded,
        })
    }

    /// Refine within at most half of the remaining budget; on timeout the
    /// raw task goes ahead.
    async fn refine_within(
        &self,
        deadline: Option<Instant>,
        task: &str,
        current_url: Option<&str>,
        reference: Option<&str>,
    ) -> Refinement {
        let refine = self.refiner.refine(task, current_url, reference);
        let Some(deadline) = deadline else {
            return refine.await;
        };
        let now = Instant::now();
        let cutoff = now + deadline.saturating_duration_since(now) / 2;
        match tokio::time::timeout_at(cutoff, refine).await {
            Ok(refinement) => refinement,
            Err(_) => {
                tracing::warn!("Task refinement timed out, using the original task");
                Refinement::fallback(task, reference, true)
            }
        }
    }

    /// Highlight-free screenshot of a session's live browser.
    pub async fn clean_screenshot(
        &self,
        session_id: &str,
        full_page: bool,
    ) -> Result<String, PilotError> {
        let browser = self.sessions.live_resource(session_id).await?;
        screenshot::capture_clean(&*browser, full_page, self.screenshot_settle).await
    }
}

/// Ask the reasoning service, opening a conversation first when none is known.
async fn consult(
    service: &dyn ReasoningService,
    question: &str,
    conversation_id: Option<&str>,
) -> Result<ReasoningAnswer, PilotError> {
    match conversation_id.filter(|c| !c.is_empty()) {
        Some(id) => service.ask(question, Some(id)).await,
        None => {
            let opened = service.ask(question, None).await?;
            service.ask(question, Some(&opened.conversation_id)).await
        }
    }
}

async fn within<T, F>(deadline: Option<Instant>, stage: Stage, fut: F) -> Result<T, PilotError>
where
    F: Future<Output = Result<T, PilotError>>,
{
    let Some(deadline) = deadline else {
        return fut.await;
    };
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(result) => result,
        Err(_) => {
            let msg = format!("deadline exceeded at stage '{stage}'");
            Err(match stage {
                Stage::Reasoned => PilotError::UpstreamReasoning(msg),
                _ => PilotError::Automation(msg),
            })
        }
    }
}
