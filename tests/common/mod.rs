// tests/common/mod.rs — Shared mock collaborators for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use browserpilot::browser::{
    BrowserConfig, BrowserHandle, BrowserLauncher, Credentials, ExecutionRecord, StepRecord,
};
use browserpilot::infra::config::BrowserSettings;
use browserpilot::infra::errors::PilotError;
use browserpilot::pipeline::{TaskPipeline, TaskRefiner};
use browserpilot::provider::{ChatRequest, ChatResponse, ModelProvider, StopReason, TokenUsage};
use browserpilot::reasoning::{ReasoningAnswer, ReasoningService};
use browserpilot::session::store::MemoryStore;
use browserpilot::session::{ResourcePool, SessionManager};

/// Behaviour shared by every browser a [`MockLauncher`] starts.
#[derive(Default)]
pub struct Script {
    pub record: Mutex<ExecutionRecord>,
    pub fail_run: AtomicBool,
    pub fail_screenshot: AtomicBool,
    pub run_delay: Mutex<Option<Duration>>,
    /// Every instruction passed to `run`, in order.
    pub tasks: Mutex<Vec<String>>,
    pub credentials_seen: Mutex<Vec<Credentials>>,
    pub closed: AtomicUsize,
}

impl Script {
    pub fn set_record(&self, record: ExecutionRecord) {
        *self.record.lock().unwrap() = record;
    }

    pub fn tasks(&self) -> Vec<String> {
        self.tasks.lock().unwrap().clone()
    }
}

pub struct MockBrowser {
    id: String,
    script: Arc<Script>,
}

#[async_trait]
impl BrowserHandle for MockBrowser {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(
        &self,
        task: &str,
        credentials: &Credentials,
    ) -> Result<ExecutionRecord, PilotError> {
        self.script.tasks.lock().unwrap().push(task.to_string());
        self.script
            .credentials_seen
            .lock()
            .unwrap()
            .push(credentials.clone());
        let delay = *self.script.run_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.script.fail_run.load(Ordering::SeqCst) {
            return Err(PilotError::Automation("element not found: #login".into()));
        }
        Ok(self.script.record.lock().unwrap().clone())
    }

    async fn ensure_page(&self) -> Result<(), PilotError> {
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> Result<serde_json::Value, PilotError> {
        Ok(serde_json::Value::Bool(true))
    }

    async fn screenshot(&self, _full_page: bool) -> Result<String, PilotError> {
        if self.script.fail_screenshot.load(Ordering::SeqCst) {
            Err(PilotError::Automation("target closed".into()))
        } else {
            Ok("clean-png".into())
        }
    }

    async fn close(&self) -> Result<(), PilotError> {
        self.script.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockLauncher {
    pub launches: AtomicUsize,
    pub fail_launch: AtomicBool,
    pub script: Arc<Script>,
    pub configs: Mutex<Vec<BrowserConfig>>,
}

impl MockLauncher {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for MockLauncher {
    async fn launch(&self, config: &BrowserConfig) -> Result<Arc<dyn BrowserHandle>, PilotError> {
        // Widen the window in which a racing acquisition could double-launch.
        tokio::time::sleep(Duration::from_millis(20)).await;
        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(PilotError::ResourceInit {
                resource_id: String::new(),
                message: "chromium missing".into(),
            });
        }
        self.configs.lock().unwrap().push(config.clone());
        let n = self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockBrowser {
            id: format!("browser-{n}"),
            script: Arc::clone(&self.script),
        }))
    }
}

/// A mock provider that returns a canned refinement, fails, or hangs.
pub struct MockProvider {
    reply: Result<String, String>,
    hang: bool,
    pub prompts: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn replying(content: &str) -> Self {
        Self {
            reply: Ok(content.to_string()),
            hang: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: Err("503 model overloaded".into()),
            hang: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Never answers.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::replying("unreachable")
        }
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn id(&self) -> &str {
        "mock"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, PilotError> {
        if let Some(m) = request.messages.first() {
            self.prompts.lock().unwrap().push(m.content.clone());
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        match &self.reply {
            Ok(content) => Ok(ChatResponse {
                content: content.clone(),
                usage: TokenUsage {
                    input_tokens: 100,
                    output_tokens: 20,
                },
                stop_reason: StopReason::EndTurn,
            }),
            Err(message) => Err(PilotError::Provider {
                provider: "mock".into(),
                message: message.clone(),
                retriable: true,
            }),
        }
    }
}

/// Records every question and the conversation it was asked in.
pub struct MockReasoner {
    pub answer: Option<String>,
    pub calls: Mutex<Vec<Option<String>>>,
}

impl MockReasoner {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: Some(answer.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn silent() -> Self {
        Self {
            answer: None,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ReasoningService for MockReasoner {
    async fn ask(
        &self,
        _question: &str,
        conversation_id: Option<&str>,
    ) -> Result<ReasoningAnswer, PilotError> {
        self.calls
            .lock()
            .unwrap()
            .push(conversation_id.map(String::from));
        match &self.answer {
            Some(answer) => Ok(ReasoningAnswer {
                answer: answer.clone(),
                conversation_id: conversation_id.unwrap_or("conv-1").to_string(),
            }),
            None => Err(PilotError::UpstreamReasoning("empty answer".into())),
        }
    }
}

pub fn record(url: Option<&str>, evaluation: &str, extracted: &str) -> ExecutionRecord {
    ExecutionRecord {
        steps: vec![
            StepRecord {
                url: Some("about:blank".into()),
                evaluation: Some("Started".into()),
                ..Default::default()
            },
            StepRecord {
                url: url.map(String::from),
                screenshot: Some("inline-png".into()),
                evaluation: Some(evaluation.to_string()),
                extracted: vec![extracted.to_string()],
            },
        ],
    }
}

pub fn manager(launcher: Arc<MockLauncher>, idle: Duration) -> Arc<SessionManager> {
    Arc::new(SessionManager::new(
        Arc::new(MemoryStore::new()),
        ResourcePool::new(launcher),
        idle,
    ))
}

pub fn pipeline(sessions: Arc<SessionManager>, refiner: TaskRefiner) -> TaskPipeline {
    TaskPipeline::new(
        sessions,
        refiner,
        BrowserConfig::hardened(&BrowserSettings::default()),
    )
    .with_screenshot_settle(Duration::ZERO)
}

/// Wait for a detached history append to land.
pub async fn wait_for_history(sessions: &SessionManager, session_id: &str, count: usize) {
    for _ in 0..100 {
        if sessions.history_count(session_id).await.unwrap() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("history for {session_id} never reached {count} entries");
}
