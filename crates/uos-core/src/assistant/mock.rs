//! Deterministic scripted assistant for worker and handler tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{Duration, sleep};

use crate::assistant::{AssistantError, AssistantProvider, Result};
use crate::models::ChatReply;

/// Deterministic outcome for one scripted chat turn.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    /// Return a plain assistant reply.
    Reply(String),
    /// Return an upstream failure.
    Failure(String),
    /// Exhaust the polling budget.
    Timeout,
}

/// Scripted chat turn with optional delay.
#[derive(Debug, Clone)]
pub struct ScriptedStep {
    pub delay_ms: u64,
    pub outcome: ScriptedOutcome,
}

impl ScriptedStep {
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            delay_ms: 0,
            outcome: ScriptedOutcome::Reply(text.into()),
        }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            delay_ms: 0,
            outcome: ScriptedOutcome::Failure(detail.into()),
        }
    }

    pub fn timeout() -> Self {
        Self {
            delay_ms: 0,
            outcome: ScriptedOutcome::Timeout,
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

/// An assistant backend driven by scripted steps.
///
/// With an empty script every turn echoes the incoming message, which keeps
/// simple intake tests terse.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAssistant {
    script: Arc<Mutex<VecDeque<ScriptedStep>>>,
}

impl ScriptedAssistant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_steps(steps: Vec<ScriptedStep>) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::from(steps))),
        }
    }

    pub async fn push_step(&self, step: ScriptedStep) {
        self.script.lock().await.push_back(step);
    }

    async fn next_step(&self) -> Option<ScriptedStep> {
        self.script.lock().await.pop_front()
    }
}

#[async_trait]
impl AssistantProvider for ScriptedAssistant {
    async fn run_chat(&self, message: &str, conversation_token: Option<&str>) -> Result<ChatReply> {
        // First turns mint a fixed token so tests can assert continuation
        let token = conversation_token.unwrap_or("thread-scripted").to_string();

        let Some(step) = self.next_step().await else {
            return Ok(ChatReply {
                text: format!("echo: {}", message),
                conversation_token: token,
            });
        };

        if step.delay_ms > 0 {
            sleep(Duration::from_millis(step.delay_ms)).await;
        }

        match step.outcome {
            ScriptedOutcome::Reply(text) => Ok(ChatReply {
                text,
                conversation_token: token,
            }),
            ScriptedOutcome::Failure(detail) => Err(AssistantError::RunFailed {
                status: "failed".to_string(),
                detail,
            }),
            ScriptedOutcome::Timeout => Err(AssistantError::Timeout { attempts: 45 }),
        }
    }
}
