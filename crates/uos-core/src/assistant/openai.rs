//! OpenAI Assistants API provider.
//!
//! One chat turn maps onto the beta Assistants flow: ensure a thread, append
//! the user message, create a run, poll the run until it settles, then read
//! the newest assistant message. The thread id doubles as the conversation
//! token handed back to clients.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::assistant::{AssistantError, AssistantProvider, Result};
use crate::config::AssistantSection;
use crate::http_client::build_http_client;
use crate::models::ChatReply;

/// Client for the OpenAI Assistants API
pub struct OpenAiAssistant {
    client: Client,
    api_key: String,
    assistant_id: String,
    base_url: String,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl OpenAiAssistant {
    /// Create a new client for the given assistant
    pub fn new(api_key: impl Into<String>, assistant_id: impl Into<String>) -> Self {
        Self {
            client: build_http_client(),
            api_key: api_key.into(),
            assistant_id: assistant_id.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            poll_interval: Duration::from_millis(1000),
            max_poll_attempts: 45,
        }
    }

    pub fn from_config(config: &AssistantSection) -> Self {
        Self::new(config.api_key.clone(), config.assistant_id.clone())
            .with_base_url(config.base_url.clone())
            .with_polling(
                Duration::from_millis(config.poll_interval_ms),
                config.max_poll_attempts,
            )
    }

    /// Set custom base URL (for API-compatible services)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the run polling cadence and budget
    pub fn with_polling(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.poll_interval = interval;
        self.max_poll_attempts = max_attempts;
        self
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: serde_json::Value) -> Result<T> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("OpenAI-Beta", "assistants=v2")
            .json(&body)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("OpenAI-Beta", "assistants=v2")
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AssistantError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<T>().await?)
    }

    async fn create_thread(&self) -> Result<String> {
        let thread: ThreadObject = self.post_json("/threads", json!({})).await?;
        Ok(thread.id)
    }

    async fn add_message(&self, thread_id: &str, content: &str) -> Result<()> {
        let _: serde_json::Value = self
            .post_json(
                &format!("/threads/{}/messages", thread_id),
                json!({ "role": "user", "content": content }),
            )
            .await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str) -> Result<RunObject> {
        self.post_json(
            &format!("/threads/{}/runs", thread_id),
            json!({ "assistant_id": self.assistant_id }),
        )
        .await
    }

    async fn wait_for_run(&self, thread_id: &str, run_id: &str) -> Result<()> {
        for attempt in 1..=self.max_poll_attempts {
            let run: RunObject = self
                .get_json(&format!("/threads/{}/runs/{}", thread_id, run_id))
                .await?;

            match run.status.as_str() {
                "completed" => return Ok(()),
                "failed" | "cancelled" | "expired" => {
                    let detail = run
                        .last_error
                        .map(|e| e.message)
                        .unwrap_or_else(|| "no detail provided".to_string());
                    return Err(AssistantError::RunFailed {
                        status: run.status,
                        detail,
                    });
                }
                _ => {
                    debug!(run_id, attempt, status = %run.status, "Assistant run still in progress");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        Err(AssistantError::Timeout {
            attempts: self.max_poll_attempts,
        })
    }

    async fn latest_reply(&self, thread_id: &str) -> Result<String> {
        let messages: MessageList = self
            .get_json(&format!("/threads/{}/messages?order=desc&limit=10", thread_id))
            .await?;
        extract_reply(&messages)
    }
}

#[async_trait]
impl AssistantProvider for OpenAiAssistant {
    async fn run_chat(&self, message: &str, conversation_token: Option<&str>) -> Result<ChatReply> {
        let thread_id = match conversation_token {
            Some(token) => token.to_string(),
            None => self.create_thread().await?,
        };

        self.add_message(&thread_id, message).await?;
        let run = self.create_run(&thread_id).await?;
        self.wait_for_run(&thread_id, &run.id).await?;
        let text = self.latest_reply(&thread_id).await?;

        Ok(ChatReply {
            text,
            conversation_token: thread_id,
        })
    }
}

fn extract_reply(messages: &MessageList) -> Result<String> {
    let message = messages
        .data
        .iter()
        .find(|m| m.role == "assistant")
        .ok_or_else(|| AssistantError::InvalidReply("no assistant message in thread".to_string()))?;

    let content = message
        .content
        .first()
        .ok_or_else(|| AssistantError::InvalidReply("assistant message has no content".to_string()))?;

    match content {
        MessageContent::Text { text } => Ok(text.value.clone()),
        MessageContent::Other => Err(AssistantError::InvalidReply(
            "assistant returned non-text content".to_string(),
        )),
    }
}

#[derive(Deserialize)]
struct ThreadObject {
    id: String,
}

#[derive(Deserialize)]
struct RunObject {
    id: String,
    status: String,
    #[serde(default)]
    last_error: Option<RunError>,
}

#[derive(Deserialize)]
struct RunError {
    message: String,
}

#[derive(Deserialize)]
struct MessageList {
    data: Vec<ThreadMessage>,
}

#[derive(Deserialize)]
struct ThreadMessage {
    role: String,
    #[serde(default)]
    content: Vec<MessageContent>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessageContent {
    Text { text: TextValue },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct TextValue {
    value: String,
}
