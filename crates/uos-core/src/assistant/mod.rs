//! Assistant backends for chat jobs.

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod openai;

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{ScriptedAssistant, ScriptedOutcome, ScriptedStep};
pub use openai::OpenAiAssistant;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::ChatReply;

/// Assistant backend error types
#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("assistant run did not complete within {attempts} status checks")]
    Timeout { attempts: u32 },

    #[error("assistant run ended as {status}: {detail}")]
    RunFailed { status: String, detail: String },

    #[error("assistant API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("unexpected assistant response: {0}")]
    InvalidReply(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AssistantError>;

/// A conversation backend that turns one user message into one reply.
///
/// Implementations must be safe to share across workers.
#[async_trait]
pub trait AssistantProvider: Send + Sync {
    /// Run a single chat turn, continuing the conversation identified by
    /// `conversation_token` when one is supplied.
    async fn run_chat(&self, message: &str, conversation_token: Option<&str>) -> Result<ChatReply>;
}
