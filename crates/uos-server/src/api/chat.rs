//! Chat intake and polling.
//!
//! `POST /chat` validates, rate-limits and enqueues, answering with a
//! request id before any assistant work happens. `GET /chat?requestId=`
//! reports queue position or the terminal payload.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use uos_core::engine::JobView;

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::middleware::client_key;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub conversation_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatQueued {
    pub request_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollQuery {
    #[serde(default)]
    pub request_id: Option<String>,
}

/// Wire shape of a poll answer: a bare status while the job is in flight,
/// the assistant payload once it completed, an error line once it failed.
#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum PollResponse {
    Status {
        status: &'static str,
    },
    Completed {
        response: String,
        #[serde(rename = "conversationToken")]
        conversation_token: String,
    },
    Failed {
        error: String,
    },
}

pub async fn submit_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatQueued>, ApiError> {
    let message = request
        .message
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();
    if message.is_empty() {
        return Err(ApiError::Validation("Message is required".to_string()));
    }

    let client = client_key(&headers);
    if !state.limiter.allow(&client) {
        tracing::warn!(client, "Rate limit exceeded for chat intake");
        return Err(ApiError::RateLimited);
    }

    let conversation_token = request
        .conversation_token
        .filter(|token| !token.trim().is_empty());

    let request_id = state
        .core
        .scheduler
        .submit_message(message.to_string(), conversation_token)?;

    Ok(Json(ChatQueued { request_id }))
}

pub async fn poll_chat(
    State(state): State<AppState>,
    Query(query): Query<PollQuery>,
) -> Result<Json<PollResponse>, ApiError> {
    let request_id = query
        .request_id
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();
    if request_id.is_empty() {
        return Err(ApiError::Validation(
            "Please provide a requestId".to_string(),
        ));
    }

    let payload = match state.core.scheduler.job_status(request_id)? {
        JobView::Queued => PollResponse::Status { status: "queued" },
        JobView::Processing => PollResponse::Status {
            status: "processing",
        },
        JobView::NotFound => PollResponse::Status {
            status: "not_found",
        },
        JobView::Completed(reply) => PollResponse::Completed {
            response: reply.text,
            conversation_token: reply.conversation_token,
        },
        JobView::Failed(error) => PollResponse::Failed { error },
    };

    Ok(Json(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use uos_core::AppCore;
    use uos_core::assistant::{ScriptedAssistant, ScriptedStep};
    use uos_core::config::{AppConfig, StoreBackend};

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.storage.backend = StoreBackend::Memory;
        config.worker.delay_ms = 10;
        config.assistant.api_key = "sk-test".to_string();
        config.assistant.assistant_id = "asst_test".to_string();
        config
    }

    fn idle_app(config: AppConfig, script: Vec<ScriptedStep>) -> AppState {
        let provider = Arc::new(ScriptedAssistant::from_steps(script));
        let core = Arc::new(AppCore::with_provider(config, provider).unwrap());
        AppState::new(core)
    }

    async fn running_app(config: AppConfig, script: Vec<ScriptedStep>) -> AppState {
        let state = idle_app(config, script);
        state.core.executor.start().await;
        state
    }

    fn chat_request(message: &str) -> Json<ChatRequest> {
        Json(ChatRequest {
            message: Some(message.to_string()),
            conversation_token: None,
        })
    }

    async fn submit(state: &AppState, request: Json<ChatRequest>) -> Result<String, ApiError> {
        submit_chat(State(state.clone()), HeaderMap::new(), request)
            .await
            .map(|queued| queued.0.request_id)
    }

    async fn poll(state: &AppState, request_id: &str) -> PollResponse {
        poll_chat(
            State(state.clone()),
            Query(PollQuery {
                request_id: Some(request_id.to_string()),
            }),
        )
        .await
        .unwrap()
        .0
    }

    async fn poll_until_settled(state: &AppState, request_id: &str) -> PollResponse {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let response = poll(state, request_id).await;
            let in_flight = matches!(
                response,
                PollResponse::Status {
                    status: "queued" | "processing"
                }
            );
            if !in_flight {
                return response;
            }
            if Instant::now() >= deadline {
                panic!("request {} never settled, last answer {:?}", request_id, response);
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    #[tokio::test]
    async fn test_submit_returns_distinct_request_ids() {
        let state = idle_app(test_config(), vec![]);

        let first = submit(&state, chat_request("hello")).await.unwrap();
        let second = submit(&state, chat_request("hello again")).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(poll(&state, &first).await, PollResponse::Status { status: "queued" });
        assert_eq!(poll(&state, &second).await, PollResponse::Status { status: "queued" });
    }

    #[tokio::test]
    async fn test_submit_rejects_missing_message() {
        let state = idle_app(test_config(), vec![]);

        let err = submit(&state, chat_request("   ")).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(err.to_string(), "Message is required");

        let none = Json(ChatRequest {
            message: None,
            conversation_token: None,
        });
        assert!(matches!(
            submit(&state, none).await.unwrap_err(),
            ApiError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_and_does_not_enqueue() {
        let mut config = test_config();
        config.rate_limit.max_requests = 1;
        let state = idle_app(config, vec![]);

        let mut client_a = HeaderMap::new();
        client_a.insert("x-forwarded-for", "203.0.113.9".parse().unwrap());

        let queued = submit_chat(State(state.clone()), client_a.clone(), chat_request("one"))
            .await
            .unwrap();

        let err = submit_chat(State(state.clone()), client_a, chat_request("two"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::RateLimited));

        // The rejected request left nothing behind; the first is still queued
        assert_eq!(
            poll(&state, &queued.0.request_id).await,
            PollResponse::Status { status: "queued" }
        );

        // A different client still has its own budget
        let mut client_b = HeaderMap::new();
        client_b.insert("x-forwarded-for", "198.51.100.7".parse().unwrap());
        submit_chat(State(state.clone()), client_b, chat_request("three"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_chat_completes_end_to_end() {
        let state = running_app(
            test_config(),
            vec![ScriptedStep::reply("UNIVERSAL OS ONLINE")],
        )
        .await;

        let request_id = submit(&state, chat_request("status report")).await.unwrap();

        let response = poll_until_settled(&state, &request_id).await;
        assert_eq!(
            response,
            PollResponse::Completed {
                response: "UNIVERSAL OS ONLINE".to_string(),
                conversation_token: "thread-scripted".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_conversation_token_is_threaded_through() {
        let state = running_app(test_config(), vec![ScriptedStep::reply("again")]).await;

        let request = Json(ChatRequest {
            message: Some("follow up".to_string()),
            conversation_token: Some("thread-abc".to_string()),
        });
        let request_id = submit(&state, request).await.unwrap();

        match poll_until_settled(&state, &request_id).await {
            PollResponse::Completed {
                conversation_token, ..
            } => assert_eq!(conversation_token, "thread-abc"),
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_job_reports_error_payload() {
        let state = running_app(
            test_config(),
            vec![ScriptedStep::failure("model offline")],
        )
        .await;

        let request_id = submit(&state, chat_request("status report")).await.unwrap();

        match poll_until_settled(&state, &request_id).await {
            PollResponse::Failed { error } => assert!(error.contains("model offline")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_terminal_payload_is_stable_across_polls() {
        let state = running_app(test_config(), vec![ScriptedStep::reply("done")]).await;

        let request_id = submit(&state, chat_request("ping")).await.unwrap();
        let first = poll_until_settled(&state, &request_id).await;
        let second = poll(&state, &request_id).await;

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unknown_request_id_is_not_found() {
        let state = idle_app(test_config(), vec![]);
        assert_eq!(
            poll(&state, "no-such-id").await,
            PollResponse::Status { status: "not_found" }
        );
    }

    #[tokio::test]
    async fn test_expired_result_reads_as_not_found() {
        let mut config = test_config();
        config.storage.result_ttl_secs = 0;
        let state = running_app(config, vec![ScriptedStep::reply("gone soon")]).await;

        let request_id = submit(&state, chat_request("ping")).await.unwrap();

        // With a zero retention the terminal result is expired by the time
        // any poll can observe it
        assert_eq!(
            poll_until_settled(&state, &request_id).await,
            PollResponse::Status { status: "not_found" }
        );
    }

    #[tokio::test]
    async fn test_poll_requires_request_id() {
        let state = idle_app(test_config(), vec![]);

        let err = poll_chat(State(state.clone()), Query(PollQuery { request_id: None }))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let err = poll_chat(
            State(state),
            Query(PollQuery {
                request_id: Some("  ".to_string()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Please provide a requestId");
    }

    #[test]
    fn test_poll_response_wire_shapes() {
        let queued = serde_json::to_value(PollResponse::Status { status: "queued" }).unwrap();
        assert_eq!(queued, serde_json::json!({ "status": "queued" }));

        let completed = serde_json::to_value(PollResponse::Completed {
            response: "hi".to_string(),
            conversation_token: "thread_1".to_string(),
        })
        .unwrap();
        assert_eq!(
            completed,
            serde_json::json!({ "response": "hi", "conversationToken": "thread_1" })
        );

        let failed = serde_json::to_value(PollResponse::Failed {
            error: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(failed, serde_json::json!({ "error": "boom" }));
    }
}
