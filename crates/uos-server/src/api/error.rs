use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use uos_core::market::MarketError;

/// Request failures with their HTTP mapping. Validation keeps its message,
/// internal failures are logged and answered with a generic line.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),

    #[error(transparent)]
    Upstream(#[from] MarketError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded".to_string(),
            ),
            ApiError::Storage(err) => {
                tracing::error!(error = %err, "Storage failure while handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to process request".to_string(),
                )
            }
            ApiError::Upstream(MarketError::NoData) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                MarketError::NoData.to_string(),
            ),
            ApiError::Upstream(err) => {
                tracing::error!(error = %err, "Upstream DEX request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to fetch data".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
