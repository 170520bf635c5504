use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pdf_chat_core::ChatError;
use serde_json::json;

#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Bad input from the client.
    Validation(String),
    /// The request body exceeded the configured upload limit.
    PayloadTooLarge(String),
    /// The operation needs a processed document and there is none.
    State(String),
    /// Storing or ingesting an upload failed.
    Ingestion(String),
    /// The completion or embedding provider failed while answering.
    Generation(String),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::State(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Ingestion(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Generation(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::Validation(message)
            | ApiError::PayloadTooLarge(message)
            | ApiError::State(message)
            | ApiError::Ingestion(message)
            | ApiError::Generation(message)
            | ApiError::Internal(message) => message,
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(value: ChatError) -> Self {
        match value {
            ChatError::NoDocument => ApiError::State(value.to_string()),
            ChatError::EmptyQuestion => ApiError::Validation(value.to_string()),
            ChatError::Retrieval(_) => ApiError::Internal(value.to_string()),
            ChatError::Generation(_) => ApiError::Generation(value.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.message() }))).into_response()
    }
}
