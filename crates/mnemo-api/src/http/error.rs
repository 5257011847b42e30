//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use mnemo_core::conversation::engine::ConversationError;
use mnemo_types::error::{MemoryError, RepositoryError};
use mnemo_types::llm::LlmError;

use super::response::{ApiErrorDetail, ApiMeta, ApiResponse};

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Memory-layer errors.
    Memory(MemoryError),
    /// Chat model errors on the response path.
    Llm(LlmError),
    /// Validation error.
    Validation(String),
}

impl From<MemoryError> for AppError {
    fn from(e: MemoryError) -> Self {
        AppError::Memory(e)
    }
}

impl From<ConversationError> for AppError {
    fn from(e: ConversationError) -> Self {
        match e {
            ConversationError::Memory(e) => AppError::Memory(e),
            ConversationError::Llm(e) => AppError::Llm(e),
        }
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Memory(e @ (MemoryError::InvalidThreadId(_) | MemoryError::EmptyContent)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string())
            }
            AppError::Memory(e @ MemoryError::DimensionMismatch { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "DIMENSION_MISMATCH", e.to_string())
            }
            AppError::Memory(e @ MemoryError::Embedding(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "EMBEDDING_UNAVAILABLE", e.to_string())
            }
            AppError::Memory(e @ MemoryError::Index(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INDEX_ERROR", e.to_string())
            }
            AppError::Memory(
                e @ (MemoryError::NotFound(_) | MemoryError::Storage(RepositoryError::NotFound)),
            ) => (StatusCode::NOT_FOUND, "NOT_FOUND", e.to_string()),
            AppError::Memory(e @ MemoryError::Storage(RepositoryError::Conflict(_))) => {
                (StatusCode::CONFLICT, "CONFLICT", e.to_string())
            }
            AppError::Memory(e @ MemoryError::Storage(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", e.to_string())
            }
            AppError::Memory(e @ MemoryError::Maintenance(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "MAINTENANCE_ERROR", e.to_string())
            }
            AppError::Llm(e @ LlmError::RateLimited { .. }) => {
                (StatusCode::TOO_MANY_REQUESTS, "LLM_RATE_LIMITED", e.to_string())
            }
            AppError::Llm(e @ LlmError::Timeout(_)) => {
                (StatusCode::GATEWAY_TIMEOUT, "LLM_TIMEOUT", e.to_string())
            }
            AppError::Llm(e) => (StatusCode::BAD_GATEWAY, "LLM_ERROR", e.to_string()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(code, %message, "request failed");
        }

        let body = ApiResponse::<()> {
            data: None,
            meta: ApiMeta::new(String::new(), 0),
            errors: vec![ApiErrorDetail {
                code: code.to_string(),
                message,
            }],
            links: Default::default(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::Memory(MemoryError::EmptyContent), StatusCode::BAD_REQUEST),
            (
                AppError::Memory(MemoryError::NotFound("thread 'x'".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::Memory(MemoryError::Storage(RepositoryError::Conflict("stale".into()))),
                StatusCode::CONFLICT,
            ),
            (
                AppError::Memory(MemoryError::Embedding("offline".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::Llm(LlmError::RateLimited { retry_after_ms: None }),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (AppError::Llm(LlmError::AuthenticationFailed), StatusCode::BAD_GATEWAY),
            (AppError::Validation("k".into()), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert_eq!(err.parts().0, status, "{err:?}");
        }
    }

    #[test]
    fn test_conversation_error_conversion() {
        let err: AppError = ConversationError::Llm(LlmError::Timeout(100)).into();
        assert_eq!(err.parts().0, StatusCode::GATEWAY_TIMEOUT);
    }
}
