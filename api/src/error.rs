use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use scamtrap_core::engine::EngineError;
use scamtrap_core::error::{self, ApiError};
use scamtrap_core::oracle::TranscribeError;

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Missing or wrong API key (401)
    Unauthorized,
    /// Audio payload over the size limit (413)
    PayloadTooLarge { message: String },
    /// Audio format outside the allow-list (415)
    UnsupportedMedia { format: String },
    /// Transcription backend failed (502)
    TranscriptionFailed { message: String },
    /// Classification oracle down or timed out (503)
    ClassificationUnavailable { message: String },
    /// Internal error (500)
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: error::codes::VALIDATION_FAILED.to_string(),
                    message,
                    field,
                    received,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ApiError {
                    error: error::codes::UNAUTHORIZED.to_string(),
                    message: "Missing or invalid API key".to_string(),
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: Some("Pass your key in the x-api-key header.".to_string()),
                },
            ),
            AppError::PayloadTooLarge { message } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ApiError {
                    error: error::codes::PAYLOAD_TOO_LARGE.to_string(),
                    message,
                    field: Some("file".to_string()),
                    received: None,
                    request_id,
                    docs_hint: None,
                },
            ),
            AppError::UnsupportedMedia { format } => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                ApiError {
                    error: error::codes::UNSUPPORTED_MEDIA.to_string(),
                    message: format!("Audio format '{format}' is not supported"),
                    field: Some("file".to_string()),
                    received: Some(serde_json::Value::String(format)),
                    request_id,
                    docs_hint: Some(
                        "Supported formats: wav, mp3, m4a, ogg, flac, webm.".to_string(),
                    ),
                },
            ),
            AppError::TranscriptionFailed { message } => {
                tracing::error!(error = %message, "transcription failed");
                (
                    StatusCode::BAD_GATEWAY,
                    ApiError {
                        error: error::codes::TRANSCRIPTION_FAILED.to_string(),
                        message,
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
            AppError::ClassificationUnavailable { message } => {
                tracing::error!(error = %message, "classification oracle unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ApiError {
                        error: error::codes::CLASSIFICATION_UNAVAILABLE.to_string(),
                        message: "Classification is temporarily unavailable".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: Some("Retry the request shortly.".to_string()),
                    },
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(message) => AppError::Validation {
                message,
                field: Some("message".to_string()),
                received: None,
                docs_hint: None,
            },
            EngineError::ClassificationUnavailable(oracle) => {
                AppError::ClassificationUnavailable {
                    message: oracle.to_string(),
                }
            }
            EngineError::Transcription(TranscribeError::UnsupportedFormat(format)) => {
                AppError::UnsupportedMedia { format }
            }
            EngineError::Transcription(err @ TranscribeError::TooLarge { .. }) => {
                AppError::PayloadTooLarge {
                    message: err.to_string(),
                }
            }
            EngineError::Transcription(TranscribeError::Failed(message)) => {
                AppError::TranscriptionFailed { message }
            }
        }
    }
}
