use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::{Json, Router, routing::post};
use serde::Deserialize;
use utoipa::ToSchema;

use scamtrap_core::response::{AnalysisResponse, OperationMode};

use crate::error::AppError;
use crate::state::AppState;

/// Multipart bodies carry up to 10 MB of audio plus form fields.
const AUDIO_BODY_LIMIT: usize = 12 * 1024 * 1024;

pub fn text_router() -> Router<AppState> {
    Router::new().route("/api/v1/analyze/text", post(analyze_text))
}

pub fn audio_router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/analyze/audio", post(analyze_audio))
        .layer(DefaultBodyLimit::max(AUDIO_BODY_LIMIT))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AnalyzeTextRequest {
    /// The suspect message, up to 10,000 characters.
    pub message: String,
    /// Defaults to shield.
    #[serde(default = "default_mode")]
    pub mode: OperationMode,
    /// Continues an existing honeypot session; omit to start a new one.
    pub session_id: Option<String>,
}

fn default_mode() -> OperationMode {
    OperationMode::Shield
}

/// Analyze a text message for scam signals
#[utoipa::path(
    post,
    path = "/api/v1/analyze/text",
    request_body = AnalyzeTextRequest,
    responses(
        (status = 200, description = "Analysis result", body = AnalysisResponse),
        (status = 400, description = "Invalid request", body = scamtrap_core::error::ApiError),
        (status = 401, description = "Missing or invalid API key", body = scamtrap_core::error::ApiError),
        (status = 503, description = "Classification unavailable", body = scamtrap_core::error::ApiError)
    ),
    security(("api_key" = [])),
    tag = "analysis"
)]
pub async fn analyze_text(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeTextRequest>,
) -> Result<Json<AnalysisResponse>, AppError> {
    let response = state
        .engine
        .analyze_text(&request.message, request.mode, request.session_id.as_deref())
        .await?;

    tracing::info!(
        request_id = %response.request_id,
        is_scam = response.is_scam,
        confidence = response.confidence,
        mode = ?response.operation_mode,
        "text analysis completed"
    );

    Ok(Json(response))
}

/// Analyze an audio recording for scam signals
///
/// Multipart form: `file` (required audio upload), `mode` (optional,
/// "shield" or "honeypot"), `session_id` (optional).
#[utoipa::path(
    post,
    path = "/api/v1/analyze/audio",
    responses(
        (status = 200, description = "Analysis result", body = AnalysisResponse),
        (status = 400, description = "Invalid request", body = scamtrap_core::error::ApiError),
        (status = 401, description = "Missing or invalid API key", body = scamtrap_core::error::ApiError),
        (status = 413, description = "Audio too large", body = scamtrap_core::error::ApiError),
        (status = 415, description = "Unsupported audio format", body = scamtrap_core::error::ApiError),
        (status = 502, description = "Transcription failed", body = scamtrap_core::error::ApiError)
    ),
    security(("api_key" = [])),
    tag = "analysis"
)]
pub async fn analyze_audio(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnalysisResponse>, AppError> {
    let mut audio: Option<(Vec<u8>, String)> = None;
    let mut mode = OperationMode::Shield;
    let mut session_id: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        AppError::Validation {
            message: format!("invalid multipart body: {err}"),
            field: None,
            received: None,
            docs_hint: None,
        }
    })? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let format = audio_format(field.file_name())?;
                let bytes = field.bytes().await.map_err(|err| AppError::Validation {
                    message: format!("failed to read audio upload: {err}"),
                    field: Some("file".to_string()),
                    received: None,
                    docs_hint: None,
                })?;
                audio = Some((bytes.to_vec(), format));
            }
            Some("mode") => {
                let raw = field.text().await.unwrap_or_default();
                mode = parse_mode(&raw)?;
            }
            Some("session_id") => {
                let raw = field.text().await.unwrap_or_default();
                if !raw.trim().is_empty() {
                    session_id = Some(raw.trim().to_string());
                }
            }
            _ => {}
        }
    }

    let Some((bytes, format)) = audio else {
        return Err(AppError::Validation {
            message: "multipart field 'file' is required".to_string(),
            field: Some("file".to_string()),
            received: None,
            docs_hint: Some("Upload the audio as a 'file' form field.".to_string()),
        });
    };

    let response = state
        .engine
        .analyze_audio(&bytes, &format, mode, session_id.as_deref())
        .await?;

    tracing::info!(
        request_id = %response.request_id,
        is_scam = response.is_scam,
        confidence = response.confidence,
        format = %format,
        "audio analysis completed"
    );

    Ok(Json(response))
}

/// Lowercased filename extension of the upload.
fn audio_format(file_name: Option<&str>) -> Result<String, AppError> {
    file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_lowercase())
        .ok_or_else(|| AppError::Validation {
            message: "audio filename must carry an extension".to_string(),
            field: Some("file".to_string()),
            received: file_name.map(|n| serde_json::Value::String(n.to_string())),
            docs_hint: Some("Name the upload e.g. recording.wav or call.mp3.".to_string()),
        })
}

fn parse_mode(raw: &str) -> Result<OperationMode, AppError> {
    match raw.trim().to_lowercase().as_str() {
        "" | "shield" => Ok(OperationMode::Shield),
        "honeypot" => Ok(OperationMode::Honeypot),
        other => Err(AppError::Validation {
            message: format!("unknown mode '{other}'"),
            field: Some("mode".to_string()),
            received: Some(serde_json::Value::String(other.to_string())),
            docs_hint: Some("Valid modes: shield, honeypot.".to_string()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{audio_format, parse_mode};
    use scamtrap_core::response::OperationMode;

    #[test]
    fn format_comes_from_the_filename_extension() {
        assert_eq!(audio_format(Some("call.WAV")).expect("valid"), "wav");
        assert!(audio_format(Some("noextension")).is_err());
        assert!(audio_format(None).is_err());
    }

    #[test]
    fn mode_parsing_defaults_to_shield() {
        assert_eq!(parse_mode("").expect("valid"), OperationMode::Shield);
        assert_eq!(parse_mode("Honeypot").expect("valid"), OperationMode::Honeypot);
        assert!(parse_mode("stealth").is_err());
    }
}
