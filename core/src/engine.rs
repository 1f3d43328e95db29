use std::sync::Arc;

use uuid::Uuid;

use crate::cache::{CacheKey, ClassifierCache};
use crate::config::EngineConfig;
use crate::entities::ExtractedEntities;
use crate::honeypot::SessionStore;
use crate::oracle::{
    Classification, Classifier, OracleError, TranscribeError, Transcriber, VoiceSignals,
};
use crate::response::{AnalysisResponse, OperationMode, ResponseContext};
use crate::ssf::SsfEngine;

/// Hard ceiling on message length after sanitization.
const MAX_MESSAGE_CHARS: usize = 10_000;
/// Audio formats the transcription path accepts.
const AUDIO_FORMATS: &[&str] = &["wav", "mp3", "m4a", "ogg", "flac", "webm"];
/// Hard ceiling on audio payload size.
const MAX_AUDIO_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),
    #[error("classification unavailable: {0}")]
    ClassificationUnavailable(#[from] OracleError),
    #[error(transparent)]
    Transcription(#[from] TranscribeError),
}

/// The analysis pipeline: sanitize, classify (cached), extract entities,
/// profile social-engineering signals, and optionally drive one honeypot
/// turn. Holds no request state of its own; all mutable state lives in the
/// cache and the session store.
pub struct AnalysisEngine {
    classifier: Arc<dyn Classifier>,
    transcriber: Arc<dyn Transcriber>,
    cache: ClassifierCache,
    sessions: SessionStore,
    ssf: SsfEngine,
    config: EngineConfig,
}

impl AnalysisEngine {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        transcriber: Arc<dyn Transcriber>,
        config: EngineConfig,
    ) -> Self {
        Self {
            classifier,
            transcriber,
            cache: ClassifierCache::new(config.cache_ttl, config.cache_capacity),
            sessions: SessionStore::new(),
            ssf: SsfEngine::new(&config.lexicons),
            config,
        }
    }

    pub async fn analyze_text(
        &self,
        message: &str,
        mode: OperationMode,
        session_id: Option<&str>,
    ) -> Result<AnalysisResponse, EngineError> {
        let sanitized = sanitize(message)?;
        self.analyze_inner(&sanitized, mode, session_id, None, None)
            .await
    }

    pub async fn analyze_audio(
        &self,
        audio: &[u8],
        format: &str,
        mode: OperationMode,
        session_id: Option<&str>,
    ) -> Result<AnalysisResponse, EngineError> {
        let format = format.trim().to_lowercase();
        if !AUDIO_FORMATS.contains(&format.as_str()) {
            return Err(EngineError::Transcription(TranscribeError::UnsupportedFormat(format)));
        }
        if audio.len() > MAX_AUDIO_BYTES {
            return Err(EngineError::Transcription(TranscribeError::TooLarge {
                limit_mb: (MAX_AUDIO_BYTES / (1024 * 1024)) as u64,
                actual_mb: audio.len() as f64 / (1024.0 * 1024.0),
            }));
        }
        if audio.is_empty() {
            return Err(EngineError::Validation("audio payload is empty".to_string()));
        }

        let transcription = tokio::time::timeout(
            self.config.oracle_timeout,
            self.transcriber.transcribe(audio, &format),
        )
        .await
        .map_err(|_| {
            EngineError::Transcription(TranscribeError::Failed("transcription timed out".into()))
        })??;

        let sanitized = sanitize(&transcription.text)?;
        self.analyze_inner(
            &sanitized,
            mode,
            session_id,
            Some(transcription.text.clone()),
            transcription.voice_signals,
        )
        .await
    }

    async fn analyze_inner(
        &self,
        text: &str,
        mode: OperationMode,
        session_id: Option<&str>,
        transcription: Option<String>,
        voice: Option<VoiceSignals>,
    ) -> Result<AnalysisResponse, EngineError> {
        let classification = self.classify_cached(text, mode).await?;
        let entities = ExtractedEntities::extract(text);
        let profile = self
            .ssf
            .analyze(text, voice.as_ref(), Some(&classification));

        let honeypot = if self.should_engage(mode, &classification) {
            let id = session_id
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::now_v7().to_string());
            Some(
                self.sessions
                    .run_turn(&id, text, Some(profile.clone()), self.classifier.as_ref(), &self.config)
                    .await,
            )
        } else {
            None
        };

        Ok(AnalysisResponse::from_context(ResponseContext {
            operation_mode: mode,
            classification,
            entities,
            profile,
            transcription,
            voice_analysis: voice,
            honeypot,
        }))
    }

    /// Honeypot gate: explicit opt-in, a scam verdict, and confidence at or
    /// above the threshold. Anything weaker stays in shield behavior.
    fn should_engage(&self, mode: OperationMode, classification: &Classification) -> bool {
        mode == OperationMode::Honeypot
            && classification.is_scam
            && classification.confidence >= self.config.honeypot_confidence_threshold
    }

    async fn classify_cached(
        &self,
        text: &str,
        mode: OperationMode,
    ) -> Result<Classification, EngineError> {
        let key = CacheKey::new(text, mode);
        if let Some(hit) = self.cache.get(&key).await {
            tracing::debug!("classification served from cache");
            return Ok(hit);
        }

        let classification = tokio::time::timeout(
            self.config.oracle_timeout,
            self.classifier.classify(text, &[]),
        )
        .await
        .map_err(|_| OracleError::Timeout)??;

        self.cache.insert(key, classification.clone()).await;
        Ok(classification)
    }
}

/// Strip control characters (newlines and tabs survive), collapse nothing
/// else. Empty or oversized input is a validation error, not a truncation.
fn sanitize(message: &str) -> Result<String, EngineError> {
    let cleaned: String = message
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    let cleaned = cleaned.trim().to_string();

    if cleaned.is_empty() {
        return Err(EngineError::Validation("message must not be empty".to_string()));
    }
    if cleaned.chars().count() > MAX_MESSAGE_CHARS {
        return Err(EngineError::Validation(format!(
            "message exceeds {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(cleaned)
}
