use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Closed set of scam categories the oracle may return. Labels outside this
/// set deserialize to `None` at the client boundary rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScamType {
    CardFraud,
    BankImpersonation,
    UpiFraud,
    Phishing,
    LotteryScam,
    TechSupportScam,
    InvestmentScam,
    RomanceScam,
    JobScam,
    GovernmentImpersonation,
}

impl ScamType {
    /// Categories whose defining move is a payment demand. Used by the SSF
    /// engine's payment-escalation OR-rule.
    pub fn demands_payment(self) -> bool {
        matches!(
            self,
            ScamType::CardFraud
                | ScamType::BankImpersonation
                | ScamType::UpiFraud
                | ScamType::LotteryScam
                | ScamType::InvestmentScam
        )
    }

    /// Parse an oracle label leniently; unknown labels become `None`.
    pub fn parse_lenient(label: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(label.to_string())).ok()
    }
}

/// Classification verdict for a single message. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Classification {
    pub is_scam: bool,
    /// Always clamped to [0, 1] by the producing client.
    pub confidence: f64,
    pub scam_type: Option<ScamType>,
    /// The oracle's free-form rationale. Informational only.
    pub rationale: String,
}

impl Classification {
    pub fn new(
        is_scam: bool,
        confidence: f64,
        scam_type: Option<ScamType>,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            is_scam,
            confidence: confidence.clamp(0.0, 1.0),
            scam_type,
            rationale: rationale.into(),
        }
    }
}

/// One entry of a honeypot transcript, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Scammer,
    Agent,
}

/// Failures from the classification oracle. Never cached; the honeypot
/// converts these into a terminal reason instead of propagating.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("oracle call timed out")]
    Timeout,
    #[error("oracle returned a malformed response: {0}")]
    Malformed(String),
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
}

/// Voice-derived signals attached to a transcription. Feeds the SSF urgency
/// blend as the secondary input.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct VoiceSignals {
    /// Estimated words per minute.
    pub speech_rate: f64,
    /// e.g. "fast_speech", "continuous_speech", "repetitive_phrases"
    pub urgency_indicators: Vec<String>,
    pub repetition_detected: bool,
}

#[derive(Debug, Clone)]
pub struct Transcription {
    pub text: String,
    pub voice_signals: Option<VoiceSignals>,
}

#[derive(Debug, thiserror::Error)]
pub enum TranscribeError {
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),
    #[error("audio payload too large: {actual_mb:.2} MB (limit {limit_mb} MB)")]
    TooLarge { limit_mb: u64, actual_mb: f64 },
    #[error("transcription failed: {0}")]
    Failed(String),
}

/// The classification oracle. Implementations wrap an external model; tests
/// substitute deterministic fakes. Both calls are the only suspension points
/// in the analysis path and must enforce their own deadlines.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify a message, optionally in the context of prior conversation.
    async fn classify(
        &self,
        text: &str,
        history: &[TranscriptEntry],
    ) -> Result<Classification, OracleError>;

    /// Generate the next honeypot engagement reply given the transcript so
    /// far (last entry is the scammer's latest message).
    async fn reply(&self, transcript: &[TranscriptEntry]) -> Result<String, OracleError>;
}

/// The transcription backend for audio inputs.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio: &[u8],
        format: &str,
    ) -> Result<Transcription, TranscribeError>;
}

#[cfg(test)]
mod tests {
    use super::ScamType;

    #[test]
    fn scam_type_parses_snake_case_labels() {
        assert_eq!(ScamType::parse_lenient("card_fraud"), Some(ScamType::CardFraud));
        assert_eq!(
            ScamType::parse_lenient("government_impersonation"),
            Some(ScamType::GovernmentImpersonation)
        );
        assert_eq!(ScamType::parse_lenient("alien_abduction"), None);
    }

    #[test]
    fn payment_demanding_set_is_stable() {
        assert!(ScamType::CardFraud.demands_payment());
        assert!(ScamType::UpiFraud.demands_payment());
        assert!(!ScamType::RomanceScam.demands_payment());
        assert!(!ScamType::Phishing.demands_payment());
    }
}
