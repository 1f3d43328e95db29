use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::{Value, json};

use scamtrap_core::oracle::{
    Classification, Classifier, OracleError, ScamType, Speaker, TranscribeError, Transcriber,
    Transcription, TranscriptEntry, VoiceSignals,
};

const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const CLASSIFY_INSTRUCTIONS: &str = "\
You are a scam-detection analyst for messages circulating in India. \
Decide whether the message is a scam attempt. Respond with ONLY a JSON object, \
no prose, of the shape: {\"is_scam\": bool, \"confidence\": number between 0 and 1, \
\"scam_type\": one of [\"card_fraud\", \"bank_impersonation\", \"upi_fraud\", \"phishing\", \
\"lottery_scam\", \"tech_support_scam\", \"investment_scam\", \"romance_scam\", \"job_scam\", \
\"government_impersonation\"] or null, \"rationale\": short string}.";

const REPLY_INSTRUCTIONS: &str = "\
You are playing a gullible, slightly confused person who believes the caller. \
Keep them talking: ask clarifying questions about exactly where to send the money, \
which number to call back, which app to use. Never reveal real personal data, never \
send anything, never hint that you suspect a scam. Answer with the reply text only, \
one or two short sentences.";

const TRANSCRIBE_INSTRUCTIONS: &str = "\
Transcribe this audio of a phone call or voice note. Also estimate delivery signals. \
Respond with ONLY a JSON object: {\"text\": full transcript, \"speech_rate_wpm\": number, \
\"repetition_detected\": bool, \"urgency_indicators\": array drawn from \
[\"fast_speech\", \"continuous_speech\", \"repetitive_phrases\"]}.";

/// Client for the Gemini generateContent API, backing both oracle traits.
/// Deadlines are owned by the engine; this client only caps the transport.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        let model =
            std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let base_url =
            std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            api_key,
            model,
            base_url,
        }
    }

    async fn generate(&self, parts: Vec<Value>) -> Result<String, OracleError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": { "temperature": 0.2 }
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| OracleError::Unavailable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Unavailable(format!(
                "gemini returned HTTP {status}"
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|err| OracleError::Malformed(err.to_string()))?;

        extract_text(&payload)
            .ok_or_else(|| OracleError::Malformed("no candidate text in response".to_string()))
    }
}

/// Concatenated text parts of the first candidate.
fn extract_text(payload: &Value) -> Option<String> {
    let parts = payload
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() { None } else { Some(text) }
}

/// Models often wrap JSON answers in markdown fences despite instructions.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[derive(Deserialize)]
struct RawVerdict {
    is_scam: bool,
    confidence: f64,
    scam_type: Option<String>,
    rationale: Option<String>,
}

fn parse_verdict(text: &str) -> Result<Classification, OracleError> {
    let raw: RawVerdict = serde_json::from_str(strip_code_fences(text))
        .map_err(|err| OracleError::Malformed(format!("verdict is not valid JSON: {err}")))?;

    let scam_type = raw
        .scam_type
        .as_deref()
        .and_then(ScamType::parse_lenient);

    Ok(Classification::new(
        raw.is_scam,
        raw.confidence,
        scam_type,
        raw.rationale.unwrap_or_default(),
    ))
}

#[derive(Deserialize)]
struct RawTranscription {
    text: String,
    #[serde(default)]
    speech_rate_wpm: f64,
    #[serde(default)]
    repetition_detected: bool,
    #[serde(default)]
    urgency_indicators: Vec<String>,
}

fn parse_transcription(text: &str) -> Result<Transcription, TranscribeError> {
    let raw: RawTranscription = serde_json::from_str(strip_code_fences(text))
        .map_err(|err| TranscribeError::Failed(format!("transcript is not valid JSON: {err}")))?;

    Ok(Transcription {
        text: raw.text,
        voice_signals: Some(VoiceSignals {
            speech_rate: raw.speech_rate_wpm,
            urgency_indicators: raw.urgency_indicators,
            repetition_detected: raw.repetition_detected,
        }),
    })
}

fn render_transcript(transcript: &[TranscriptEntry]) -> String {
    transcript
        .iter()
        .map(|entry| match entry.speaker {
            Speaker::Scammer => format!("Caller: {}", entry.text),
            Speaker::Agent => format!("You: {}", entry.text),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn mime_type(format: &str) -> &'static str {
    match format {
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        _ => "audio/webm",
    }
}

#[async_trait]
impl Classifier for GeminiClient {
    async fn classify(
        &self,
        text: &str,
        history: &[TranscriptEntry],
    ) -> Result<Classification, OracleError> {
        let mut prompt = format!("{CLASSIFY_INSTRUCTIONS}\n\nMessage:\n{text}");
        if !history.is_empty() {
            prompt.push_str(&format!(
                "\n\nEarlier conversation:\n{}",
                render_transcript(history)
            ));
        }
        let answer = self.generate(vec![json!({ "text": prompt })]).await?;
        parse_verdict(&answer)
    }

    async fn reply(&self, transcript: &[TranscriptEntry]) -> Result<String, OracleError> {
        let prompt = format!(
            "{REPLY_INSTRUCTIONS}\n\nConversation so far:\n{}",
            render_transcript(transcript)
        );
        let answer = self.generate(vec![json!({ "text": prompt })]).await?;
        Ok(answer.trim().to_string())
    }
}

#[async_trait]
impl Transcriber for GeminiClient {
    async fn transcribe(
        &self,
        audio: &[u8],
        format: &str,
    ) -> Result<Transcription, TranscribeError> {
        let parts = vec![
            json!({ "text": TRANSCRIBE_INSTRUCTIONS }),
            json!({
                "inline_data": {
                    "mime_type": mime_type(format),
                    "data": BASE64.encode(audio),
                }
            }),
        ];
        let answer = self
            .generate(parts)
            .await
            .map_err(|err| TranscribeError::Failed(err.to_string()))?;
        parse_transcription(&answer)
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_transcription, parse_verdict, strip_code_fences};
    use scamtrap_core::oracle::ScamType;

    #[test]
    fn strips_markdown_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn parses_a_well_formed_verdict() {
        let verdict = parse_verdict(
            r#"{"is_scam": true, "confidence": 0.93, "scam_type": "upi_fraud", "rationale": "payment demand"}"#,
        )
        .expect("should parse");
        assert!(verdict.is_scam);
        assert_eq!(verdict.scam_type, Some(ScamType::UpiFraud));
    }

    #[test]
    fn unknown_scam_type_degrades_to_none() {
        let verdict = parse_verdict(
            r#"{"is_scam": true, "confidence": 0.9, "scam_type": "brand_new_scheme", "rationale": ""}"#,
        )
        .expect("should parse");
        assert!(verdict.scam_type.is_none());
    }

    #[test]
    fn out_of_range_confidence_is_clamped() {
        let verdict =
            parse_verdict(r#"{"is_scam": true, "confidence": 1.7, "scam_type": null, "rationale": ""}"#)
                .expect("should parse");
        assert!((verdict.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn malformed_verdict_is_an_error() {
        assert!(parse_verdict("the message looks scammy to me").is_err());
    }

    #[test]
    fn parses_transcription_with_defaults() {
        let t = parse_transcription(r#"{"text": "hello there"}"#).expect("should parse");
        assert_eq!(t.text, "hello there");
        let signals = t.voice_signals.expect("signals");
        assert_eq!(signals.speech_rate, 0.0);
        assert!(!signals.repetition_detected);
    }
}
