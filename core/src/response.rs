use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::ExtractedEntities;
use crate::honeypot::{HoneypotOutcome, TerminationReason};
use crate::oracle::{Classification, ScamType, VoiceSignals};
use crate::ssf::SsfProfile;

/// How the caller wants a scam handled once detected: block it, or hand it
/// to the honeypot for intelligence extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OperationMode {
    Shield,
    Honeypot,
}

/// Strength of the evidence backing a verdict, for downstream triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvidenceLevel {
    None,
    Low,
    Medium,
    High,
}

/// Honeypot section of the response. Present only when a honeypot turn
/// actually ran for this request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HoneypotReport {
    pub session_id: String,
    pub turns_completed: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_reason: Option<TerminationReason>,
    /// Reply to relay back to the scammer while the session is live.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_reply: Option<String>,
    pub entities: ExtractedEntities,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl From<HoneypotOutcome> for HoneypotReport {
    fn from(outcome: HoneypotOutcome) -> Self {
        Self {
            session_id: outcome.session_id,
            turns_completed: outcome.turns_completed,
            termination_reason: outcome.termination_reason,
            agent_reply: outcome.agent_reply,
            entities: outcome.entities,
            summary: outcome.summary,
        }
    }
}

/// The single response shape for both text and audio analysis.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnalysisResponse {
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub operation_mode: OperationMode,
    pub is_scam: bool,
    /// Rounded to two decimal places.
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scam_type: Option<ScamType>,
    pub evidence_level: EvidenceLevel,
    pub extracted_entities: ExtractedEntities,
    pub ssf_profile: SsfProfile,
    /// Audio requests only: the transcript the verdict was computed from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_analysis: Option<VoiceSignals>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub honeypot_result: Option<HoneypotReport>,
    pub agent_summary: String,
}

/// Everything the analysis pipeline produced for one request.
pub struct ResponseContext {
    pub operation_mode: OperationMode,
    pub classification: Classification,
    pub entities: ExtractedEntities,
    pub profile: SsfProfile,
    pub transcription: Option<String>,
    pub voice_analysis: Option<VoiceSignals>,
    pub honeypot: Option<HoneypotOutcome>,
}

impl AnalysisResponse {
    pub fn from_context(ctx: ResponseContext) -> Self {
        // An engaged session has the full entity haul across turns; grade
        // the evidence on that, not just this message's extraction.
        let evidence_entities = ctx
            .honeypot
            .as_ref()
            .map(|outcome| &outcome.entities)
            .unwrap_or(&ctx.entities);
        let evidence_level = evidence_level(
            &ctx.classification,
            evidence_entities,
            &ctx.profile,
            ctx.honeypot.is_some(),
        );
        let agent_summary = agent_summary(&ctx);

        Self {
            request_id: Uuid::now_v7(),
            timestamp: Utc::now(),
            operation_mode: ctx.operation_mode,
            is_scam: ctx.classification.is_scam,
            confidence: round2(ctx.classification.confidence),
            scam_type: ctx.classification.scam_type,
            evidence_level,
            extracted_entities: ctx.entities,
            ssf_profile: ctx.profile,
            transcription: ctx.transcription,
            voice_analysis: ctx.voice_analysis,
            honeypot_result: ctx.honeypot.map(HoneypotReport::from),
            agent_summary,
        }
    }
}

/// Evidence ladder. High confidence alone is HIGH; otherwise corroborating
/// signals are scored additively and MEDIUM needs at least three points.
fn evidence_level(
    classification: &Classification,
    entities: &ExtractedEntities,
    profile: &SsfProfile,
    honeypot_engaged: bool,
) -> EvidenceLevel {
    if !classification.is_scam {
        return if entities.is_empty() {
            EvidenceLevel::None
        } else {
            EvidenceLevel::Low
        };
    }

    if classification.confidence >= 0.8 {
        return EvidenceLevel::High;
    }

    let mut score = 0u32;
    if classification.confidence >= 0.9 {
        score += 3;
    } else if classification.confidence >= 0.7 {
        score += 2;
    } else if classification.confidence >= 0.5 {
        score += 1;
    }
    match entities.count() {
        0 => {}
        1 | 2 => score += 1,
        _ => score += 2,
    }
    if profile.urgency_score >= 0.7 {
        score += 1;
    }
    if !profile.authority_claims.is_empty() {
        score += 1;
    }
    if profile.payment_escalation {
        score += 1;
    }
    if honeypot_engaged {
        score += 1;
    }

    if score >= 3 {
        EvidenceLevel::Medium
    } else {
        EvidenceLevel::Low
    }
}

fn agent_summary(ctx: &ResponseContext) -> String {
    let mut parts: Vec<String> = Vec::new();

    if ctx.classification.is_scam {
        let label = ctx
            .classification
            .scam_type
            .and_then(|t| {
                serde_json::to_value(t)
                    .ok()
                    .and_then(|v| v.as_str().map(|s| s.replace('_', " ")))
            })
            .unwrap_or_else(|| "scam activity".to_string());
        parts.push(format!(
            "Flagged as {label} with {:.0}% confidence.",
            ctx.classification.confidence * 100.0
        ));
        if ctx.profile.has_signals() {
            parts.push(ctx.profile.strategy_summary.clone());
        }
        if !ctx.entities.is_empty() {
            parts.push(format!(
                "{} actionable identifier(s) extracted.",
                ctx.entities.count()
            ));
        }
        match &ctx.honeypot {
            Some(outcome) if outcome.termination_reason.is_some() => {
                if let Some(summary) = &outcome.summary {
                    parts.push(summary.clone());
                }
            }
            Some(outcome) => {
                parts.push(format!(
                    "Honeypot engagement active ({} turn(s) completed).",
                    outcome.turns_completed
                ));
            }
            None => {}
        }
    } else {
        parts.push("No scam indicators detected.".to_string());
        if !ctx.entities.is_empty() {
            parts.push(
                "Identifiers were present in the message; verify them independently.".to_string(),
            );
        }
    }

    parts.join(" ")
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::{
        AnalysisResponse, EvidenceLevel, OperationMode, ResponseContext, evidence_level, round2,
    };
    use crate::entities::ExtractedEntities;
    use crate::honeypot::HoneypotOutcome;
    use crate::oracle::{Classification, ScamType};
    use crate::ssf::SsfProfile;

    fn scam(confidence: f64) -> Classification {
        Classification::new(true, confidence, Some(ScamType::UpiFraud), "test")
    }

    fn benign() -> Classification {
        Classification::new(false, 0.1, None, "test")
    }

    fn profile_with(urgency: f64, authority: bool, payment: bool) -> SsfProfile {
        let mut p = SsfProfile::empty();
        p.urgency_score = urgency;
        if authority {
            p.authority_claims.push("Bank".to_string());
        }
        p.payment_escalation = payment;
        p
    }

    #[test]
    fn benign_without_entities_is_none() {
        let level = evidence_level(
            &benign(),
            &ExtractedEntities::default(),
            &SsfProfile::empty(),
            false,
        );
        assert_eq!(level, EvidenceLevel::None);
    }

    #[test]
    fn benign_with_entities_is_low() {
        let entities = ExtractedEntities::extract("my id is someone@okhdfc");
        let level = evidence_level(&benign(), &entities, &SsfProfile::empty(), false);
        assert_eq!(level, EvidenceLevel::Low);
    }

    #[test]
    fn high_confidence_scam_is_high() {
        let level = evidence_level(
            &scam(0.8),
            &ExtractedEntities::default(),
            &SsfProfile::empty(),
            false,
        );
        assert_eq!(level, EvidenceLevel::High);
    }

    #[test]
    fn corroborated_mid_confidence_scam_is_medium() {
        // 0.7 confidence (+2) plus urgency (+1) crosses the bar.
        let level = evidence_level(
            &scam(0.7),
            &ExtractedEntities::default(),
            &profile_with(0.8, false, false),
            false,
        );
        assert_eq!(level, EvidenceLevel::Medium);
    }

    #[test]
    fn weak_scam_verdict_is_low() {
        let level = evidence_level(
            &scam(0.5),
            &ExtractedEntities::default(),
            &profile_with(0.0, false, false),
            false,
        );
        assert_eq!(level, EvidenceLevel::Low);
    }

    #[test]
    fn entities_and_signals_compound() {
        // 0.5 (+1), three entities (+2): medium without any SSF signal.
        let entities =
            ExtractedEntities::extract("pay a@okaxis or b@okicici or call 9876543210");
        assert_eq!(entities.count(), 3);
        let level = evidence_level(&scam(0.5), &entities, &SsfProfile::empty(), false);
        assert_eq!(level, EvidenceLevel::Medium);
    }

    #[test]
    fn engaged_session_grades_evidence_on_accumulated_entities() {
        // The triggering message carried nothing new, but the session has
        // three identifiers banked: 0.5 (+1), entities (+2) reaches medium.
        let outcome = HoneypotOutcome {
            session_id: "hp-1".to_string(),
            turns_completed: 3,
            entities: ExtractedEntities::extract("pay a@okaxis or b@okicici or call 9876543210"),
            termination_reason: None,
            agent_reply: Some("Which branch do I visit?".to_string()),
            summary: None,
        };
        let response = AnalysisResponse::from_context(ResponseContext {
            operation_mode: OperationMode::Honeypot,
            classification: scam(0.5),
            entities: ExtractedEntities::default(),
            profile: profile_with(0.0, false, false),
            transcription: None,
            voice_analysis: None,
            honeypot: Some(outcome),
        });
        assert_eq!(response.evidence_level, EvidenceLevel::Medium);

        // Without the session the same message grades low.
        let solo = AnalysisResponse::from_context(ResponseContext {
            operation_mode: OperationMode::Honeypot,
            classification: scam(0.5),
            entities: ExtractedEntities::default(),
            profile: profile_with(0.0, false, false),
            transcription: None,
            voice_analysis: None,
            honeypot: None,
        });
        assert_eq!(solo.evidence_level, EvidenceLevel::Low);
    }

    #[test]
    fn confidence_is_rounded_to_two_decimals() {
        assert!((round2(0.8567) - 0.86).abs() < f64::EPSILON);
        assert!((round2(0.854) - 0.85).abs() < f64::EPSILON);

        let response = AnalysisResponse::from_context(ResponseContext {
            operation_mode: OperationMode::Shield,
            classification: scam(0.8567),
            entities: ExtractedEntities::default(),
            profile: SsfProfile::empty(),
            transcription: None,
            voice_analysis: None,
            honeypot: None,
        });
        assert!((response.confidence - 0.86).abs() < f64::EPSILON);
    }

    #[test]
    fn summary_names_the_scam_type() {
        let response = AnalysisResponse::from_context(ResponseContext {
            operation_mode: OperationMode::Shield,
            classification: scam(0.92),
            entities: ExtractedEntities::extract("pay scammer@ybl"),
            profile: SsfProfile::empty(),
            transcription: None,
            voice_analysis: None,
            honeypot: None,
        });
        assert!(response.agent_summary.contains("upi fraud"));
        assert!(response.agent_summary.contains("92%"));
        assert_eq!(response.evidence_level, EvidenceLevel::High);
    }

    #[test]
    fn benign_summary_is_calm() {
        let response = AnalysisResponse::from_context(ResponseContext {
            operation_mode: OperationMode::Shield,
            classification: benign(),
            entities: ExtractedEntities::default(),
            profile: SsfProfile::empty(),
            transcription: None,
            voice_analysis: None,
            honeypot: None,
        });
        assert_eq!(response.agent_summary, "No scam indicators detected.");
        assert_eq!(response.evidence_level, EvidenceLevel::None);
    }

    #[test]
    fn optional_sections_are_omitted_from_json() {
        let response = AnalysisResponse::from_context(ResponseContext {
            operation_mode: OperationMode::Shield,
            classification: benign(),
            entities: ExtractedEntities::default(),
            profile: SsfProfile::empty(),
            transcription: None,
            voice_analysis: None,
            honeypot: None,
        });
        let json = serde_json::to_value(&response).expect("serializes");
        assert!(json.get("honeypot_result").is_none());
        assert!(json.get("voice_analysis").is_none());
        assert!(json.get("transcription").is_none());
        assert_eq!(json["evidence_level"], "NONE");
        assert_eq!(json["operation_mode"], "shield");
    }
}
