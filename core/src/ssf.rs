use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::Lexicons;
use crate::oracle::{Classification, VoiceSignals};

const MAX_URGENCY_PHRASES: usize = 10;

// Urgency blend weights: textual signal dominates, voice is a bounded boost.
const TEXT_WEIGHT: f64 = 0.6;
const VOICE_CEILING: f64 = 0.4;
const PHRASE_SATURATION: f64 = 5.0;

/// Scam Strategy Fingerprint: the manipulation tactics detected in one
/// message. Derived, stateless, recomputed per analysis call.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SsfProfile {
    /// Urgency level in [0, 1], rounded to two decimals.
    pub urgency_score: f64,
    /// Impersonated institutions in order of first appearance.
    pub authority_claims: Vec<String>,
    pub payment_escalation: bool,
    /// Channel the scammer tries to move the conversation to, if any.
    pub channel_switch_intent: Option<String>,
    /// Matched urgency phrases, first-appearance order, capped at ten.
    pub urgency_phrases: Vec<String>,
    /// Deterministic template-assembled description of the strategy.
    pub strategy_summary: String,
}

impl SsfProfile {
    /// Profile for text carrying no signal at all.
    pub fn empty() -> Self {
        Self {
            urgency_score: 0.0,
            authority_claims: Vec::new(),
            payment_escalation: false,
            channel_switch_intent: None,
            urgency_phrases: Vec::new(),
            strategy_summary: String::new(),
        }
    }

    /// True when any manipulation signal is present. Feeds the evidence-level
    /// decision table.
    pub fn has_signals(&self) -> bool {
        self.urgency_score > 0.0
            || !self.authority_claims.is_empty()
            || self.payment_escalation
            || self.channel_switch_intent.is_some()
    }
}

/// Compiles the configured lexicons once and scans messages against them.
/// This component never fails: unmatchable input yields the empty profile.
pub struct SsfEngine {
    urgency: Vec<Regex>,
    authority: Vec<(String, Regex)>,
    channel: Vec<(String, Regex)>,
    payment: Vec<Regex>,
}

impl SsfEngine {
    /// Compile the pattern tables. Rows that fail to compile are dropped with
    /// a warning rather than poisoning the whole engine.
    pub fn new(lexicons: &Lexicons) -> Self {
        Self {
            urgency: compile_rows(&lexicons.urgency),
            authority: compile_labeled(&lexicons.authority),
            channel: compile_labeled(&lexicons.channel),
            payment: compile_rows(&lexicons.payment),
        }
    }

    /// Fingerprint a message. `classification` feeds the payment-escalation
    /// OR-rule; `voice` feeds the urgency blend.
    pub fn analyze(
        &self,
        text: &str,
        voice: Option<&VoiceSignals>,
        classification: Option<&Classification>,
    ) -> SsfProfile {
        if text.trim().is_empty() {
            return SsfProfile::empty();
        }

        let urgency_phrases = self.detect_urgency_phrases(text);
        let urgency_score = blend_urgency(urgency_phrases.len(), voice);
        let authority_claims = self.detect_authority_claims(text);
        let channel_switch_intent = self.detect_channel_switch(text);

        let payment_hits = self.payment.iter().filter(|p| p.is_match(text)).count();
        let type_demands_payment = classification
            .and_then(|c| c.scam_type)
            .is_some_and(|t| t.demands_payment());
        let payment_escalation = (payment_hits >= 1 && !urgency_phrases.is_empty())
            || payment_hits >= 2
            || type_demands_payment;

        let strategy_summary = summarize(
            urgency_score,
            &authority_claims,
            payment_escalation,
            channel_switch_intent.as_deref(),
        );

        SsfProfile {
            urgency_score,
            authority_claims,
            payment_escalation,
            channel_switch_intent,
            urgency_phrases,
            strategy_summary,
        }
    }

    fn detect_urgency_phrases(&self, text: &str) -> Vec<String> {
        let mut phrases: Vec<String> = Vec::new();
        let mut hits: Vec<(usize, String)> = Vec::new();
        for pattern in &self.urgency {
            for m in pattern.find_iter(text) {
                hits.push((m.start(), m.as_str().to_lowercase()));
            }
        }
        hits.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, phrase) in hits {
            if !phrases.contains(&phrase) {
                phrases.push(phrase);
            }
            if phrases.len() == MAX_URGENCY_PHRASES {
                break;
            }
        }
        phrases
    }

    fn detect_authority_claims(&self, text: &str) -> Vec<String> {
        let mut claims: Vec<(usize, &str)> = self
            .authority
            .iter()
            .filter_map(|(label, pattern)| {
                pattern.find(text).map(|m| (m.start(), label.as_str()))
            })
            .collect();
        claims.sort_by(|a, b| a.0.cmp(&b.0));
        claims.into_iter().map(|(_, label)| label.to_string()).collect()
    }

    fn detect_channel_switch(&self, text: &str) -> Option<String> {
        self.channel
            .iter()
            .find(|(_, pattern)| pattern.is_match(text))
            .map(|(label, _)| label.clone())
    }
}

/// Convex-ish blend of textual and voice urgency. Monotonic in both inputs,
/// clamped to [0, 1], rounded to two decimals for exposure.
fn blend_urgency(phrase_count: usize, voice: Option<&VoiceSignals>) -> f64 {
    let text_score = (phrase_count as f64 / PHRASE_SATURATION).min(1.0) * TEXT_WEIGHT;

    let mut voice_score: f64 = 0.0;
    if let Some(signals) = voice {
        if signals.speech_rate > 160.0 {
            voice_score += 0.15;
        }
        if signals.speech_rate > 200.0 {
            voice_score += 0.10;
        }
        if signals.repetition_detected {
            voice_score += 0.10;
        }
        if signals.urgency_indicators.iter().any(|i| i == "continuous_speech") {
            voice_score += 0.05;
        }
    }

    let blended = (text_score + voice_score.min(VOICE_CEILING)).clamp(0.0, 1.0);
    (blended * 100.0).round() / 100.0
}

/// Fixed priority order: urgency > authority > payment > channel. Clauses for
/// absent signals are omitted; output is byte-stable for identical inputs.
fn summarize(
    urgency_score: f64,
    authority_claims: &[String],
    payment_escalation: bool,
    channel: Option<&str>,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if urgency_score > 0.7 {
        parts.push("High-pressure urgency tactics detected".to_string());
    } else if urgency_score > 0.4 {
        parts.push("Moderate urgency indicators present".to_string());
    }

    if !authority_claims.is_empty() {
        parts.push(format!("Impersonates: {}", authority_claims.join(", ")));
    }

    if payment_escalation {
        parts.push("Contains payment/financial demands".to_string());
    }

    if let Some(channel) = channel {
        parts.push(format!("Attempts to redirect to {channel}"));
    }

    if parts.is_empty() {
        return "No notable social-engineering patterns detected".to_string();
    }

    format!("{}.", parts.join(". "))
}

fn compile_rows(rows: &[String]) -> Vec<Regex> {
    rows.iter()
        .filter_map(|row| match case_insensitive(row) {
            Ok(re) => Some(re),
            Err(err) => {
                tracing::warn!(pattern = %row, error = %err, "dropping invalid lexicon row");
                None
            }
        })
        .collect()
}

fn compile_labeled(rows: &[(String, String)]) -> Vec<(String, Regex)> {
    rows.iter()
        .filter_map(|(label, row)| match case_insensitive(row) {
            Ok(re) => Some((label.clone(), re)),
            Err(err) => {
                tracing::warn!(pattern = %row, error = %err, "dropping invalid lexicon row");
                None
            }
        })
        .collect()
}

fn case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

#[cfg(test)]
mod tests {
    use super::{SsfEngine, blend_urgency};
    use crate::config::Lexicons;
    use crate::oracle::{Classification, ScamType, VoiceSignals};

    fn engine() -> SsfEngine {
        SsfEngine::new(&Lexicons::default())
    }

    #[test]
    fn detects_urgency_keywords() {
        let profile = engine().analyze("This is urgent! Please respond immediately.", None, None);
        assert!(profile.urgency_score > 0.0);
        assert!(profile.urgency_phrases.iter().any(|p| p.contains("urgent")));
        assert!(profile.urgency_phrases.iter().any(|p| p.contains("immediately")));
    }

    #[test]
    fn authority_claims_in_first_appearance_order() {
        let profile = engine().analyze(
            "The police have informed the RBI about your account.",
            None,
            None,
        );
        assert_eq!(profile.authority_claims, vec!["Police", "RBI"]);
    }

    #[test]
    fn authority_claims_deduplicated_per_label() {
        let profile = engine().analyze("police police police and more police", None, None);
        assert_eq!(profile.authority_claims, vec!["Police"]);
    }

    #[test]
    fn payment_plus_urgency_escalates() {
        let profile = engine().analyze("Pay the fine immediately to avoid arrest.", None, None);
        assert!(profile.payment_escalation);
    }

    #[test]
    fn payment_type_alone_escalates() {
        let classification =
            Classification::new(true, 0.95, Some(ScamType::CardFraud), "card number request");
        let profile = engine().analyze("Tell your card number.", None, Some(&classification));
        assert!(profile.payment_escalation);
    }

    #[test]
    fn benign_payment_mention_does_not_escalate() {
        let profile = engine().analyze(
            "GPay the amount of 25 in this contact number 635352423",
            None,
            None,
        );
        assert!(!profile.payment_escalation);
    }

    #[test]
    fn detects_whatsapp_channel_switch() {
        let profile = engine().analyze("Contact us on WhatsApp: 9876543210", None, None);
        assert_eq!(profile.channel_switch_intent.as_deref(), Some("WhatsApp"));
    }

    #[test]
    fn no_channel_switch_in_plain_text() {
        let profile = engine().analyze("Your parcel arrives tomorrow morning.", None, None);
        assert!(profile.channel_switch_intent.is_none());
    }

    #[test]
    fn voice_signals_raise_urgency_monotonically() {
        let text = "Please verify your account details.";
        let without = engine().analyze(text, None, None);
        let voice = VoiceSignals {
            speech_rate: 210.0,
            urgency_indicators: vec!["continuous_speech".to_string()],
            repetition_detected: true,
        };
        let with = engine().analyze(text, Some(&voice), None);
        assert!(with.urgency_score > without.urgency_score);
    }

    #[test]
    fn urgency_score_is_bounded_under_saturation() {
        let text = "URGENT! Act now! Immediately! Final warning! Last chance! Hurry! \
                    Account blocked! Legal action! Verify now! Emergency!";
        let voice = VoiceSignals {
            speech_rate: 260.0,
            urgency_indicators: vec!["continuous_speech".to_string()],
            repetition_detected: true,
        };
        let profile = engine().analyze(text, Some(&voice), None);
        assert!(profile.urgency_score <= 1.0);
        assert!(profile.urgency_phrases.len() <= 10);
    }

    #[test]
    fn blend_is_monotonic_in_phrase_count() {
        let low = blend_urgency(1, None);
        let high = blend_urgency(4, None);
        assert!(high > low);
    }

    #[test]
    fn empty_text_yields_empty_profile() {
        let profile = engine().analyze("   \n\t  ", None, None);
        assert_eq!(profile.urgency_score, 0.0);
        assert!(profile.authority_claims.is_empty());
        assert!(!profile.payment_escalation);
        assert!(profile.channel_switch_intent.is_none());
        assert!(profile.strategy_summary.is_empty());
        assert!(!profile.has_signals());
    }

    #[test]
    fn summary_is_byte_stable() {
        let text = "URGENT: the police demand you pay the fine now on WhatsApp";
        let a = engine().analyze(text, None, None).strategy_summary;
        let b = engine().analyze(text, None, None).strategy_summary;
        assert_eq!(a, b);
        assert!(a.contains("Impersonates: Police"));
    }

    #[test]
    fn detection_is_case_insensitive() {
        let upper = engine().analyze("URGENT ACTION REQUIRED", None, None);
        let lower = engine().analyze("urgent action required", None, None);
        assert_eq!(upper.urgency_score, lower.urgency_score);
    }
}
