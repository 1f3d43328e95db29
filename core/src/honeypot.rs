use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use utoipa::ToSchema;

use crate::config::EngineConfig;
use crate::entities::ExtractedEntities;
use crate::oracle::{Classifier, Speaker, TranscriptEntry};
use crate::ssf::SsfProfile;

/// Near-duplicate threshold for the repeated-pattern kill-switch.
const REPEAT_SIMILARITY: f64 = 0.8;
/// Flat entity count that counts as sufficient intelligence on its own.
const SUFFICIENT_ENTITY_COUNT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    MaxTurnsReached,
    NoProgress,
    RepeatedPattern,
    ExtractionComplete,
    OracleUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Terminated(TerminationReason),
}

/// What the state machine decided for one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDecision {
    /// Keep engaging: generate a reply via the oracle.
    Engage,
    Terminate(TerminationReason),
}

/// One honeypot engagement. Owned exclusively by the session store for the
/// lifetime of the engagement; never persisted.
#[derive(Debug)]
pub struct HoneypotSession {
    pub session_id: String,
    pub turn_count: u32,
    /// Running union of everything extracted so far. Only ever grows.
    pub entities: ExtractedEntities,
    /// Snapshot of the accumulated set after each turn.
    pub entities_per_turn: Vec<ExtractedEntities>,
    pub last_new_entity_turn: u32,
    no_progress_streak: u32,
    pub transcript: Vec<TranscriptEntry>,
    /// SSF profile observed at each turn; feeds the termination narrative.
    pub ssf_history: Vec<SsfProfile>,
    pub status: SessionStatus,
    last_activity: Instant,
}

impl HoneypotSession {
    fn new(session_id: String) -> Self {
        Self {
            session_id,
            turn_count: 0,
            entities: ExtractedEntities::default(),
            entities_per_turn: Vec::new(),
            last_new_entity_turn: 0,
            no_progress_streak: 0,
            transcript: Vec::new(),
            ssf_history: Vec::new(),
            status: SessionStatus::Active,
            last_activity: Instant::now(),
        }
    }

    /// Absorb one inbound scammer message: append to the transcript, union
    /// the extracted entities, and update the progress bookkeeping.
    fn absorb_inbound(&mut self, inbound: &str, profile: Option<SsfProfile>) {
        self.transcript.push(TranscriptEntry {
            speaker: Speaker::Scammer,
            text: inbound.to_string(),
        });

        let before = self.entities.count();
        let turn_entities = ExtractedEntities::extract(inbound);
        self.entities.merge(&turn_entities);
        self.entities_per_turn.push(self.entities.clone());

        if self.entities.count() > before {
            self.last_new_entity_turn = self.turn_count + 1;
            self.no_progress_streak = 0;
        } else {
            self.no_progress_streak += 1;
        }

        if let Some(profile) = profile {
            self.ssf_history.push(profile);
        }
        self.last_activity = Instant::now();
    }

    /// Pure transition: decide, without side effects, whether this session
    /// keeps engaging after absorbing `inbound`. Kill-switches are evaluated
    /// in a fixed order; the first match wins.
    pub fn evaluate(&self, inbound: &str, config: &EngineConfig) -> TurnDecision {
        if self.turn_count >= config.honeypot_max_turns {
            return TurnDecision::Terminate(TerminationReason::MaxTurnsReached);
        }

        if self.no_progress_streak >= config.honeypot_no_progress_turns {
            return TurnDecision::Terminate(TerminationReason::NoProgress);
        }

        if self.is_repeated_pattern(inbound) {
            return TurnDecision::Terminate(TerminationReason::RepeatedPattern);
        }

        let sufficient = (self.entities.has_payment_identifier()
            && self.entities.has_contact_channel())
            || self.entities.count() >= SUFFICIENT_ENTITY_COUNT;
        if sufficient {
            return TurnDecision::Terminate(TerminationReason::ExtractionComplete);
        }

        TurnDecision::Engage
    }

    /// Near-duplicate check against every prior scammer message in this
    /// session (the latest transcript entry is `inbound` itself).
    fn is_repeated_pattern(&self, inbound: &str) -> bool {
        let current = normalize_for_comparison(inbound);
        if current.is_empty() {
            return false;
        }

        self.transcript
            .iter()
            .rev()
            .skip(1)
            .filter(|entry| entry.speaker == Speaker::Scammer)
            .map(|entry| normalize_for_comparison(&entry.text))
            .any(|prior| {
                prior == current || strsim::normalized_levenshtein(&prior, &current) >= REPEAT_SIMILARITY
            })
    }

    fn terminate(&mut self, reason: TerminationReason) {
        self.status = SessionStatus::Terminated(reason);
        self.last_activity = Instant::now();
    }

    /// Narrative for the terminal summary: totals plus the manipulation
    /// picture accumulated across the SSF history.
    fn summary(&self, reason: TerminationReason) -> String {
        let mut parts = vec![
            format!("Honeypot engaged for {} turn(s).", self.turn_count),
            format!("Extracted {} total entities.", self.entities.count()),
            format!(
                "Termination: {}.",
                serde_json::to_value(reason)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default()
            ),
        ];

        let peak_urgency = self
            .ssf_history
            .iter()
            .map(|p| p.urgency_score)
            .fold(0.0_f64, f64::max);
        if peak_urgency > 0.7 {
            parts.push("Sustained high-pressure tactics observed.".to_string());
        }

        let mut claims: Vec<&str> = Vec::new();
        for profile in &self.ssf_history {
            for claim in &profile.authority_claims {
                if !claims.contains(&claim.as_str()) {
                    claims.push(claim);
                }
            }
        }
        if !claims.is_empty() {
            parts.push(format!("Impersonated: {}.", claims.join(", ")));
        }

        if !self.entities.upi_ids.is_empty() {
            parts.push(format!(
                "UPI IDs found: {}.",
                self.entities.upi_ids.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        if !self.entities.bank_accounts.is_empty() {
            parts.push(format!(
                "Bank accounts found: {}.",
                self.entities.bank_accounts.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        if !self.entities.urls.is_empty() {
            parts.push(format!(
                "URLs found: {}.",
                self.entities.urls.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }

        parts.join(" ")
    }
}

fn normalize_for_comparison(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Result of driving one transition (or of querying a finished session).
#[derive(Debug, Clone)]
pub struct HoneypotOutcome {
    pub session_id: String,
    pub turns_completed: u32,
    pub entities: ExtractedEntities,
    pub termination_reason: Option<TerminationReason>,
    /// Engagement reply to relay to the scammer; absent once terminated.
    pub agent_reply: Option<String>,
    /// Terminal narrative; absent while the session is still live.
    pub summary: Option<String>,
}

impl HoneypotOutcome {
    fn snapshot(session: &HoneypotSession) -> Self {
        let (reason, summary) = match session.status {
            SessionStatus::Active => (None, None),
            SessionStatus::Terminated(reason) => (Some(reason), Some(session.summary(reason))),
        };
        Self {
            session_id: session.session_id.clone(),
            turns_completed: session.turn_count,
            entities: session.entities.clone(),
            termination_reason: reason,
            agent_reply: None,
            summary,
        }
    }
}

/// In-process session store. Sessions are looked up by id; a per-session
/// mutex serializes turns so turn_count stays monotonic and the transcript
/// keeps its order under concurrent requests. Idle sessions are evicted on
/// store access.
pub struct SessionStore {
    inner: RwLock<HashMap<String, Arc<Mutex<HoneypotSession>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    async fn get_or_create(
        &self,
        session_id: &str,
        config: &EngineConfig,
    ) -> Arc<Mutex<HoneypotSession>> {
        self.expire_idle(config).await;

        let mut inner = self.inner.write().await;
        inner
            .entry(session_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(HoneypotSession::new(session_id.to_string())))
            })
            .clone()
    }

    /// Drop sessions idle beyond the configured timeout. In-flight sessions
    /// hold their mutex and are skipped; they are not idle by definition.
    async fn expire_idle(&self, config: &EngineConfig) {
        let mut inner = self.inner.write().await;
        let before = inner.len();
        inner.retain(|_, slot| match slot.try_lock() {
            Ok(session) => session.last_activity.elapsed() < config.session_idle_timeout,
            Err(_) => true,
        });

        // Capacity backstop: if expiry was not enough, shed the stalest
        // unlocked sessions.
        if inner.len() > config.session_capacity {
            let mut ages: Vec<(String, std::time::Duration)> = inner
                .iter()
                .filter_map(|(id, slot)| {
                    slot.try_lock()
                        .ok()
                        .map(|session| (id.clone(), session.last_activity.elapsed()))
                })
                .collect();
            ages.sort_by(|a, b| b.1.cmp(&a.1));
            let excess = inner.len() - config.session_capacity;
            for (id, _) in ages.into_iter().take(excess) {
                inner.remove(&id);
            }
        }

        let evicted = before.saturating_sub(inner.len());
        if evicted > 0 {
            tracing::debug!(evicted, "expired idle honeypot sessions");
        }
    }

    /// Drive exactly one transition for `session_id` with the scammer's
    /// latest message. Serialized per session. A terminated session is never
    /// advanced again; callers get the terminal snapshot back.
    pub async fn run_turn(
        &self,
        session_id: &str,
        inbound: &str,
        profile: Option<SsfProfile>,
        classifier: &dyn Classifier,
        config: &EngineConfig,
    ) -> HoneypotOutcome {
        let slot = self.get_or_create(session_id, config).await;
        let mut session = slot.lock().await;

        if let SessionStatus::Terminated(_) = session.status {
            return HoneypotOutcome::snapshot(&session);
        }

        session.absorb_inbound(inbound, profile);

        match session.evaluate(inbound, config) {
            TurnDecision::Terminate(reason) => {
                session.terminate(reason);
                tracing::info!(
                    session_id = %session.session_id,
                    turns = session.turn_count,
                    reason = ?reason,
                    "honeypot session terminated"
                );
                HoneypotOutcome::snapshot(&session)
            }
            TurnDecision::Engage => {
                let deadline = config.oracle_timeout;
                let reply =
                    tokio::time::timeout(deadline, classifier.reply(&session.transcript)).await;

                match reply {
                    Ok(Ok(text)) => {
                        session.transcript.push(TranscriptEntry {
                            speaker: Speaker::Agent,
                            text: text.clone(),
                        });
                        session.turn_count += 1;
                        session.last_activity = Instant::now();
                        let mut outcome = HoneypotOutcome::snapshot(&session);
                        outcome.agent_reply = Some(text);
                        outcome
                    }
                    Ok(Err(err)) => {
                        tracing::warn!(
                            session_id = %session.session_id,
                            error = %err,
                            "oracle failed during honeypot reply; terminating"
                        );
                        session.terminate(TerminationReason::OracleUnavailable);
                        HoneypotOutcome::snapshot(&session)
                    }
                    Err(_) => {
                        tracing::warn!(
                            session_id = %session.session_id,
                            "oracle timed out during honeypot reply; terminating"
                        );
                        session.terminate(TerminationReason::OracleUnavailable);
                        HoneypotOutcome::snapshot(&session)
                    }
                }
            }
        }
    }

    #[cfg(test)]
    pub async fn session_count(&self) -> usize {
        self.inner.read().await.len()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
