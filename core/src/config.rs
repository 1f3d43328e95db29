use std::time::Duration;

/// Pattern tables driving the SSF engine. Data, not code: the engine compiles
/// whatever it is given at construction, so deployments can extend the
/// lexicons without touching detection logic.
#[derive(Debug, Clone)]
pub struct Lexicons {
    /// Urgency / time-pressure phrasing, one regex per row.
    pub urgency: Vec<String>,
    /// Institutional impersonation: (claim label, regex).
    pub authority: Vec<(String, String)>,
    /// Channel-switch phrasing: (channel name, regex). Table order is the
    /// match priority.
    pub channel: Vec<(String, String)>,
    /// Payment-intent phrasing, one regex per row. Each row counts as one
    /// distinct payment category.
    pub payment: Vec<String>,
}

impl Default for Lexicons {
    fn default() -> Self {
        Self {
            urgency: [
                r"\b(immediate(?:ly)?|urgent(?:ly)?|right now|act now|don't delay)\b",
                r"\b(limited time|expires? today|last chance|final warning)\b",
                r"\b(within \d+ (?:hour|minute|day)s?|before midnight)\b",
                r"\b(hurry|quick(?:ly)?|asap|emergency)\b",
                r"\b(account (?:will be |is being )?(?:blocked|suspended|closed|frozen))\b",
                r"\b(legal action|arrest|court|lawsuit)\b",
                r"\b(verify now|confirm now|update now|click now)\b",
            ]
            .map(str::to_string)
            .to_vec(),
            authority: [
                ("RBI", r"\b(rbi|reserve bank|central bank)\b"),
                ("Police", r"\b(police|cop|officer|crime branch|cyber (?:cell|crime))\b"),
                ("Bank", r"\b(bank (?:manager|officer|executive)|(?:hdfc|icici|sbi|axis) bank)\b"),
                ("Government", r"\b(government|ministry|income tax|it department|gst)\b"),
                ("Telecom", r"\b(airtel|jio|vodafone|bsnl|telecom|trai)\b"),
                ("Tech Company", r"\b(microsoft|google|apple|amazon|facebook|meta)\b"),
                ("Customs", r"\b(customs|import duty|parcel|courier)\b"),
            ]
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .to_vec(),
            channel: [
                ("WhatsApp", r"\b(whatsapp|wa\.me|whats app)\b"),
                ("Telegram", r"\b(telegram|t\.me)\b"),
                ("Direct Call", r"\b(call (?:me|us|this number)|phone|dial)\b"),
                ("Email", r"\b(email|mail us|send mail)\b"),
                ("Website", r"\b(visit|go to|click|website|link)\b"),
            ]
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .to_vec(),
            payment: [
                r"\b(pay(?:ment)?|transfer|send money|deposit)\b",
                r"\b(upi|gpay|paytm|phonepe|bhim)\b",
                r"\b(bank account|account number|ifsc)\b",
                r"\b(fee|charge|fine|penalty|tax)\b",
                r"\b(refund|cashback|prize|reward|lottery)\b",
            ]
            .map(str::to_string)
            .to_vec(),
        }
    }
}

/// Engine knobs. Everything here is supplied by the environment in
/// production; defaults match the documented behavior.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hard cap on honeypot turns per session.
    pub honeypot_max_turns: u32,
    /// Minimum classification confidence before honeypot engagement.
    pub honeypot_confidence_threshold: f64,
    /// Consecutive turns without a new entity before giving up.
    pub honeypot_no_progress_turns: u32,
    /// Idle sessions older than this are evicted from the store.
    pub session_idle_timeout: Duration,
    /// Upper bound on concurrently tracked sessions.
    pub session_capacity: usize,
    /// Classification cache freshness window.
    pub cache_ttl: Duration,
    /// Classification cache entry cap (least-recently-inserted eviction).
    pub cache_capacity: usize,
    /// Deadline for a single oracle call (classify or reply).
    pub oracle_timeout: Duration,
    pub lexicons: Lexicons,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            honeypot_max_turns: 5,
            honeypot_confidence_threshold: 0.85,
            honeypot_no_progress_turns: 2,
            session_idle_timeout: Duration::from_secs(900),
            session_capacity: 1024,
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 100,
            oracle_timeout: Duration::from_secs(20),
            lexicons: Lexicons::default(),
        }
    }
}

impl EngineConfig {
    /// Build config from environment variables, falling back to defaults for
    /// anything absent or unparseable. Out-of-range thresholds are clamped
    /// rather than rejected so a bad deploy degrades instead of crashing.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let threshold = env_parse("SCAMTRAP_HONEYPOT_CONFIDENCE_THRESHOLD")
            .unwrap_or(defaults.honeypot_confidence_threshold)
            .clamp(0.0, 1.0);

        Self {
            honeypot_max_turns: env_parse("SCAMTRAP_HONEYPOT_MAX_TURNS")
                .filter(|&n: &u32| n > 0)
                .unwrap_or(defaults.honeypot_max_turns),
            honeypot_confidence_threshold: threshold,
            honeypot_no_progress_turns: env_parse("SCAMTRAP_HONEYPOT_NO_PROGRESS_TURNS")
                .filter(|&n: &u32| n > 0)
                .unwrap_or(defaults.honeypot_no_progress_turns),
            session_idle_timeout: env_parse("SCAMTRAP_SESSION_IDLE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_idle_timeout),
            session_capacity: env_parse("SCAMTRAP_SESSION_CAPACITY")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.session_capacity),
            cache_ttl: env_parse("SCAMTRAP_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            cache_capacity: env_parse("SCAMTRAP_CACHE_CAPACITY")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.cache_capacity),
            oracle_timeout: env_parse("SCAMTRAP_ORACLE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.oracle_timeout),
            lexicons: Lexicons::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, raw = %raw, "ignoring unparseable config value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::EngineConfig;

    #[test]
    fn defaults_match_documented_knobs() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.honeypot_max_turns, 5);
        assert_eq!(cfg.honeypot_no_progress_turns, 2);
        assert_eq!(cfg.cache_capacity, 100);
        assert_eq!(cfg.cache_ttl.as_secs(), 300);
        assert!((cfg.honeypot_confidence_threshold - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn default_lexicons_are_non_empty() {
        let cfg = EngineConfig::default();
        assert!(!cfg.lexicons.urgency.is_empty());
        assert!(!cfg.lexicons.authority.is_empty());
        assert!(!cfg.lexicons.channel.is_empty());
        assert!(!cfg.lexicons.payment.is_empty());
    }
}
