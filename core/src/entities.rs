use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// Payment-handle style identifiers: user@bankcode. Email-looking domains are
// filtered out after matching since the regex crate has no lookahead.
static UPI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[a-z0-9._-]+@[a-z]{2,}\b").expect("upi pattern")
});

static BANK_ACCOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{9,18}\b").expect("bank account pattern"));

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://[-\w.%]+[/\w\-.?=&#%]*").expect("url pattern")
});

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+91[\s-]?)?(?:\d{5}[\s-]\d{5}|\d{4}[\s-]\d{3}[\s-]\d{3}|\d{10})")
        .expect("phone pattern")
});

const EMAIL_DOMAIN_HINTS: &[&str] = &["gmail", "yahoo", "hotmail", "outlook", ".com", ".in", ".org"];

/// Entities pulled out of free text. Sets are deduplicated and iterate in a
/// stable order, so serialization is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ExtractedEntities {
    pub upi_ids: BTreeSet<String>,
    pub bank_accounts: BTreeSet<String>,
    pub urls: BTreeSet<String>,
    pub phone_numbers: BTreeSet<String>,
}

impl ExtractedEntities {
    /// Scan text for payment handles, account-like sequences, URLs, and phone
    /// numbers. Pure and infallible: no matches means empty sets.
    pub fn extract(text: &str) -> Self {
        let mut out = Self::default();

        for m in UPI_RE.find_iter(text) {
            let token = m.as_str();
            let lower = token.to_lowercase();
            if !EMAIL_DOMAIN_HINTS.iter().any(|hint| lower.contains(hint)) {
                out.upi_ids.insert(token.to_string());
            }
        }

        for m in PHONE_RE.find_iter(text) {
            let normalized: String = m
                .as_str()
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '-')
                .collect();
            let digits = normalized.trim_start_matches('+');
            if digits.len() < 10 {
                continue;
            }
            // A bare 10-digit run with no country code is only a phone when
            // it looks like a mobile number; otherwise the account scan owns
            // it. Each sequence lands in exactly one category.
            let bare = normalized.len() == digits.len();
            if bare && digits.len() == 10 && !is_mobile_shaped(digits) {
                continue;
            }
            out.phone_numbers.insert(normalized);
        }

        for m in BANK_ACCOUNT_RE.find_iter(text) {
            let digits = m.as_str();
            // Mobile-shaped numbers belong to the phone category, not here.
            if !digits.starts_with('0') && !is_mobile_shaped(digits) {
                out.bank_accounts.insert(digits.to_string());
            }
        }

        for m in URL_RE.find_iter(text) {
            out.urls.insert(m.as_str().to_string());
        }

        out
    }

    /// Set union with another extraction. Monotonic: nothing is ever removed.
    pub fn merge(&mut self, other: &ExtractedEntities) {
        self.upi_ids.extend(other.upi_ids.iter().cloned());
        self.bank_accounts.extend(other.bank_accounts.iter().cloned());
        self.urls.extend(other.urls.iter().cloned());
        self.phone_numbers.extend(other.phone_numbers.iter().cloned());
    }

    pub fn count(&self) -> usize {
        self.upi_ids.len() + self.bank_accounts.len() + self.urls.len() + self.phone_numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Something a payment could be routed to.
    pub fn has_payment_identifier(&self) -> bool {
        !self.upi_ids.is_empty() || !self.bank_accounts.is_empty()
    }

    /// Something the scammer can be reached on.
    pub fn has_contact_channel(&self) -> bool {
        !self.phone_numbers.is_empty() || !self.urls.is_empty()
    }

    /// True when `self` contains every entity in `earlier`.
    pub fn is_superset_of(&self, earlier: &ExtractedEntities) -> bool {
        self.upi_ids.is_superset(&earlier.upi_ids)
            && self.bank_accounts.is_superset(&earlier.bank_accounts)
            && self.urls.is_superset(&earlier.urls)
            && self.phone_numbers.is_superset(&earlier.phone_numbers)
    }
}

fn is_mobile_shaped(digits: &str) -> bool {
    digits.len() == 10 && digits.starts_with(['6', '7', '8', '9'])
}
