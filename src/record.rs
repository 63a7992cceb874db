//! Consent records and their persistence.
//!
//! A [`ConsentRecord`] is the complete outcome of one consent action:
//! the overall decision, the per-category booleans, and the shared
//! expiration. Records are never mutated in place; each action builds a
//! fresh record and supersedes whatever was stored before. Exactly one
//! record (or none) is authoritative at any time.
//!
//! # Persistence layout
//!
//! Each record is written two ways in the same action:
//!
//! - one cookie per field (`ccl_consent`, `ccl_essential`,
//!   `ccl_analytics`, `ccl_marketing`, `ccl_preferences`,
//!   `ccl_consent_expiry`), the public interop contract that external
//!   readers depend on;
//! - one `ccl_record` cookie holding the serialized record, giving reads
//!   an atomic source when the store fails partway through the
//!   per-cookie writes.
//!
//! Reads prefer `ccl_record` and fall back to scanning the individual
//! cookies when it is absent or malformed.

use crate::category::ConsentCategory;
use crate::cookie::{
    delete_cookie, get_cookie, set_cookie, CookieError, CookieJar, CONSENT_COOKIE, EXPIRY_COOKIE,
    MS_PER_DAY, RECORD_COOKIE,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The overall consent decision, stored in `ccl_consent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentDecision {
    /// Visitor accepted every offered category.
    Accepted,
    /// Visitor rejected every optional category.
    Rejected,
    /// Visitor saved a per-category selection.
    Customized,
}

impl ConsentDecision {
    /// The literal cookie/event value for this decision.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Customized => "customized",
        }
    }

    /// Parse a stored cookie value. Anything outside the three literals
    /// is treated as no decision.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "customized" => Some(Self::Customized),
            _ => None,
        }
    }
}

/// A complete persisted (or about-to-be-persisted) consent decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentRecord {
    /// The overall decision.
    pub decision: ConsentDecision,
    /// Per-category values. Absent categories were not offered when the
    /// record was written and read back as "no consent". Essential is
    /// always present and `true`.
    pub categories: IndexMap<ConsentCategory, bool>,
    /// Absolute expiration, epoch milliseconds.
    pub expires_at_ms: i64,
}

impl ConsentRecord {
    /// Record for an accept-all action. Categories that are not enabled
    /// in the caller's settings must simply be left out of `granted`.
    #[must_use]
    pub fn accepted(granted: &[ConsentCategory], expires_at_ms: i64) -> Self {
        let mut categories = IndexMap::new();
        categories.insert(ConsentCategory::Essential, true);
        for cat in granted {
            if cat.is_togglable() {
                categories.insert(*cat, true);
            }
        }
        Self {
            decision: ConsentDecision::Accepted,
            categories,
            expires_at_ms,
        }
    }

    /// Record for a reject-all action: every optional category written
    /// `false` unconditionally, signaling explicit opt-out.
    #[must_use]
    pub fn rejected(expires_at_ms: i64) -> Self {
        let mut categories = IndexMap::new();
        categories.insert(ConsentCategory::Essential, true);
        for cat in ConsentCategory::OPTIONAL {
            categories.insert(cat, false);
        }
        Self {
            decision: ConsentDecision::Rejected,
            categories,
            expires_at_ms,
        }
    }

    /// Record for a save-preferences action. Every optional category is
    /// written; categories missing from `toggles` are `false`.
    #[must_use]
    pub fn customized<F>(toggle_state: F, expires_at_ms: i64) -> Self
    where
        F: Fn(ConsentCategory) -> bool,
    {
        let mut categories = IndexMap::new();
        categories.insert(ConsentCategory::Essential, true);
        for cat in ConsentCategory::OPTIONAL {
            categories.insert(cat, toggle_state(cat));
        }
        Self {
            decision: ConsentDecision::Customized,
            categories,
            expires_at_ms,
        }
    }

    /// Whether a category is granted by this record. Absent categories
    /// are not granted.
    #[must_use]
    pub fn is_granted(&self, category: ConsentCategory) -> bool {
        self.categories.get(&category).copied().unwrap_or(false)
    }

    /// Whether the record has expired as of `now_ms`.
    #[must_use]
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms <= now_ms
    }

    /// The categories granted by this record, in record order.
    pub fn granted_categories(&self) -> impl Iterator<Item = ConsentCategory> + '_ {
        self.categories
            .iter()
            .filter(|(_, granted)| **granted)
            .map(|(cat, _)| *cat)
    }

    /// The individual cookie pairs for this record, in write order:
    /// `ccl_consent` first, then the category cookies. This is also the
    /// `cookies` payload of the consent-changed event.
    #[must_use]
    pub fn cookie_pairs(&self) -> IndexMap<String, String> {
        let mut pairs = IndexMap::new();
        pairs.insert(
            CONSENT_COOKIE.to_string(),
            self.decision.as_str().to_string(),
        );
        for (cat, granted) in &self.categories {
            pairs.insert(cat.cookie_name().to_string(), granted.to_string());
        }
        pairs
    }
}

// === Store operations ===

/// Write a record: the individual contract cookies, the expiry cookie,
/// and the serialized `ccl_record` cookie, all sharing one expiration.
///
/// Fails on the first store error; by then some cookies may already be
/// written, which is exactly why reads prefer the record cookie.
pub fn write_record(
    jar: &dyn CookieJar,
    record: &ConsentRecord,
    days: i64,
    secure: bool,
) -> Result<(), CookieError> {
    for (name, value) in record.cookie_pairs() {
        if !set_cookie(jar, &name, &value, days, secure) {
            return Err(CookieError::WriteRejected);
        }
    }
    if !set_cookie(
        jar,
        EXPIRY_COOKIE,
        &record.expires_at_ms.to_string(),
        days,
        secure,
    ) {
        return Err(CookieError::WriteRejected);
    }
    let serialized = serde_json::to_string(record)
        .map_err(|e| CookieError::Malformed(e.to_string()))?;
    if !set_cookie(jar, RECORD_COOKIE, &serialized, days, secure) {
        return Err(CookieError::WriteRejected);
    }
    Ok(())
}

/// Load the authoritative record, if a valid non-expired one exists.
///
/// Prefers the serialized `ccl_record` cookie; falls back to assembling
/// a record from the individual cookies when it is absent or malformed.
#[must_use]
pub fn load_record(jar: &dyn CookieJar) -> Option<ConsentRecord> {
    let now_ms = jar.now_ms();

    if let Some(serialized) = get_cookie(jar, RECORD_COOKIE) {
        if let Ok(mut record) = serde_json::from_str::<ConsentRecord>(&serialized) {
            // Essential is true in any record, stored or not.
            record.categories.insert(ConsentCategory::Essential, true);
            if !record.is_expired(now_ms) {
                return Some(record);
            }
            return None;
        }
    }

    // Fallback: independent per-cookie reads. Not atomic; a partial
    // write can surface here, which the record cookie path avoids.
    let decision = ConsentDecision::parse(&get_cookie(jar, CONSENT_COOKIE)?)?;
    let expires_at_ms = get_cookie(jar, EXPIRY_COOKIE)
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(i64::MAX);
    let mut categories = IndexMap::new();
    categories.insert(ConsentCategory::Essential, true);
    for cat in ConsentCategory::OPTIONAL {
        if let Some(value) = get_cookie(jar, cat.cookie_name()) {
            categories.insert(cat, value == "true");
        }
    }
    let record = ConsentRecord {
        decision,
        categories,
        expires_at_ms,
    };
    if record.is_expired(now_ms) {
        return None;
    }
    Some(record)
}

/// Read one category's consent directly from its cookie. Equality with
/// the literal string `"true"` is the only truthy condition; any other
/// value, including an absent cookie, is `false`.
#[must_use]
pub fn has_consent(jar: &dyn CookieJar, category: ConsentCategory) -> bool {
    get_cookie(jar, category.cookie_name()).as_deref() == Some("true")
}

/// Whether any consent decision cookie exists at all (expired cookies
/// read as absent).
#[must_use]
pub fn has_any_consent(jar: &dyn CookieJar) -> bool {
    get_cookie(jar, CONSENT_COOKIE).is_some()
}

/// Whether the stored consent is expired. No expiry cookie counts as
/// expired.
#[must_use]
pub fn is_consent_expired(jar: &dyn CookieJar) -> bool {
    match get_cookie(jar, EXPIRY_COOKIE).and_then(|v| v.parse::<i64>().ok()) {
        Some(expiry_ms) => jar.now_ms() > expiry_ms,
        None => true,
    }
}

/// Recover the moment consent was given: the stored expiry minus the
/// configured lifetime.
#[must_use]
pub fn consent_date_ms(jar: &dyn CookieJar, expiration_days: u32) -> Option<i64> {
    let expiry_ms = get_cookie(jar, EXPIRY_COOKIE)?.parse::<i64>().ok()?;
    Some(expiry_ms - i64::from(expiration_days) * MS_PER_DAY)
}

/// Delete every consent-related cookie by expiring it at the epoch.
pub fn clear_consent_cookies(jar: &dyn CookieJar) {
    let _ = delete_cookie(jar, CONSENT_COOKIE);
    let _ = delete_cookie(jar, EXPIRY_COOKIE);
    let _ = delete_cookie(jar, RECORD_COOKIE);
    for cat in ConsentCategory::ALL {
        let _ = delete_cookie(jar, cat.cookie_name());
    }
}

/// Point-in-time view of the individual consent cookies.
///
/// Assembled from independent per-cookie reads, one linear scan each;
/// there is no atomicity across them. [`load_record`] is the atomic
/// alternative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsentSnapshot {
    /// Essential category value.
    pub essential: bool,
    /// Analytics category value.
    pub analytics: bool,
    /// Marketing category value.
    pub marketing: bool,
    /// Preferences category value.
    pub preferences: bool,
    /// Stored expiration, epoch milliseconds, if readable.
    pub expires_at_ms: Option<i64>,
}

impl ConsentSnapshot {
    /// Read all category cookies plus the expiry cookie.
    #[must_use]
    pub fn read(jar: &dyn CookieJar) -> Self {
        Self {
            essential: has_consent(jar, ConsentCategory::Essential),
            analytics: has_consent(jar, ConsentCategory::Analytics),
            marketing: has_consent(jar, ConsentCategory::Marketing),
            preferences: has_consent(jar, ConsentCategory::Preferences),
            expires_at_ms: get_cookie(jar, EXPIRY_COOKIE).and_then(|v| v.parse().ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookie::MemoryJar;

    fn all_optional() -> Vec<ConsentCategory> {
        ConsentCategory::OPTIONAL.to_vec()
    }

    #[test]
    fn test_accepted_skips_disabled_categories() {
        let record = ConsentRecord::accepted(&[ConsentCategory::Analytics], 1000);
        assert!(record.is_granted(ConsentCategory::Essential));
        assert!(record.is_granted(ConsentCategory::Analytics));
        // Not offered, so not written at all.
        assert!(!record.categories.contains_key(&ConsentCategory::Marketing));
        assert!(!record.is_granted(ConsentCategory::Marketing));
    }

    #[test]
    fn test_rejected_writes_all_optional_false() {
        let record = ConsentRecord::rejected(1000);
        assert!(record.is_granted(ConsentCategory::Essential));
        for cat in ConsentCategory::OPTIONAL {
            assert_eq!(record.categories.get(&cat), Some(&false));
        }
    }

    #[test]
    fn test_customized_missing_toggle_is_false() {
        let record =
            ConsentRecord::customized(|cat| cat == ConsentCategory::Analytics, 1000);
        assert!(record.is_granted(ConsentCategory::Analytics));
        assert!(!record.is_granted(ConsentCategory::Marketing));
        assert!(!record.is_granted(ConsentCategory::Preferences));
    }

    #[test]
    fn test_cookie_pairs_order() {
        let record = ConsentRecord::accepted(&all_optional(), 1000);
        let names: Vec<_> = record.cookie_pairs().keys().cloned().collect();
        assert_eq!(
            names,
            vec![
                "ccl_consent",
                "ccl_essential",
                "ccl_analytics",
                "ccl_marketing",
                "ccl_preferences",
            ]
        );
    }

    #[test]
    fn test_write_then_load_prefers_record_cookie() {
        let jar = MemoryJar::with_now(0);
        let record = ConsentRecord::accepted(&all_optional(), 30 * MS_PER_DAY);
        write_record(&jar, &record, 30, false).unwrap();

        // Corrupt one individual cookie; the record cookie still wins.
        assert!(set_cookie(
            &jar,
            ConsentCategory::Analytics.cookie_name(),
            "garbage",
            30,
            false
        ));
        let loaded = load_record(&jar).unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn test_load_falls_back_to_individual_cookies() {
        let jar = MemoryJar::with_now(0);
        let record = ConsentRecord::rejected(30 * MS_PER_DAY);
        write_record(&jar, &record, 30, false).unwrap();
        assert!(delete_cookie(&jar, RECORD_COOKIE));

        let loaded = load_record(&jar).unwrap();
        assert_eq!(loaded.decision, ConsentDecision::Rejected);
        assert!(!loaded.is_granted(ConsentCategory::Analytics));
        assert!(loaded.is_granted(ConsentCategory::Essential));
    }

    #[test]
    fn test_expired_record_treated_as_absent() {
        let jar = MemoryJar::with_now(0);
        let record = ConsentRecord::accepted(&all_optional(), 30 * MS_PER_DAY);
        write_record(&jar, &record, 30, false).unwrap();

        jar.set_now(31 * MS_PER_DAY);
        assert!(load_record(&jar).is_none());
        assert!(is_consent_expired(&jar));
    }

    #[test]
    fn test_has_consent_literal_true_only() {
        let jar = MemoryJar::with_now(0);
        assert!(set_cookie(&jar, "ccl_analytics", "TRUE", 30, false));
        assert!(!has_consent(&jar, ConsentCategory::Analytics));
        assert!(set_cookie(&jar, "ccl_analytics", "true", 30, false));
        assert!(has_consent(&jar, ConsentCategory::Analytics));
        assert!(!has_consent(&jar, ConsentCategory::Marketing));
    }

    #[test]
    fn test_clear_consent_cookies() {
        let jar = MemoryJar::with_now(0);
        let record = ConsentRecord::accepted(&all_optional(), 30 * MS_PER_DAY);
        write_record(&jar, &record, 30, false).unwrap();
        assert!(has_any_consent(&jar));

        clear_consent_cookies(&jar);
        assert!(!has_any_consent(&jar));
        assert!(load_record(&jar).is_none());
        assert!(jar.is_empty());
    }

    #[test]
    fn test_consent_date_recovery() {
        let jar = MemoryJar::with_now(1_000_000);
        let record = ConsentRecord::accepted(&all_optional(), 1_000_000 + 30 * MS_PER_DAY);
        write_record(&jar, &record, 30, false).unwrap();
        assert_eq!(consent_date_ms(&jar, 30), Some(1_000_000));
    }

    #[test]
    fn test_snapshot_reads_independently() {
        let jar = MemoryJar::with_now(0);
        let record =
            ConsentRecord::customized(|cat| cat != ConsentCategory::Marketing, 30 * MS_PER_DAY);
        write_record(&jar, &record, 30, false).unwrap();

        let snap = ConsentSnapshot::read(&jar);
        assert!(snap.essential);
        assert!(snap.analytics);
        assert!(!snap.marketing);
        assert!(snap.preferences);
        assert_eq!(snap.expires_at_ms, Some(30 * MS_PER_DAY));
    }
}
