//! The consent-changed notification.
//!
//! After any consent decision the engine dispatches exactly one
//! document-level event named [`CONSENT_CHANGED_EVENT`]. Third-party
//! integrations (analytics consent mode, tag managers) subscribe to it;
//! the engine is the sole publisher.
//!
//! The payload serializes to the wire shape external listeners expect:
//!
//! ```json
//! {
//!   "action": "accepted",
//!   "cookies": { "ccl_consent": "accepted", "ccl_essential": "true" },
//!   "timestamp": "2026-08-30T12:00:00Z"
//! }
//! ```

use crate::category::ConsentCategory;
use crate::record::{ConsentDecision, ConsentRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::Serialize;

/// Name of the document-level consent event.
pub const CONSENT_CHANGED_EVENT: &str = "cclConsentChanged";

/// Consent-mode storage grant, the vocabulary analytics SDKs consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageGrant {
    /// Storage may be used.
    Granted,
    /// Storage must not be used.
    Denied,
}

/// Consent-mode projection of an event payload: the
/// `analytics_storage`/`ad_storage` pair a gtag-style SDK expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConsentMode {
    /// Derived from the `ccl_analytics` payload entry.
    pub analytics_storage: StorageGrant,
    /// Derived from the `ccl_marketing` payload entry.
    pub ad_storage: StorageGrant,
}

/// Payload of the [`CONSENT_CHANGED_EVENT`] notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsentChangedEvent {
    /// The decision that triggered the event.
    pub action: ConsentDecision,
    /// The cookie name/value pairs the decision wrote, in write order.
    pub cookies: IndexMap<String, String>,
    /// When the decision happened, ISO-8601.
    pub timestamp: String,
}

impl ConsentChangedEvent {
    /// Build the event for a record decided at `now_ms`.
    #[must_use]
    pub fn for_record(record: &ConsentRecord, now_ms: i64) -> Self {
        let timestamp = DateTime::<Utc>::from_timestamp_millis(now_ms)
            .unwrap_or_else(|| DateTime::<Utc>::from_timestamp_millis(0).unwrap_or_default())
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        Self {
            action: record.decision,
            cookies: record.cookie_pairs(),
            timestamp,
        }
    }

    /// Whether the payload grants a category (literal `"true"` only).
    #[must_use]
    pub fn grants(&self, category: ConsentCategory) -> bool {
        self.cookies
            .get(category.cookie_name())
            .map(String::as_str)
            == Some("true")
    }

    /// Project the payload onto analytics consent-mode vocabulary.
    #[must_use]
    pub fn consent_mode(&self) -> ConsentMode {
        let grant = |cat| {
            if self.grants(cat) {
                StorageGrant::Granted
            } else {
                StorageGrant::Denied
            }
        };
        ConsentMode {
            analytics_storage: grant(ConsentCategory::Analytics),
            ad_storage: grant(ConsentCategory::Marketing),
        }
    }
}
