//! Engine configuration.
//!
//! [`EngineSettings`] is the settings object the configuration provider
//! hands to [`ConsentEngine::initialize`](crate::engine::ConsentEngine).
//! It deserializes from the same JSON shape the provider ships to the
//! page, and can also be built programmatically.
//!
//! The engine only acts on category enablement, the consent expiration,
//! and the debug flag. Cosmetic values (colors, labels) ride along so a
//! host can render from the same object, but they never influence engine
//! logic.
//!
//! # Example
//!
//! ```
//! use ccl::category::ConsentCategory;
//! use ccl::settings::EngineSettings;
//!
//! let settings = EngineSettings::new()
//!     .enable(ConsentCategory::Analytics, true)
//!     .enable(ConsentCategory::Marketing, false)
//!     .expiration_days(90);
//!
//! assert!(settings.is_enabled(ConsentCategory::Analytics));
//! assert!(settings.is_enabled(ConsentCategory::Essential));
//! assert_eq!(settings.expiration(), 90);
//! ```

use crate::category::ConsentCategory;
use serde::Deserialize;

/// Default consent lifetime when the configured value is missing or
/// invalid, in days.
pub const DEFAULT_EXPIRATION_DAYS: u32 = 180;

/// Minimum configurable consent lifetime, in days.
pub const MIN_EXPIRATION_DAYS: u32 = 1;

/// Maximum configurable consent lifetime, in days.
pub const MAX_EXPIRATION_DAYS: u32 = 365;

/// Configuration for a [`ConsentEngine`](crate::engine::ConsentEngine).
///
/// Deserializes from the provider's settings JSON; unknown fields are
/// ignored so the provider can ship extra rendering data.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Whether the analytics category is offered at all.
    pub enable_analytics: bool,
    /// Whether the marketing category is offered at all.
    pub enable_marketing: bool,
    /// Whether the preferences category is offered at all.
    pub enable_preferences: bool,
    /// Consent lifetime in days. Read through [`expiration`], which
    /// accepts 1–365 and falls back to 180 on anything else.
    ///
    /// [`expiration`]: EngineSettings::expiration
    pub consent_expiration: i64,
    /// Enables development-only APIs (`reset_consent`). Hosts opt in
    /// explicitly; the engine never sniffs the page URL to decide.
    pub debug_enabled: bool,
    /// Accent color for rendering. Not used by engine logic.
    pub primary_color: Option<String>,
    /// Secondary accent color for rendering. Not used by engine logic.
    pub secondary_color: Option<String>,
    /// Banner background color for rendering. Not used by engine logic.
    pub banner_bg_color: Option<String>,
    /// Body text color for rendering. Not used by engine logic.
    pub text_color: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            enable_analytics: true,
            enable_marketing: true,
            enable_preferences: true,
            consent_expiration: DEFAULT_EXPIRATION_DAYS as i64,
            debug_enabled: false,
            primary_color: None,
            secondary_color: None,
            banner_bg_color: None,
            text_color: None,
        }
    }
}

impl EngineSettings {
    /// Create settings with all optional categories enabled and the
    /// default 180-day expiration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable an optional category. Essential cannot be
    /// disabled; asking to is ignored.
    #[must_use]
    pub fn enable(mut self, category: ConsentCategory, enabled: bool) -> Self {
        match category {
            ConsentCategory::Essential => {}
            ConsentCategory::Analytics => self.enable_analytics = enabled,
            ConsentCategory::Marketing => self.enable_marketing = enabled,
            ConsentCategory::Preferences => self.enable_preferences = enabled,
        }
        self
    }

    /// Set the consent lifetime in days. Values outside 1–365 fall back
    /// to the 180-day default at read time.
    #[must_use]
    pub fn expiration_days(mut self, days: i64) -> Self {
        self.consent_expiration = days;
        self
    }

    /// Enable development-only APIs.
    #[must_use]
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug_enabled = enabled;
        self
    }

    /// Whether a category is offered. Essential is always enabled.
    #[must_use]
    pub fn is_enabled(&self, category: ConsentCategory) -> bool {
        match category {
            ConsentCategory::Essential => true,
            ConsentCategory::Analytics => self.enable_analytics,
            ConsentCategory::Marketing => self.enable_marketing,
            ConsentCategory::Preferences => self.enable_preferences,
        }
    }

    /// Effective consent lifetime in days: the configured value if it is
    /// within 1–365, otherwise 180.
    #[must_use]
    pub fn expiration(&self) -> u32 {
        clamp_days(self.consent_expiration)
    }
}

/// Validate a day count for cookie expiration.
///
/// Out-of-range input (zero, negative, more than a year) falls back to
/// [`DEFAULT_EXPIRATION_DAYS`] rather than producing a malformed or
/// effectively-infinite cookie.
#[must_use]
pub fn clamp_days(days: i64) -> u32 {
    if days < MIN_EXPIRATION_DAYS as i64 || days > MAX_EXPIRATION_DAYS as i64 {
        DEFAULT_EXPIRATION_DAYS
    } else {
        days as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = EngineSettings::new();
        assert!(s.is_enabled(ConsentCategory::Analytics));
        assert!(s.is_enabled(ConsentCategory::Marketing));
        assert!(s.is_enabled(ConsentCategory::Preferences));
        assert_eq!(s.expiration(), DEFAULT_EXPIRATION_DAYS);
        assert!(!s.debug_enabled);
    }

    #[test]
    fn test_essential_cannot_be_disabled() {
        let s = EngineSettings::new().enable(ConsentCategory::Essential, false);
        assert!(s.is_enabled(ConsentCategory::Essential));
    }

    #[test]
    fn test_clamp_days_fallback() {
        assert_eq!(clamp_days(0), DEFAULT_EXPIRATION_DAYS);
        assert_eq!(clamp_days(-30), DEFAULT_EXPIRATION_DAYS);
        assert_eq!(clamp_days(366), DEFAULT_EXPIRATION_DAYS);
        assert_eq!(clamp_days(1), 1);
        assert_eq!(clamp_days(365), 365);
        assert_eq!(clamp_days(90), 90);
    }

    #[test]
    fn test_deserialize_provider_json() {
        let json = r##"{
            "enable_analytics": true,
            "enable_marketing": false,
            "enable_preferences": true,
            "consent_expiration": 30,
            "primary_color": "#4CAF50",
            "banner_position": "bottom"
        }"##;
        let s: EngineSettings = serde_json::from_str(json).unwrap();
        assert!(s.enable_analytics);
        assert!(!s.enable_marketing);
        assert_eq!(s.expiration(), 30);
        assert!(!s.debug_enabled);
        assert_eq!(s.primary_color.as_deref(), Some("#4CAF50"));
    }

    #[test]
    fn test_deserialize_invalid_expiration_falls_back() {
        let s: EngineSettings = serde_json::from_str(r#"{"consent_expiration": 9999}"#).unwrap();
        assert_eq!(s.expiration(), DEFAULT_EXPIRATION_DAYS);
    }
}
