//! Consent categories and their cookie-name contract.
//!
//! A category is a named class of non-essential data use the visitor may
//! independently allow or deny. [`ConsentCategory::Essential`] is the
//! always-on category required for basic site function; it is not
//! user-togglable and is always granted in any persisted record.
//!
//! Category names are an allow-list: anything that is not one of the four
//! known names is rejected before it can reach the cookie store.
//!
//! # Example
//!
//! ```
//! use ccl::category::ConsentCategory;
//!
//! let cat: ConsentCategory = "analytics".parse().unwrap();
//! assert_eq!(cat.cookie_name(), "ccl_analytics");
//! assert!(cat.is_togglable());
//! assert!(!ConsentCategory::Essential.is_togglable());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A consent category.
///
/// The cookie names derived from these categories are a public interop
/// contract: external readers match on the literal `ccl_*` names.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ConsentCategory {
    /// Always-on category required for basic site function.
    Essential,
    /// Analytics and measurement scripts.
    Analytics,
    /// Marketing and advertising scripts.
    Marketing,
    /// Preference/personalization scripts.
    Preferences,
}

impl ConsentCategory {
    /// All categories, in persisted/display order.
    pub const ALL: [ConsentCategory; 4] = [
        ConsentCategory::Essential,
        ConsentCategory::Analytics,
        ConsentCategory::Marketing,
        ConsentCategory::Preferences,
    ];

    /// The user-togglable categories (everything except essential).
    pub const OPTIONAL: [ConsentCategory; 3] = [
        ConsentCategory::Analytics,
        ConsentCategory::Marketing,
        ConsentCategory::Preferences,
    ];

    /// Canonical lowercase name, as used in markup (`data-category`) and
    /// settings keys.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Essential => "essential",
            Self::Analytics => "analytics",
            Self::Marketing => "marketing",
            Self::Preferences => "preferences",
        }
    }

    /// Cookie name for this category's consent value.
    #[must_use]
    pub const fn cookie_name(&self) -> &'static str {
        match self {
            Self::Essential => "ccl_essential",
            Self::Analytics => "ccl_analytics",
            Self::Marketing => "ccl_marketing",
            Self::Preferences => "ccl_preferences",
        }
    }

    /// Whether the visitor can toggle this category.
    ///
    /// Essential is always granted and never togglable.
    #[must_use]
    pub const fn is_togglable(&self) -> bool {
        !matches!(self, Self::Essential)
    }
}

impl fmt::Display for ConsentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a known category name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown consent category: {0:?}")]
pub struct UnknownCategory(pub String);

impl FromStr for ConsentCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "essential" => Ok(Self::Essential),
            "analytics" => Ok(Self::Analytics),
            "marketing" => Ok(Self::Marketing),
            "preferences" => Ok(Self::Preferences),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

/// Static description of a category as supplied by the configuration
/// provider. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryDefinition {
    /// Which category this describes.
    pub category: ConsentCategory,
    /// Human-readable label for the preferences modal.
    pub label: String,
    /// Whether the toggle is interactive. Essential definitions are
    /// always non-togglable regardless of what the provider sends.
    pub togglable: bool,
    /// Default toggle state when no cookie exists yet.
    pub default_on: bool,
}

impl CategoryDefinition {
    /// Create a definition with the category's canonical togglability and
    /// toggles defaulting to off.
    pub fn new(category: ConsentCategory, label: impl Into<String>) -> Self {
        Self {
            category,
            label: label.into(),
            togglable: category.is_togglable(),
            default_on: !category.is_togglable(),
        }
    }

    /// Set the default toggle state.
    #[must_use]
    pub fn default_on(mut self, on: bool) -> Self {
        // Essential stays on no matter what the provider asks for.
        self.default_on = on || !self.category.is_togglable();
        self
    }
}
