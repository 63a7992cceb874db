//! Script gating: deferred placeholders become executable on consent.
//!
//! [`ScriptGate`] tracks which categories have already been activated.
//! Activation is one-shot: the first call for a category scans the page
//! once, promotes every matching placeholder in DOM order, and records
//! the category; later calls return immediately without re-scanning.
//! Un-consented categories are simply never activated, so their
//! placeholders are never promoted to anything executable.
//!
//! # Example
//!
//! ```
//! use ccl::category::ConsentCategory;
//! use ccl::gate::ScriptGate;
//! use ccl::page::{MemoryDocument, ScriptTag};
//!
//! let mut doc = MemoryDocument::new()
//!     .with_script(ScriptTag::external(ConsentCategory::Analytics, "https://x.test/a.js"));
//! let mut gate = ScriptGate::new();
//!
//! assert_eq!(gate.activate(&mut doc, ConsentCategory::Analytics), 1);
//! assert_eq!(doc.head_scripts().len(), 1);
//! assert!(doc.placeholder_scripts().is_empty());
//! ```

use crate::category::ConsentCategory;
use crate::page::Document;
use rustc_hash::FxHashSet;

/// One-shot per-category script activation.
#[derive(Debug, Default)]
pub struct ScriptGate {
    activated: FxHashSet<ConsentCategory>,
}

impl ScriptGate {
    /// Gate with no categories activated yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a category has already been activated.
    #[must_use]
    pub fn is_activated(&self, category: ConsentCategory) -> bool {
        self.activated.contains(&category)
    }

    /// Activate a category: promote every deferred placeholder for it,
    /// in DOM order, injecting the executable replacement and removing
    /// the placeholder. Returns the number of scripts promoted; zero on
    /// repeat calls (no re-scan).
    pub fn activate(&mut self, doc: &mut dyn Document, category: ConsentCategory) -> usize {
        if !self.activated.insert(category) {
            return 0;
        }
        let mut promoted_count = 0;
        for placeholder in doc.take_scripts_for_category(category) {
            if let Some(promoted) = placeholder.promote() {
                doc.inject_script(promoted);
                promoted_count += 1;
            }
        }
        promoted_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{MemoryDocument, ScriptTag, ATTR_SRC, TYPE_EXECUTABLE};

    #[test]
    fn test_activation_is_one_shot() {
        let mut doc = MemoryDocument::new()
            .with_script(ScriptTag::inline(ConsentCategory::Analytics, "a();"));
        let mut gate = ScriptGate::new();

        assert_eq!(gate.activate(&mut doc, ConsentCategory::Analytics), 1);
        assert!(gate.is_activated(ConsentCategory::Analytics));

        // A placeholder added after activation is not picked up.
        doc.add_script(ScriptTag::inline(ConsentCategory::Analytics, "late();"));
        assert_eq!(gate.activate(&mut doc, ConsentCategory::Analytics), 0);
        assert_eq!(doc.placeholder_scripts().len(), 1);
        assert_eq!(doc.head_scripts().len(), 1);
    }

    #[test]
    fn test_activation_preserves_dom_order() {
        let mut doc = MemoryDocument::new()
            .with_script(ScriptTag::external(ConsentCategory::Marketing, "https://x/1.js"))
            .with_script(ScriptTag::inline(ConsentCategory::Marketing, "two();"))
            .with_script(ScriptTag::external(ConsentCategory::Marketing, "https://x/3.js"));
        let mut gate = ScriptGate::new();

        assert_eq!(gate.activate(&mut doc, ConsentCategory::Marketing), 3);
        let head = doc.head_scripts();
        assert_eq!(head[0].get_attr(ATTR_SRC), Some("https://x/1.js"));
        assert_eq!(head[1].content(), Some("two();"));
        assert_eq!(head[1].get_attr("type"), Some(TYPE_EXECUTABLE));
        assert_eq!(head[2].get_attr(ATTR_SRC), Some("https://x/3.js"));
    }

    #[test]
    fn test_other_categories_untouched() {
        let mut doc = MemoryDocument::new()
            .with_script(ScriptTag::external(ConsentCategory::Analytics, "https://x/a.js"))
            .with_script(ScriptTag::external(ConsentCategory::Marketing, "https://x/m.js"));
        let mut gate = ScriptGate::new();

        gate.activate(&mut doc, ConsentCategory::Analytics);
        assert_eq!(doc.head_scripts().len(), 1);
        assert_eq!(doc.placeholder_scripts().len(), 1);
        assert!(!gate.is_activated(ConsentCategory::Marketing));
    }
}
