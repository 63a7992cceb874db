//! The host-page seam.
//!
//! The engine never touches a real DOM. Everything it needs from the
//! page (element visibility, modal toggle state, placeholder script
//! discovery and injection, event dispatch, deferred scheduling) goes
//! through the [`Document`] trait. A browser embedding implements it
//! over the real DOM; [`MemoryDocument`] implements it in-process for
//! tests and headless hosts.
//!
//! # Script-gating markup contract
//!
//! A deferred script is recognized by its `data-category` attribute. It
//! carries either a `data-src` attribute (an external script, promoted
//! to a real `src` on activation) or inline content typed `text/plain`
//! (inert until promoted to `text/javascript`). Any reimplementation of
//! the page side must preserve these markers for template compatibility.
//!
//! # Example
//!
//! ```
//! use ccl::category::ConsentCategory;
//! use ccl::page::ScriptTag;
//!
//! let tag = ScriptTag::external(ConsentCategory::Analytics, "https://example.com/ga.js")
//!     .attr("async", "async");
//! let promoted = tag.promote().unwrap();
//! assert_eq!(promoted.get_attr("src"), Some("https://example.com/ga.js"));
//! assert_eq!(promoted.get_attr("async"), Some("async"));
//! assert_eq!(promoted.get_attr("data-category"), None);
//! ```

use crate::category::ConsentCategory;
use crate::event::ConsentChangedEvent;
use bitflags::bitflags;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use smartstring::alias::String as SmartString;
use std::str::FromStr;
use std::time::Duration;

/// Marker attribute naming a placeholder's category.
pub const ATTR_CATEGORY: &str = "data-category";

/// Marker attribute carrying a deferred external source.
pub const ATTR_DEFERRED_SRC: &str = "data-src";

/// Real source attribute, set on activation.
pub const ATTR_SRC: &str = "src";

/// Script type attribute.
pub const ATTR_TYPE: &str = "type";

/// Inert script type: the browser parses but never executes it.
pub const TYPE_INERT: &str = "text/plain";

/// Executable script type, set on activation.
pub const TYPE_EXECUTABLE: &str = "text/javascript";

bitflags! {
    /// Browser capabilities the engine requires.
    ///
    /// All four are checked up front at initialization; a missing one
    /// fails `initialize` before any state is touched.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        /// Cookie store can be read and written.
        const COOKIE_STORE = 1 << 0;
        /// Elements can be looked up by id/selector.
        const QUERY = 1 << 1;
        /// Document-level events can be dispatched and listened to.
        const EVENTS = 1 << 2;
        /// Deferred callbacks can be scheduled.
        const SCHEDULING = 1 << 3;
    }
}

impl Capabilities {
    /// Everything [`initialize`](crate::engine::ConsentEngine::initialize)
    /// requires.
    pub const REQUIRED: Capabilities = Capabilities::all();
}

/// One script element: an ordered attribute map plus optional inline
/// content. Attribute order is DOM attribute order and is preserved
/// through promotion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScriptTag {
    attributes: IndexMap<SmartString, SmartString>,
    content: Option<String>,
}

impl ScriptTag {
    /// A deferred external script for `category` loading `src` once
    /// activated.
    #[must_use]
    pub fn external(category: ConsentCategory, src: impl AsRef<str>) -> Self {
        let mut tag = Self::default();
        tag.set_attr(ATTR_CATEGORY, category.as_str());
        tag.set_attr(ATTR_DEFERRED_SRC, src.as_ref());
        tag
    }

    /// A deferred inline script for `category`, typed inert until
    /// activated.
    #[must_use]
    pub fn inline(category: ConsentCategory, content: impl Into<String>) -> Self {
        let mut tag = Self::default();
        tag.set_attr(ATTR_CATEGORY, category.as_str());
        tag.set_attr(ATTR_TYPE, TYPE_INERT);
        tag.content = Some(content.into());
        tag
    }

    /// Builder-style attribute set.
    #[must_use]
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Set an attribute in place, preserving first-insertion order.
    pub fn set_attr(&mut self, name: &str, value: &str) {
        self.attributes
            .insert(SmartString::from(name), SmartString::from(value));
    }

    /// Get an attribute value.
    #[must_use]
    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|v| v.as_str())
    }

    /// Inline content, if any.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// Attributes in DOM order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The category this placeholder is gated on, if its marker names a
    /// known category.
    #[must_use]
    pub fn category(&self) -> Option<ConsentCategory> {
        self.get_attr(ATTR_CATEGORY)
            .and_then(|s| ConsentCategory::from_str(s).ok())
    }

    /// Whether this is a deferred external placeholder.
    #[must_use]
    pub fn is_deferred_external(&self) -> bool {
        self.get_attr(ATTR_DEFERRED_SRC).is_some()
    }

    /// Whether this is an inert inline placeholder.
    #[must_use]
    pub fn is_inert_inline(&self) -> bool {
        self.content.as_deref().is_some_and(|c| !c.is_empty())
            && self.get_attr(ATTR_TYPE) == Some(TYPE_INERT)
    }

    /// Build the executable script that replaces this placeholder.
    ///
    /// External placeholders get `src` from `data-src`; inert inline
    /// placeholders get the executable type and identical content. All
    /// non-marker attributes are copied in order. Returns `None` when
    /// the tag matches neither placeholder form (it is left alone).
    #[must_use]
    pub fn promote(&self) -> Option<ScriptTag> {
        if self.is_deferred_external() {
            let mut promoted = Self::default();
            promoted.set_attr(ATTR_SRC, self.get_attr(ATTR_DEFERRED_SRC)?);
            for (name, value) in self.attributes() {
                if name != ATTR_CATEGORY && name != ATTR_DEFERRED_SRC {
                    promoted.set_attr(name, value);
                }
            }
            Some(promoted)
        } else if self.is_inert_inline() {
            let mut promoted = Self::default();
            promoted.set_attr(ATTR_TYPE, TYPE_EXECUTABLE);
            for (name, value) in self.attributes() {
                if name != ATTR_CATEGORY && name != ATTR_TYPE {
                    promoted.set_attr(name, value);
                }
            }
            promoted.content = self.content.clone();
            Some(promoted)
        } else {
            None
        }
    }
}

/// What the engine needs from the host page.
///
/// Implementations are expected to be cheap and synchronous; the only
/// deferred operation is [`schedule_hide`](Document::schedule_hide),
/// which is fire-and-forget and must no-op gracefully when the element
/// is gone by the time it fires.
pub trait Document {
    /// Capabilities of this host. Checked once at initialization.
    fn capabilities(&self) -> Capabilities;

    /// Whether an element with this id exists.
    fn element_exists(&self, id: &str) -> bool;

    /// Whether an element is currently displayed.
    fn is_visible(&self, id: &str) -> bool;

    /// Show or hide an element immediately.
    fn set_visible(&mut self, id: &str, visible: bool);

    /// Start an element's exit transition (it stays in the layout until
    /// the scheduled hide fires).
    fn begin_exit(&mut self, id: &str);

    /// Hide an element after `delay`. Must no-op if the element has been
    /// removed when the callback fires.
    fn schedule_hide(&mut self, id: &str, delay: Duration);

    /// Current checked state of a category's modal toggle, or `None`
    /// when the modal has no toggle for it.
    fn toggle_state(&self, category: ConsentCategory) -> Option<bool>;

    /// Set a category's toggle (checkbox state and visual together).
    fn set_toggle(&mut self, category: ConsentCategory, checked: bool);

    /// Remove and return the deferred placeholders for `category`, in
    /// DOM order. Only tags in one of the two deferred forms (external
    /// `data-src`, or inert inline) are taken; anything else tagged with
    /// the category stays in the page untouched.
    fn take_scripts_for_category(
        &mut self,
        category: ConsentCategory,
    ) -> SmallVec<[ScriptTag; 4]>;

    /// Append an executable script to the document head.
    fn inject_script(&mut self, tag: ScriptTag);

    /// Dispatch the document-level consent-changed event.
    fn dispatch(&mut self, event: ConsentChangedEvent);

    /// Request a page reload (debug reset path).
    fn request_reload(&mut self);
}

// === In-memory document ===

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ElementState {
    visible: bool,
    exiting: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ToggleState {
    checked: bool,
    // Stands in for the styled switch element; must never diverge from
    // the checkbox state.
    visual_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingHide {
    id: String,
    remaining: Duration,
}

/// In-memory [`Document`] for tests and headless embedding.
///
/// Time does not pass on its own: scheduled hides sit in a pending list
/// until [`advance`](MemoryDocument::advance) is called, which lets
/// tests observe the exit-transition window deterministically.
#[derive(Debug, Default)]
pub struct MemoryDocument {
    capabilities_mask: Option<Capabilities>,
    elements: FxHashMap<String, ElementState>,
    toggles: FxHashMap<ConsentCategory, ToggleState>,
    scripts: Vec<ScriptTag>,
    head: Vec<ScriptTag>,
    events: Vec<ConsentChangedEvent>,
    pending_hides: Vec<PendingHide>,
    reloads_requested: u32,
}

impl MemoryDocument {
    /// Empty page with full capabilities.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a visible element.
    #[must_use]
    pub fn with_element(mut self, id: impl Into<String>) -> Self {
        self.add_element(id);
        self
    }

    /// Add a visible element in place.
    pub fn add_element(&mut self, id: impl Into<String>) {
        self.elements.insert(
            id.into(),
            ElementState {
                visible: true,
                exiting: false,
            },
        );
    }

    /// Remove an element entirely (scheduled hides for it must no-op).
    pub fn remove_element(&mut self, id: &str) {
        self.elements.remove(id);
    }

    /// Add a modal toggle for a category, initially unchecked.
    #[must_use]
    pub fn with_toggle(mut self, category: ConsentCategory) -> Self {
        self.toggles.insert(
            category,
            ToggleState {
                checked: false,
                visual_active: false,
            },
        );
        self
    }

    /// Add a deferred placeholder script, appended in DOM order.
    #[must_use]
    pub fn with_script(mut self, tag: ScriptTag) -> Self {
        self.add_script(tag);
        self
    }

    /// Add a deferred placeholder script in place.
    pub fn add_script(&mut self, tag: ScriptTag) {
        self.scripts.push(tag);
    }

    /// Report fewer capabilities than the default (everything).
    #[must_use]
    pub fn with_capabilities(mut self, caps: Capabilities) -> Self {
        self.capabilities_mask = Some(caps);
        self
    }

    /// Whether an element has started its exit transition.
    #[must_use]
    pub fn is_exiting(&self, id: &str) -> bool {
        self.elements.get(id).is_some_and(|e| e.exiting)
    }

    /// Advance virtual time, firing any due scheduled hides.
    pub fn advance(&mut self, delta: Duration) {
        let mut due = Vec::new();
        self.pending_hides.retain_mut(|pending| {
            if pending.remaining <= delta {
                due.push(pending.id.clone());
                false
            } else {
                pending.remaining -= delta;
                true
            }
        });
        for id in due {
            // No-op when the element was removed before the timer fired.
            if let Some(element) = self.elements.get_mut(&id) {
                element.visible = false;
                element.exiting = false;
            }
        }
    }

    /// Remaining placeholders still in the page, in DOM order.
    #[must_use]
    pub fn placeholder_scripts(&self) -> &[ScriptTag] {
        &self.scripts
    }

    /// Executable scripts injected into the head, in injection order.
    #[must_use]
    pub fn head_scripts(&self) -> &[ScriptTag] {
        &self.head
    }

    /// Events dispatched so far, oldest first.
    #[must_use]
    pub fn dispatched_events(&self) -> &[ConsentChangedEvent] {
        &self.events
    }

    /// Number of reloads the page was asked to perform.
    #[must_use]
    pub fn reloads_requested(&self) -> u32 {
        self.reloads_requested
    }

    /// Number of hides still pending.
    #[must_use]
    pub fn pending_hide_count(&self) -> usize {
        self.pending_hides.len()
    }
}

impl Document for MemoryDocument {
    fn capabilities(&self) -> Capabilities {
        self.capabilities_mask.unwrap_or(Capabilities::all())
    }

    fn element_exists(&self, id: &str) -> bool {
        self.elements.contains_key(id)
    }

    fn is_visible(&self, id: &str) -> bool {
        self.elements.get(id).is_some_and(|e| e.visible)
    }

    fn set_visible(&mut self, id: &str, visible: bool) {
        if let Some(element) = self.elements.get_mut(id) {
            element.visible = visible;
            if visible {
                element.exiting = false;
            }
        }
    }

    fn begin_exit(&mut self, id: &str) {
        if let Some(element) = self.elements.get_mut(id) {
            element.exiting = true;
        }
    }

    fn schedule_hide(&mut self, id: &str, delay: Duration) {
        self.pending_hides.push(PendingHide {
            id: id.to_string(),
            remaining: delay,
        });
    }

    fn toggle_state(&self, category: ConsentCategory) -> Option<bool> {
        self.toggles.get(&category).map(|t| t.checked)
    }

    fn set_toggle(&mut self, category: ConsentCategory, checked: bool) {
        if let Some(toggle) = self.toggles.get_mut(&category) {
            toggle.checked = checked;
            toggle.visual_active = checked;
        }
    }

    fn take_scripts_for_category(
        &mut self,
        category: ConsentCategory,
    ) -> SmallVec<[ScriptTag; 4]> {
        let mut taken = SmallVec::new();
        let mut remaining = Vec::with_capacity(self.scripts.len());
        for tag in self.scripts.drain(..) {
            let deferred = tag.is_deferred_external() || tag.is_inert_inline();
            if tag.category() == Some(category) && deferred {
                taken.push(tag);
            } else {
                remaining.push(tag);
            }
        }
        self.scripts = remaining;
        taken
    }

    fn inject_script(&mut self, tag: ScriptTag) {
        self.head.push(tag);
    }

    fn dispatch(&mut self, event: ConsentChangedEvent) {
        self.events.push(event);
    }

    fn request_reload(&mut self) {
        self.reloads_requested += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_promotion_preserves_attrs() {
        let tag = ScriptTag::external(ConsentCategory::Analytics, "https://x.test/a.js")
            .attr("async", "async")
            .attr("id", "ga");
        let promoted = tag.promote().unwrap();

        assert_eq!(promoted.get_attr(ATTR_SRC), Some("https://x.test/a.js"));
        assert_eq!(promoted.get_attr("async"), Some("async"));
        assert_eq!(promoted.get_attr("id"), Some("ga"));
        assert_eq!(promoted.get_attr(ATTR_CATEGORY), None);
        assert_eq!(promoted.get_attr(ATTR_DEFERRED_SRC), None);

        // src first, then non-marker attrs in original order.
        let names: Vec<_> = promoted.attributes().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, vec!["src", "async", "id"]);
    }

    #[test]
    fn test_inline_promotion_keeps_content() {
        let tag = ScriptTag::inline(ConsentCategory::Marketing, "track();").attr("id", "mk");
        let promoted = tag.promote().unwrap();
        assert_eq!(promoted.get_attr(ATTR_TYPE), Some(TYPE_EXECUTABLE));
        assert_eq!(promoted.content(), Some("track();"));
        assert_eq!(promoted.get_attr("id"), Some("mk"));
        assert_eq!(promoted.get_attr(ATTR_CATEGORY), None);
    }

    #[test]
    fn test_unmarked_tag_not_promotable() {
        let tag = ScriptTag::default().attr("src", "https://x.test/plain.js");
        assert!(tag.promote().is_none());

        // Inline content without the inert type is already executable.
        let mut tag = ScriptTag::default();
        tag.content = Some("run();".into());
        assert!(tag.promote().is_none());
    }

    #[test]
    fn test_take_scripts_preserves_dom_order() {
        let mut doc = MemoryDocument::new()
            .with_script(ScriptTag::external(ConsentCategory::Analytics, "https://x/1.js"))
            .with_script(ScriptTag::external(ConsentCategory::Marketing, "https://x/m.js"))
            .with_script(ScriptTag::inline(ConsentCategory::Analytics, "two();"));

        let taken = doc.take_scripts_for_category(ConsentCategory::Analytics);
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].get_attr(ATTR_DEFERRED_SRC), Some("https://x/1.js"));
        assert_eq!(taken[1].content(), Some("two();"));
        assert_eq!(doc.placeholder_scripts().len(), 1);
    }

    #[test]
    fn test_scheduled_hide_fires_after_delay() {
        let mut doc = MemoryDocument::new().with_element("banner");
        doc.schedule_hide("banner", Duration::from_millis(300));

        doc.advance(Duration::from_millis(299));
        assert!(doc.is_visible("banner"));

        doc.advance(Duration::from_millis(1));
        assert!(!doc.is_visible("banner"));
    }

    #[test]
    fn test_scheduled_hide_noop_when_element_removed() {
        let mut doc = MemoryDocument::new().with_element("banner");
        doc.schedule_hide("banner", Duration::from_millis(300));
        doc.remove_element("banner");
        doc.advance(Duration::from_millis(300));
        assert_eq!(doc.pending_hide_count(), 0);
    }

    #[test]
    fn test_toggle_visual_stays_in_sync() {
        let mut doc = MemoryDocument::new().with_toggle(ConsentCategory::Analytics);
        assert_eq!(doc.toggle_state(ConsentCategory::Analytics), Some(false));

        doc.set_toggle(ConsentCategory::Analytics, true);
        assert_eq!(doc.toggle_state(ConsentCategory::Analytics), Some(true));
        let toggle = doc.toggles[&ConsentCategory::Analytics];
        assert_eq!(toggle.checked, toggle.visual_active);

        // No toggle registered for marketing.
        assert_eq!(doc.toggle_state(ConsentCategory::Marketing), None);
    }

    #[test]
    fn test_restricted_capabilities() {
        let doc = MemoryDocument::new()
            .with_capabilities(Capabilities::QUERY | Capabilities::EVENTS);
        assert!(!doc.capabilities().contains(Capabilities::REQUIRED));
    }
}
