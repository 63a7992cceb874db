//! The consent engine: state machine, consent actions, and the
//! never-throw public surface.
//!
//! One [`ConsentEngine`] instance owns the consent state for one page
//! load. It is constructed with its host seams (a [`Document`] and a
//! [`CookieJar`]) and configured through [`initialize`]; there is no
//! global namespace and no hidden singleton.
//!
//! # State machine
//!
//! ```text
//! Uninitialized ──initialize──► AwaitingDecision ──accept/reject/save──► Decided
//!       │                            │  ▲                                  ▲
//!       │ (valid cookie at init)     ▼  │ (close / overlay / Escape)       │
//!       └────────────────────►  ModalOpen ──accept/reject/save─────────────┘
//! ```
//!
//! # Failure policy
//!
//! No public operation throws or returns an error. A storage or host
//! failure degrades to a safe default (`false`, `None`, no-op) and is
//! reported through the injectable [`DiagnosticSink`], so a host page
//! can never be broken by its consent layer and a test suite can still
//! assert on the failure paths. UI transitions deliberately proceed even
//! when persistence fails: the visitor is never stuck behind a banner
//! because their browser blocked a cookie write.
//!
//! [`initialize`]: ConsentEngine::initialize

use crate::category::ConsentCategory;
use crate::cookie::{CookieError, CookieJar, MS_PER_DAY};
use crate::event::ConsentChangedEvent;
use crate::gate::ScriptGate;
use crate::page::{Capabilities, Document};
use crate::record::{self, ConsentRecord, ConsentSnapshot};
use crate::settings::EngineSettings;
use std::time::Duration;

/// How long the banner's exit transition is given before the element is
/// actually hidden.
pub const BANNER_EXIT_DELAY: Duration = Duration::from_millis(300);

/// Internal failure taxonomy. Never escapes the public API; surfaces
/// only through the [`DiagnosticSink`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// A required browser capability is missing.
    #[error("environment unsupported: missing capabilities {missing:?}")]
    EnvironmentUnsupported {
        /// The capabilities the host failed to provide.
        missing: Capabilities,
    },
    /// A required element was not found in the page.
    #[error("element not found: {id:?}")]
    MissingTarget {
        /// The id that failed to resolve.
        id: String,
    },
    /// The cookie store failed partway through an operation.
    #[error("storage failure: {0}")]
    Storage(#[from] CookieError),
    /// Input failed the allow-list check before any write.
    #[error("malformed input: {0}")]
    MalformedInput(String),
    /// An operation was invoked before a successful `initialize`.
    #[error("engine not initialized")]
    NotInitialized,
}

/// Receiver for internal failures.
///
/// The engine swallows every error at its public boundary; this is the
/// only place they surface. Inject a collecting sink in tests to assert
/// on failure paths without exceptions.
pub trait DiagnosticSink {
    /// Called once per degraded operation.
    fn failure(&self, operation: &'static str, error: &EngineError);
}

/// Sink that discards everything (the production default).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn failure(&self, _operation: &'static str, _error: &EngineError) {}
}

/// Sink that records failures for later inspection. Clones share the
/// same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    entries: std::sync::Arc<parking_lot::Mutex<Vec<(String, String)>>>,
}

impl MemorySink {
    /// Empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded `(operation, error)` pairs, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries.lock().clone()
    }

    /// Whether any failure was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl DiagnosticSink for MemorySink {
    fn failure(&self, operation: &'static str, error: &EngineError) {
        self.entries
            .lock()
            .push((operation.to_string(), error.to_string()));
    }
}

/// Sink that forwards failures to `tracing` at warn level.
#[cfg(feature = "tracing")]
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[cfg(feature = "tracing")]
impl DiagnosticSink for TracingSink {
    fn failure(&self, operation: &'static str, error: &EngineError) {
        tracing::warn!(target: "ccl", operation, error = %error, "consent operation degraded");
    }
}

/// Where the engine is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    /// `initialize` has not succeeded yet.
    #[default]
    Uninitialized,
    /// Banner visible, no valid consent recorded.
    AwaitingDecision,
    /// Preferences modal visible, overlaying the previous state.
    ModalOpen,
    /// Valid non-expired consent recorded, banner suppressed.
    Decided,
}

/// The consent state machine and script-gating engine.
///
/// Single instance per page load; the engine assumes no concurrent
/// consent-writing agent exists on the same page.
///
/// # Example
///
/// ```
/// use ccl::category::ConsentCategory;
/// use ccl::cookie::MemoryJar;
/// use ccl::engine::{ConsentEngine, EngineState};
/// use ccl::page::MemoryDocument;
/// use ccl::settings::EngineSettings;
///
/// let doc = MemoryDocument::new()
///     .with_element("ccl-banner")
///     .with_element("ccl-modal");
/// let mut engine = ConsentEngine::new(doc, MemoryJar::new());
///
/// assert!(engine.initialize("ccl-banner", "ccl-modal", EngineSettings::new()));
/// assert_eq!(engine.state(), EngineState::AwaitingDecision);
///
/// engine.accept_all();
/// assert_eq!(engine.state(), EngineState::Decided);
/// assert!(engine.has_consent(ConsentCategory::Analytics));
/// ```
pub struct ConsentEngine<D, J> {
    doc: D,
    jar: J,
    settings: EngineSettings,
    state: EngineState,
    // Where closing the modal returns to.
    resume_state: EngineState,
    gate: ScriptGate,
    banner_id: String,
    modal_id: String,
    sink: Box<dyn DiagnosticSink>,
}

impl<D: Document, J: CookieJar> ConsentEngine<D, J> {
    /// Create an engine over its host seams. Call
    /// [`initialize`](ConsentEngine::initialize) before anything else.
    pub fn new(doc: D, jar: J) -> Self {
        Self {
            doc,
            jar,
            settings: EngineSettings::default(),
            state: EngineState::Uninitialized,
            resume_state: EngineState::AwaitingDecision,
            gate: ScriptGate::new(),
            banner_id: String::new(),
            modal_id: String::new(),
            sink: Box::new(NullSink),
        }
    }

    /// Replace the diagnostic sink.
    #[must_use]
    pub fn with_diagnostics(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Wire the engine to its banner and modal and settle the initial
    /// state.
    ///
    /// Returns `false`, performing no partial mutation, when a
    /// required capability is missing or either element is absent.
    /// Re-invocation re-runs the wiring; avoiding double-binding in a
    /// real host is the caller's responsibility.
    ///
    /// With a valid non-expired consent cookie already present, the
    /// banner is suppressed entirely and the engine lands in
    /// [`EngineState::Decided`]. Either way, categories whose cookies
    /// already read `"true"` get their deferred scripts activated.
    pub fn initialize(
        &mut self,
        banner_id: &str,
        modal_id: &str,
        settings: EngineSettings,
    ) -> bool {
        let missing = Capabilities::REQUIRED - self.doc.capabilities();
        if !missing.is_empty() {
            self.sink
                .failure("initialize", &EngineError::EnvironmentUnsupported { missing });
            return false;
        }
        for id in [banner_id, modal_id] {
            if !self.doc.element_exists(id) {
                self.sink.failure(
                    "initialize",
                    &EngineError::MissingTarget { id: id.to_string() },
                );
                return false;
            }
        }

        self.banner_id = banner_id.to_string();
        self.modal_id = modal_id.to_string();
        self.settings = settings;
        self.doc.set_visible(modal_id, false);

        if record::load_record(&self.jar).is_some() {
            // Valid decision on file: skip the banner entirely.
            self.doc.set_visible(banner_id, false);
            self.state = EngineState::Decided;
        } else {
            self.doc.set_visible(banner_id, true);
            self.state = EngineState::AwaitingDecision;
        }
        self.resume_state = self.state;

        // Activate whatever already has consent (page reload after an
        // earlier decision, or a partial record).
        for category in ConsentCategory::OPTIONAL {
            if record::has_consent(&self.jar, category) {
                self.gate.activate(&mut self.doc, category);
            }
        }
        true
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// The active settings.
    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// The host document (for assertions and rendering).
    #[must_use]
    pub fn document(&self) -> &D {
        &self.doc
    }

    /// Mutable host document access.
    pub fn document_mut(&mut self) -> &mut D {
        &mut self.doc
    }

    /// The cookie store.
    #[must_use]
    pub fn jar(&self) -> &J {
        &self.jar
    }

    // === Modal transitions ===

    /// Open the preferences modal, loading each toggle from its cookie
    /// (no cookie reads as off).
    pub fn open_preferences(&mut self) {
        match self.state {
            EngineState::Uninitialized => {
                self.sink
                    .failure("open_preferences", &EngineError::NotInitialized);
            }
            EngineState::ModalOpen => {}
            EngineState::AwaitingDecision | EngineState::Decided => {
                self.resume_state = self.state;
                for category in ConsentCategory::OPTIONAL {
                    let checked = record::has_consent(&self.jar, category);
                    self.doc.set_toggle(category, checked);
                }
                self.doc.set_visible(&self.modal_id, true);
                self.state = EngineState::ModalOpen;
            }
        }
    }

    /// Close the preferences modal, discarding unsaved toggle edits.
    pub fn close_preferences(&mut self) {
        if self.state == EngineState::ModalOpen {
            self.doc.set_visible(&self.modal_id, false);
            self.state = self.resume_state;
        }
    }

    /// `Escape` pressed. Only acts while the modal is open.
    pub fn handle_escape(&mut self) {
        self.close_preferences();
    }

    /// Overlay background clicked. Only acts while the modal is open.
    pub fn handle_overlay_click(&mut self) {
        self.close_preferences();
    }

    /// Flip a category's toggle while the modal is open. Returns the new
    /// checked state, or `None` when the toggle cannot be changed
    /// (essential, modal closed, or no such toggle).
    pub fn set_toggle(&mut self, category: ConsentCategory, checked: bool) -> Option<bool> {
        if self.state != EngineState::ModalOpen || !category.is_togglable() {
            return None;
        }
        self.doc.toggle_state(category)?;
        self.doc.set_toggle(category, checked);
        Some(checked)
    }

    // === Consent actions ===

    /// Accept every offered category. Categories disabled in settings
    /// are not written at all and read back as "no consent".
    pub fn accept_all(&mut self) {
        if self.guard_initialized("accept_all") {
            let granted: Vec<ConsentCategory> = ConsentCategory::OPTIONAL
                .into_iter()
                .filter(|c| self.settings.is_enabled(*c))
                .collect();
            let record = ConsentRecord::accepted(&granted, self.expires_at_ms());
            self.commit("accept_all", record);
        }
    }

    /// Reject every optional category, written `false` unconditionally
    /// regardless of settings enablement. An explicit opt-out.
    pub fn reject_all(&mut self) {
        if self.guard_initialized("reject_all") {
            let record = ConsentRecord::rejected(self.expires_at_ms());
            self.commit("reject_all", record);
        }
    }

    /// Persist the live modal toggle states. Unchecked or missing
    /// toggles become `false`.
    pub fn save_preferences(&mut self) {
        if self.guard_initialized("save_preferences") {
            let doc = &self.doc;
            let record = ConsentRecord::customized(
                |category| doc.toggle_state(category).unwrap_or(false),
                self.expires_at_ms(),
            );
            self.commit("save_preferences", record);
        }
    }

    // === Reads ===

    /// Whether a category currently has consent. Reads the category's
    /// cookie; only the literal value `"true"` counts.
    #[must_use]
    pub fn has_consent(&self, category: ConsentCategory) -> bool {
        record::has_consent(&self.jar, category)
    }

    /// String-keyed [`has_consent`](ConsentEngine::has_consent). Names
    /// outside the category allow-list are `false`, never an error.
    #[must_use]
    pub fn has_consent_named(&self, category: &str) -> bool {
        match category.parse::<ConsentCategory>() {
            Ok(cat) => self.has_consent(cat),
            Err(err) => {
                self.sink.failure(
                    "has_consent",
                    &EngineError::MalformedInput(err.to_string()),
                );
                false
            }
        }
    }

    /// The authoritative record, if a valid non-expired one is stored.
    #[must_use]
    pub fn consent_status(&self) -> Option<ConsentRecord> {
        record::load_record(&self.jar)
    }

    /// Independent per-cookie snapshot (non-atomic; see
    /// [`ConsentSnapshot`]).
    #[must_use]
    pub fn consent_snapshot(&self) -> ConsentSnapshot {
        ConsentSnapshot::read(&self.jar)
    }

    /// Whether any decision cookie exists.
    #[must_use]
    pub fn has_any_consent(&self) -> bool {
        record::has_any_consent(&self.jar)
    }

    /// Whether the stored decision has expired (no stored expiry counts
    /// as expired).
    #[must_use]
    pub fn is_consent_expired(&self) -> bool {
        record::is_consent_expired(&self.jar)
    }

    /// When consent was given, recovered from the stored expiry and the
    /// configured lifetime. Epoch milliseconds.
    #[must_use]
    pub fn consent_date_ms(&self) -> Option<i64> {
        record::consent_date_ms(&self.jar, self.settings.expiration())
    }

    // === Maintenance ===

    /// Clear expired consent cookies and ask the page to reload so the
    /// banner shows again. Does nothing while the stored decision is
    /// still live.
    pub fn refresh_consent(&mut self) {
        if self.is_consent_expired() && self.has_any_consent() {
            record::clear_consent_cookies(&self.jar);
            self.doc.request_reload();
        }
    }

    /// Development-only escape hatch: clear every consent cookie and
    /// reload. A no-op (returning `false`) unless
    /// [`EngineSettings::debug_enabled`] is set.
    pub fn reset_consent(&mut self) -> bool {
        if !self.settings.debug_enabled {
            return false;
        }
        record::clear_consent_cookies(&self.jar);
        self.doc.request_reload();
        true
    }

    // === Internals ===

    fn expires_at_ms(&self) -> i64 {
        self.jar.now_ms() + i64::from(self.settings.expiration()) * MS_PER_DAY
    }

    fn guard_initialized(&self, operation: &'static str) -> bool {
        if self.state == EngineState::Uninitialized {
            self.sink.failure(operation, &EngineError::NotInitialized);
            return false;
        }
        true
    }

    /// Persist a record and run the shared decision tail: hide modal,
    /// start the banner exit, dispatch the event, activate granted
    /// categories. The UI transitions run even when persistence failed.
    fn commit(&mut self, operation: &'static str, record: ConsentRecord) {
        let now_ms = self.jar.now_ms();
        let days = i64::from(self.settings.expiration());
        if let Err(err) = record::write_record(&self.jar, &record, days, false) {
            self.sink.failure(operation, &EngineError::Storage(err));
        }

        self.doc.set_visible(&self.modal_id, false);
        self.doc.begin_exit(&self.banner_id);
        self.doc.schedule_hide(&self.banner_id, BANNER_EXIT_DELAY);
        self.state = EngineState::Decided;
        self.resume_state = EngineState::Decided;

        self.doc
            .dispatch(ConsentChangedEvent::for_record(&record, now_ms));
        for category in record.granted_categories().collect::<Vec<_>>() {
            self.gate.activate(&mut self.doc, category);
        }
    }
}
