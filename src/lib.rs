//! # ccl: embeddable cookie-consent engine
//!
//! `ccl` implements the client-side half of a cookie-consent system as a
//! headless, host-agnostic library: the banner/modal state machine,
//! consent persistence as cookies, consent-gated activation of deferred
//! third-party scripts, and the `cclConsentChanged` notification that
//! analytics SDKs subscribe to.
//!
//! The engine never touches a browser directly. The page is modeled by
//! two narrow seams, [`page::Document`] (elements, toggles, scripts,
//! events, scheduling) and [`cookie::CookieJar`] (the `document.cookie`
//! pair of primitives), with in-memory implementations for tests and
//! headless hosts. A WASM or server-side embedding implements the same
//! two traits over the real page.
//!
//! # Quick start
//!
//! ```
//! use ccl::prelude::*;
//!
//! let doc = MemoryDocument::new()
//!     .with_element("ccl-banner")
//!     .with_element("ccl-modal")
//!     .with_toggle(ConsentCategory::Analytics)
//!     .with_script(ScriptTag::external(
//!         ConsentCategory::Analytics,
//!         "https://example.com/analytics.js",
//!     ));
//!
//! let mut engine = ConsentEngine::new(doc, MemoryJar::new());
//! assert!(engine.initialize("ccl-banner", "ccl-modal", EngineSettings::new()));
//!
//! // No script runs until the visitor decides.
//! assert!(engine.document().head_scripts().is_empty());
//!
//! engine.accept_all();
//! assert!(engine.has_consent(ConsentCategory::Analytics));
//! assert_eq!(engine.document().head_scripts().len(), 1);
//! ```
//!
//! # Failure policy
//!
//! No public engine operation panics, throws, or returns an error to the
//! host page. Storage and environment failures degrade to safe defaults
//! and surface only through an injectable [`engine::DiagnosticSink`].
//! This is a hard contract, not an oversight: a consent layer must never
//! break the page embedding it.
//!
//! # Feature flags
//!
//! - `tracing`: provides [`engine::TracingSink`], forwarding degraded
//!   operations to `tracing` at warn level.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod category;
pub mod cookie;
pub mod engine;
pub mod event;
pub mod gate;
pub mod page;
pub mod record;
pub mod settings;

/// Commonly used types, re-exported for glob import.
pub mod prelude {
    pub use crate::category::{CategoryDefinition, ConsentCategory};
    pub use crate::cookie::{CookieJar, MemoryJar};
    pub use crate::engine::{ConsentEngine, DiagnosticSink, EngineState, MemorySink, NullSink};
    pub use crate::event::{ConsentChangedEvent, StorageGrant, CONSENT_CHANGED_EVENT};
    pub use crate::gate::ScriptGate;
    pub use crate::page::{Capabilities, Document, MemoryDocument, ScriptTag};
    pub use crate::record::{ConsentDecision, ConsentRecord, ConsentSnapshot};
    pub use crate::settings::EngineSettings;

    #[cfg(feature = "tracing")]
    pub use crate::engine::TracingSink;
}
