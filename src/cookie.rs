//! Cookie codec and the cookie-store seam.
//!
//! The engine never talks to a real browser directly; it reads and writes
//! cookies through the [`CookieJar`] trait, which models the two
//! primitives a page actually has: read the joined cookie string, and
//! write one set-cookie string. [`MemoryJar`] implements the trait
//! in-process with a mockable clock, which is what the test suites and
//! embedders without a browser use.
//!
//! Names and values are URL-component encoded, so reserved characters
//! (`;`, `=`, spaces, `%`) round-trip exactly. Every read is an
//! independent linear scan of the full cookie string; there is no cache
//! layer, so callers must tolerate repeated parsing cost.
//!
//! All timestamps are epoch **milliseconds**. The `expires` attribute is
//! rendered and parsed in the classic `Thu, 01 Jan 1970 00:00:00 GMT`
//! shape.
//!
//! # Example
//!
//! ```
//! use ccl::cookie::{get_cookie, set_cookie, MemoryJar};
//!
//! let jar = MemoryJar::new();
//! assert!(set_cookie(&jar, "ccl_consent", "accepted", 180, false));
//! assert_eq!(get_cookie(&jar, "ccl_consent").as_deref(), Some("accepted"));
//! ```

use chrono::{NaiveDateTime, Utc};
use parking_lot::RwLock;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::settings::clamp_days;

/// Cookie holding the overall decision: `accepted`, `rejected`, or
/// `customized`.
pub const CONSENT_COOKIE: &str = "ccl_consent";

/// Cookie holding the record expiration as decimal epoch milliseconds.
pub const EXPIRY_COOKIE: &str = "ccl_consent_expiry";

/// Cookie holding the full serialized consent record. Written alongside
/// the individual contract cookies so reads have an atomic source.
pub const RECORD_COOKIE: &str = "ccl_record";

/// Milliseconds per day.
pub const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// `expires` attribute format (always GMT).
const EXPIRES_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Characters kept verbatim by the component encoder, matching the
/// unreserved set of `encodeURIComponent`.
const COOKIE_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Failures at the cookie-store boundary.
///
/// These never reach the engine's public API; they are converted to safe
/// defaults (`false`/`None`/no-op) at the boundary of each operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CookieError {
    /// The cookie store cannot be read (privacy mode, sandboxing).
    #[error("cookie store is unavailable")]
    Unavailable,
    /// The cookie store refused a write.
    #[error("cookie write rejected")]
    WriteRejected,
    /// A set-cookie string or stored entry could not be parsed.
    #[error("malformed cookie data: {0}")]
    Malformed(String),
}

/// The page's cookie store.
///
/// This is the `document.cookie` seam: one string out, one set-cookie
/// string in. The clock lives here because cookie expiry is decided by
/// the store, and tests steer it.
pub trait CookieJar {
    /// Read the joined `name=value; name=value` cookie string, excluding
    /// expired entries. Names and values are component-encoded.
    fn read_raw(&self) -> Result<String, CookieError>;

    /// Apply a single set-cookie string (`name=value; attrs...`).
    fn write_raw(&self, set_cookie: &str) -> Result<(), CookieError>;

    /// Current time as epoch milliseconds.
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

// === Codec primitives ===

/// Component-encode a cookie name or value.
#[must_use]
pub fn encode_component(s: &str) -> String {
    utf8_percent_encode(s, COOKIE_COMPONENT).to_string()
}

/// Decode a component-encoded cookie name or value. Returns `None` for
/// invalid percent sequences or non-UTF-8 payloads.
#[must_use]
pub fn decode_component(s: &str) -> Option<String> {
    percent_decode_str(s).decode_utf8().ok().map(|c| c.into_owned())
}

/// Render an epoch-milliseconds timestamp as an `expires` attribute value.
#[must_use]
pub fn format_expires(expires_ms: i64) -> String {
    match chrono::DateTime::from_timestamp_millis(expires_ms) {
        Some(dt) => dt.format(EXPIRES_FORMAT).to_string(),
        // Out-of-range timestamp: fall back to the epoch (a delete).
        None => "Thu, 01 Jan 1970 00:00:00 GMT".to_string(),
    }
}

/// Parse an `expires` attribute value back to epoch milliseconds.
#[must_use]
pub fn parse_expires(s: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(s.trim(), EXPIRES_FORMAT)
        .ok()
        .map(|dt| dt.and_utc().timestamp_millis())
}

/// Build a set-cookie string for `name=value` lasting `days` from
/// `now_ms`, with `path=/` and `SameSite=Lax`.
///
/// Out-of-range `days` falls back to the 180-day default. `secure` is for
/// TLS server paths; the client write path never sets it. `HttpOnly` is
/// deliberately never emitted so page scripts can read consent values.
#[must_use]
pub fn format_set_cookie(name: &str, value: &str, days: i64, now_ms: i64, secure: bool) -> String {
    let days = clamp_days(days);
    let expires_ms = now_ms + i64::from(days) * MS_PER_DAY;
    let mut cookie = format!(
        "{}={}; expires={}; path=/; SameSite=Lax",
        encode_component(name),
        encode_component(value),
        format_expires(expires_ms),
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Build a set-cookie string that deletes `name` (expiration at the
/// epoch).
#[must_use]
pub fn format_delete_cookie(name: &str) -> String {
    format!(
        "{}=; expires=Thu, 01 Jan 1970 00:00:00 GMT; path=/",
        encode_component(name),
    )
}

// === Jar-level helpers ===

/// Read one cookie by name: an independent linear scan of the full cookie
/// string. Returns `None` for empty names, store failures, or absent
/// cookies.
#[must_use]
pub fn get_cookie(jar: &dyn CookieJar, name: &str) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    let raw = jar.read_raw().ok()?;
    let wanted = encode_component(name);
    for entry in raw.split(';') {
        // Entries without '=' can appear in real cookie strings; skip them.
        let Some((entry_name, entry_value)) = entry.trim().split_once('=') else {
            continue;
        };
        if entry_name == wanted {
            return decode_component(entry_value);
        }
    }
    None
}

/// Write one cookie. Returns `false` for empty names/values or store
/// failures; never panics or propagates.
#[must_use]
pub fn set_cookie(jar: &dyn CookieJar, name: &str, value: &str, days: i64, secure: bool) -> bool {
    if name.is_empty() || value.is_empty() {
        return false;
    }
    let set = format_set_cookie(name, value, days, jar.now_ms(), secure);
    jar.write_raw(&set).is_ok()
}

/// Delete one cookie by setting its expiration to the epoch.
pub fn delete_cookie(jar: &dyn CookieJar, name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    jar.write_raw(&format_delete_cookie(name)).is_ok()
}

// === In-memory jar ===

/// One stored cookie. Names and values are kept component-encoded, the
/// way a browser store keeps them.
#[derive(Debug, Clone)]
struct StoredCookie {
    name: String,
    value: String,
    expires_ms: Option<i64>,
}

#[derive(Debug)]
struct JarInner {
    cookies: Vec<StoredCookie>,
    now_ms: i64,
    available: bool,
    deny_writes: bool,
}

/// In-memory [`CookieJar`] with a steerable clock.
///
/// Expired cookies are not actively deleted; they are simply excluded
/// from [`read_raw`](CookieJar::read_raw), matching how a browser store
/// behaves between cleanups. Tests can advance the clock to cross
/// expiration boundaries and flip availability to simulate privacy mode.
#[derive(Debug)]
pub struct MemoryJar {
    inner: RwLock<JarInner>,
}

impl MemoryJar {
    /// Create an empty jar with the clock at the real current time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_now(Utc::now().timestamp_millis())
    }

    /// Create an empty jar with the clock at `now_ms`.
    #[must_use]
    pub fn with_now(now_ms: i64) -> Self {
        Self {
            inner: RwLock::new(JarInner {
                cookies: Vec::new(),
                now_ms,
                available: true,
                deny_writes: false,
            }),
        }
    }

    /// Set the clock.
    pub fn set_now(&self, now_ms: i64) {
        self.inner.write().now_ms = now_ms;
    }

    /// Advance the clock.
    pub fn advance(&self, delta_ms: i64) {
        self.inner.write().now_ms += delta_ms;
    }

    /// Simulate a store that cannot be read or written at all.
    pub fn set_available(&self, available: bool) {
        self.inner.write().available = available;
    }

    /// Simulate a store that reads fine but rejects writes.
    pub fn deny_writes(&self, deny: bool) {
        self.inner.write().deny_writes = deny;
    }

    /// Number of live (non-expired) cookies.
    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self.inner.read();
        inner
            .cookies
            .iter()
            .filter(|c| c.expires_ms.map_or(true, |e| e > inner.now_ms))
            .count()
    }

    /// Whether the jar holds no live cookies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryJar {
    fn default() -> Self {
        Self::new()
    }
}

impl CookieJar for MemoryJar {
    fn read_raw(&self) -> Result<String, CookieError> {
        let inner = self.inner.read();
        if !inner.available {
            return Err(CookieError::Unavailable);
        }
        let joined = inner
            .cookies
            .iter()
            .filter(|c| c.expires_ms.map_or(true, |e| e > inner.now_ms))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");
        Ok(joined)
    }

    fn write_raw(&self, set_cookie: &str) -> Result<(), CookieError> {
        let mut inner = self.inner.write();
        if !inner.available {
            return Err(CookieError::Unavailable);
        }
        if inner.deny_writes {
            return Err(CookieError::WriteRejected);
        }

        let mut segments = set_cookie.split(';');
        let pair = segments
            .next()
            .ok_or_else(|| CookieError::Malformed(set_cookie.to_string()))?;
        let (name, value) = pair
            .trim()
            .split_once('=')
            .ok_or_else(|| CookieError::Malformed(pair.to_string()))?;
        if name.is_empty() {
            return Err(CookieError::Malformed(pair.to_string()));
        }

        let mut expires_ms = None;
        for segment in segments {
            let segment = segment.trim();
            if let Some(raw) = segment
                .strip_prefix("expires=")
                .or_else(|| segment.strip_prefix("Expires="))
            {
                expires_ms = parse_expires(raw);
            }
            // path / SameSite / Secure attributes are accepted and
            // irrelevant to a single-path in-memory store.
        }

        // Expiration at or before the current time is a delete.
        if expires_ms.is_some_and(|e| e <= inner.now_ms) {
            inner.cookies.retain(|c| c.name != name);
            return Ok(());
        }

        let stored = StoredCookie {
            name: name.to_string(),
            value: value.to_string(),
            expires_ms,
        };
        if let Some(existing) = inner.cookies.iter_mut().find(|c| c.name == name) {
            *existing = stored;
        } else {
            inner.cookies.push(stored);
        }
        Ok(())
    }

    fn now_ms(&self) -> i64 {
        self.inner.read().now_ms
    }
}
