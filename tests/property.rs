//! Property-based tests for the cookie codec and consent records.
//!
//! Uses proptest to find edge cases automatically through randomized
//! testing.

use ccl::category::ConsentCategory;
use ccl::cookie::{
    decode_component, encode_component, format_set_cookie, get_cookie, set_cookie, MemoryJar,
    MS_PER_DAY,
};
use ccl::record::{load_record, write_record, ConsentRecord};
use ccl::settings::clamp_days;
use proptest::prelude::*;

// ============================================================================
// Codec Property Tests
// ============================================================================

proptest! {
    /// Component encoding round-trips any string, including reserved
    /// cookie characters.
    #[test]
    fn codec_component_roundtrip(value in ".*") {
        let encoded = encode_component(&value);
        prop_assert!(!encoded.contains(';'));
        prop_assert!(!encoded.contains('='));
        prop_assert!(!encoded.contains(' '));
        prop_assert_eq!(decode_component(&encoded), Some(value));
    }

    /// Anything written through the set primitive is recovered exactly
    /// by the get primitive, for names and values containing reserved
    /// characters.
    #[test]
    fn jar_set_get_roundtrip(
        name in "[ -~]{1,32}",
        value in "[ -~]{1,64}",
    ) {
        let jar = MemoryJar::with_now(0);
        prop_assert!(set_cookie(&jar, &name, &value, 30, false));
        prop_assert_eq!(get_cookie(&jar, &name), Some(value));
    }

    /// Multiple cookies never bleed into each other, whatever their
    /// contents.
    #[test]
    fn jar_no_crosstalk(
        a_value in "[ -~]{1,64}",
        b_value in "[ -~]{1,64}",
    ) {
        let jar = MemoryJar::with_now(0);
        prop_assert!(set_cookie(&jar, "a; =x", &a_value, 30, false));
        prop_assert!(set_cookie(&jar, "b=; y", &b_value, 30, false));
        prop_assert_eq!(get_cookie(&jar, "a; =x"), Some(a_value));
        prop_assert_eq!(get_cookie(&jar, "b=; y"), Some(b_value));
    }

    /// Day clamping never yields an out-of-range expiration: invalid
    /// inputs fall back to 180, valid ones pass through.
    #[test]
    fn days_clamp_total(days in i64::MIN..i64::MAX) {
        let clamped = clamp_days(days);
        prop_assert!((1..=365).contains(&clamped));
        if (1..=365).contains(&days) {
            prop_assert_eq!(i64::from(clamped), days);
        } else {
            prop_assert_eq!(clamped, 180);
        }
    }

    /// The set-cookie string always carries the fixed attributes and
    /// never an infinite or epoch expiration for valid input.
    #[test]
    fn set_cookie_shape(days in 1i64..=365, now_ms in 0i64..4_102_444_800_000) {
        let s = format_set_cookie("n", "v", days, now_ms, false);
        prop_assert!(s.contains("; path=/"));
        prop_assert!(s.contains("; SameSite=Lax"));
        prop_assert!(s.contains("; expires="));
        prop_assert!(!s.contains("HttpOnly"));
    }
}

// ============================================================================
// Record Property Tests
// ============================================================================

fn arb_toggles() -> impl Strategy<Value = (bool, bool, bool)> {
    (any::<bool>(), any::<bool>(), any::<bool>())
}

proptest! {
    /// Essential is true in every record however it was produced.
    #[test]
    fn record_essential_invariant((a, m, p) in arb_toggles()) {
        let toggles = move |cat: ConsentCategory| match cat {
            ConsentCategory::Analytics => a,
            ConsentCategory::Marketing => m,
            ConsentCategory::Preferences => p,
            ConsentCategory::Essential => false, // ignored
        };
        for record in [
            ConsentRecord::accepted(&ConsentCategory::OPTIONAL, MS_PER_DAY),
            ConsentRecord::rejected(MS_PER_DAY),
            ConsentRecord::customized(toggles, MS_PER_DAY),
        ] {
            prop_assert!(record.is_granted(ConsentCategory::Essential));
        }
    }

    /// A record written to a jar loads back equal, through the
    /// serialized record cookie.
    #[test]
    fn record_persistence_roundtrip((a, m, p) in arb_toggles(), days in 1i64..=365) {
        let jar = MemoryJar::with_now(0);
        let record = ConsentRecord::customized(
            move |cat| match cat {
                ConsentCategory::Analytics => a,
                ConsentCategory::Marketing => m,
                ConsentCategory::Preferences => p,
                ConsentCategory::Essential => true,
            },
            days * MS_PER_DAY,
        );
        prop_assert!(write_record(&jar, &record, days, false).is_ok());
        prop_assert_eq!(load_record(&jar), Some(record));
    }

    /// Writing the same record twice leaves the same observable store.
    #[test]
    fn record_write_idempotent((a, m, p) in arb_toggles()) {
        use ccl::cookie::CookieJar;
        let jar = MemoryJar::with_now(0);
        let record = ConsentRecord::customized(
            move |cat| match cat {
                ConsentCategory::Analytics => a,
                ConsentCategory::Marketing => m,
                ConsentCategory::Preferences => p,
                ConsentCategory::Essential => true,
            },
            30 * MS_PER_DAY,
        );
        prop_assert!(write_record(&jar, &record, 30, false).is_ok());
        let first = jar.read_raw().unwrap();
        prop_assert!(write_record(&jar, &record, 30, false).is_ok());
        let second = jar.read_raw().unwrap();
        prop_assert_eq!(first, second);
    }
}
