//! Fuzz target for referrer normalization.
//!
//! Normalization must never panic and must always produce a non-empty,
//! lower-case key.

#![no_main]

use libfuzzer_sys::fuzz_target;

use folio_analytics::{DIRECT, OTHER, normalize_referrer, referrer_label};

fuzz_target!(|data: &[u8]| {
    let raw = match std::str::from_utf8(data) {
        Ok(s) => s,
        Err(_) => return,
    };

    let key = normalize_referrer(Some(raw));
    assert!(!key.is_empty());

    if key != DIRECT && key != OTHER {
        assert_eq!(key, key.to_ascii_lowercase());
    }

    // Labels only ever rename the direct bucket
    let label = referrer_label(&key);
    if key != DIRECT {
        assert_eq!(label, key);
    }
});
