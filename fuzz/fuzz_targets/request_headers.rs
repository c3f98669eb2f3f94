//! Fuzz target for request metadata extraction.
//!
//! Feeds arbitrary header sets through address/user-agent extraction,
//! device classification and fingerprinting.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use folio_analytics::{DeviceClass, Fingerprinter, RequestMeta, VisitOptions};

/// Arbitrary request for fuzzing.
#[derive(Debug, Arbitrary)]
struct FuzzRequest {
    /// Header name/value pairs, in arrival order
    headers: Vec<(String, String)>,
    /// Socket peer address
    peer_addr: Option<String>,
    /// Client-declared device label
    device_type: Option<String>,
}

fuzz_target!(|data: FuzzRequest| {
    let headers = data
        .headers
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()));
    let meta = RequestMeta::from_headers(headers, data.peer_addr.as_deref());

    // Extracted values are trimmed and never empty
    for value in [&meta.remote_addr, &meta.user_agent, &meta.referrer]
        .into_iter()
        .flatten()
    {
        assert!(!value.is_empty());
        assert_eq!(value.trim(), value.as_str());
    }

    let options = VisitOptions {
        device_type: data.device_type.clone(),
        referrer: None,
    };
    let device = meta.device_label(options.device_type.as_deref());
    if data.device_type.as_deref().map(str::trim).unwrap_or("").is_empty() {
        assert!(DeviceClass::parse(&device).is_some());
    }

    let fingerprinter = match Fingerprinter::new(b"fuzz-secret", "unknown") {
        Ok(f) => f,
        Err(_) => return,
    };
    let first = fingerprinter.fingerprint(meta.remote_addr.as_deref(), meta.user_agent.as_deref());
    let second = fingerprinter.fingerprint(meta.remote_addr.as_deref(), meta.user_agent.as_deref());
    assert_eq!(first, second);
    assert_eq!(first.as_str().len(), 32);
});
