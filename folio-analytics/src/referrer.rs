//! Referrer normalization

use url::Url;

/// Key for visits without a referrer.
pub const DIRECT: &str = "direct";

/// Key for referrers that are not parseable URLs with a host.
pub const OTHER: &str = "other";

/// Reduce a raw referrer to a comparable key.
///
/// Absent, blank, or `direct` referrers become [`DIRECT`]; URLs become their
/// host without a leading `www.`; anything else becomes [`OTHER`]. Never fails.
///
/// ```rust
/// use folio_analytics::normalize_referrer;
///
/// assert_eq!(normalize_referrer(Some("https://www.google.com/search?q=x")), "google.com");
/// assert_eq!(normalize_referrer(None), "direct");
/// assert_eq!(normalize_referrer(Some("not a url")), "other");
/// ```
pub fn normalize_referrer(raw: Option<&str>) -> String {
    let raw = match raw.map(str::trim) {
        None => return DIRECT.to_string(),
        Some(r) if r.is_empty() || r.eq_ignore_ascii_case(DIRECT) => return DIRECT.to_string(),
        Some(r) => r,
    };

    Url::parse(raw)
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_ascii_lowercase()))
        .map(|host| match host.strip_prefix("www.") {
            Some(bare) if !bare.is_empty() => bare.to_string(),
            _ => host,
        })
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| OTHER.to_string())
}

/// Presentation label for a referrer key.
pub fn referrer_label(key: &str) -> String {
    if key == DIRECT {
        "Direct".to_string()
    } else {
        key.to_string()
    }
}
