//! Anonymized visitor fingerprints

use crate::{AnalyticsError, AnalyticsResult};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Bytes of the HMAC kept in a fingerprint (hex-encoded to twice as many chars).
pub const FINGERPRINT_BYTES: usize = 16;

/// Opaque per-visitor token. Never contains the raw address or user-agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisitorFingerprint(String);

impl VisitorFingerprint {
    /// Wrap an already-derived token, e.g. one read back from storage.
    pub fn from_token(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VisitorFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives fingerprints with HMAC-SHA256 keyed by the server secret.
///
/// Rotating the secret rotates every fingerprint, so visitors seen before and
/// after a rotation count as distinct.
#[derive(Clone)]
pub struct Fingerprinter {
    mac: HmacSha256,
    sentinel: String,
}

impl Fingerprinter {
    pub fn new(secret: &[u8], sentinel: impl Into<String>) -> AnalyticsResult<Self> {
        if secret.is_empty() {
            return Err(AnalyticsError::Configuration(
                "fingerprint secret must not be empty".to_string(),
            ));
        }
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| AnalyticsError::Configuration(e.to_string()))?;

        Ok(Self {
            mac,
            sentinel: sentinel.into(),
        })
    }

    /// Fingerprint a requester. Missing or blank metadata is replaced by the
    /// sentinel, so fully anonymous requests share one fingerprint.
    pub fn fingerprint(
        &self,
        remote_addr: Option<&str>,
        user_agent: Option<&str>,
    ) -> VisitorFingerprint {
        let addr = present(remote_addr).unwrap_or(self.sentinel.as_str());
        let agent = present(user_agent).unwrap_or(self.sentinel.as_str());

        let mut mac = self.mac.clone();
        mac.update(addr.as_bytes());
        // unit separator keeps ("ab","c") and ("a","bc") apart
        mac.update(&[0x1f]);
        mac.update(agent.as_bytes());
        let digest = mac.finalize().into_bytes();

        VisitorFingerprint(hex::encode(&digest[..FINGERPRINT_BYTES]))
    }
}

impl fmt::Debug for Fingerprinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fingerprinter")
            .field("sentinel", &self.sentinel)
            .finish_non_exhaustive()
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
