//! Request metadata extraction for visit tracking

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse device class recorded in the device histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Desktop,
    Mobile,
    Tablet,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Desktop => "desktop",
            DeviceClass::Mobile => "mobile",
            DeviceClass::Tablet => "tablet",
        }
    }

    /// Parse a client-supplied label; unknown labels yield `None`.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "desktop" => Some(DeviceClass::Desktop),
            "mobile" => Some(DeviceClass::Mobile),
            "tablet" => Some(DeviceClass::Tablet),
            _ => None,
        }
    }

    /// Best-effort classification from a user-agent string.
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        if ua.contains("ipad") || ua.contains("tablet") {
            DeviceClass::Tablet
        } else if ua.contains("mobile") || ua.contains("android") || ua.contains("iphone") {
            DeviceClass::Mobile
        } else {
            DeviceClass::Desktop
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request inputs to fingerprinting and referrer bucketing.
///
/// Only lives for the duration of one tracking call; none of these fields
/// are persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

impl RequestMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    /// Build from raw request headers.
    ///
    /// The client address is the first `X-Forwarded-For` hop, then
    /// `X-Real-IP`, then `peer_addr`.
    pub fn from_headers<'a, I>(headers: I, peer_addr: Option<&str>) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut forwarded = None;
        let mut real_ip = None;
        let mut meta = Self::default();

        for (name, value) in headers {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match name.trim().to_ascii_lowercase().as_str() {
                "x-forwarded-for" => {
                    forwarded = value
                        .split(',')
                        .map(str::trim)
                        .find(|hop| !hop.is_empty())
                        .map(str::to_string);
                }
                "x-real-ip" => real_ip = Some(value.to_string()),
                "user-agent" => meta.user_agent = Some(value.to_string()),
                "referer" | "referrer" => meta.referrer = Some(value.to_string()),
                _ => {}
            }
        }

        meta.remote_addr = forwarded
            .or(real_ip)
            .or_else(|| {
                peer_addr
                    .map(str::trim)
                    .filter(|addr| !addr.is_empty())
                    .map(str::to_string)
            });
        meta
    }

    /// Device class for this request, preferring a recognised client label.
    ///
    /// Labels other than desktop/mobile/tablet are ignored in favour of the
    /// user agent, so `deviceStats` only ever holds the three classes.
    pub fn device_class(&self, explicit: Option<&str>) -> DeviceClass {
        explicit.and_then(DeviceClass::parse).unwrap_or_else(|| {
            DeviceClass::from_user_agent(self.user_agent.as_deref().unwrap_or(""))
        })
    }

    pub fn device_label(&self, explicit: Option<&str>) -> String {
        self.device_class(explicit).as_str().to_string()
    }
}
