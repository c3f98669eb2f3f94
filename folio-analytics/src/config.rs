//! Analytics configuration

use crate::{AnalyticsError, AnalyticsResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::env;

/// Environment variable prefix read by [`AnalyticsConfig::from_env`].
pub const ENV_PREFIX: &str = "FOLIO_ANALYTICS_";

/// Configuration for the analytics engine
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Enable analytics collection and reporting
    pub enabled: bool,
    /// Server secret keyed into visitor fingerprints
    pub fingerprint_secret: String,
    /// Stand-in for a missing address or user-agent
    pub missing_metadata_sentinel: String,
    /// Average seconds-per-view below which a day's views count as bounces
    pub bounce_threshold_secs: u64,
    /// Number of entries in the top-items ranking
    pub top_items_limit: usize,
    /// Start date of the "all time" window
    pub all_time_start: NaiveDate,
    /// Label for item ids the title lookup could not resolve
    pub unresolved_item_label: String,
    /// Upper bound for rolling windows
    pub max_window_days: u32,
    /// Longest dwell time accepted from a single heartbeat (seconds)
    pub max_heartbeat_secs: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fingerprint_secret: String::new(),
            missing_metadata_sentinel: "unknown".to_string(),
            bounce_threshold_secs: 10,
            top_items_limit: 5,
            all_time_start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default(),
            unresolved_item_label: "Unknown Project".to_string(),
            max_window_days: 3650,
            max_heartbeat_secs: 3600,
        }
    }
}

impl std::fmt::Debug for AnalyticsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsConfig")
            .field("enabled", &self.enabled)
            .field("fingerprint_secret", &"<redacted>")
            .field("missing_metadata_sentinel", &self.missing_metadata_sentinel)
            .field("bounce_threshold_secs", &self.bounce_threshold_secs)
            .field("top_items_limit", &self.top_items_limit)
            .field("all_time_start", &self.all_time_start)
            .field("unresolved_item_label", &self.unresolved_item_label)
            .field("max_window_days", &self.max_window_days)
            .field("max_heartbeat_secs", &self.max_heartbeat_secs)
            .finish()
    }
}

impl AnalyticsConfig {
    /// Create a new configuration builder
    pub fn builder() -> AnalyticsConfigBuilder {
        AnalyticsConfigBuilder::default()
    }

    /// Load overrides from `FOLIO_ANALYTICS_*` on top of the defaults.
    ///
    /// Recognised: `SECRET`, `ENABLED` (`1`/`0`/`true`/`false`),
    /// `BOUNCE_THRESHOLD_SECS`, `TOP_ITEMS`, `ALL_TIME_START` (`YYYY-MM-DD`).
    pub fn from_env() -> AnalyticsResult<Self> {
        Self::from_env_prefixed(ENV_PREFIX)
    }

    /// [`from_env`](Self::from_env) with a custom variable prefix.
    pub fn from_env_prefixed(prefix: &str) -> AnalyticsResult<Self> {
        let var = |suffix: &str| env::var(format!("{prefix}{suffix}")).ok();
        let invalid = |suffix: &str, reason: String| {
            AnalyticsError::Configuration(format!("{prefix}{suffix}: {reason}"))
        };
        let mut config = Self::default();

        if let Some(secret) = var("SECRET") {
            config.fingerprint_secret = secret;
        }
        if let Some(raw) = var("ENABLED") {
            config.enabled = parse_flag(&raw).ok_or_else(|| {
                invalid("ENABLED", format!("expected 1, 0, true or false, got '{raw}'"))
            })?;
        }
        if let Some(raw) = var("BOUNCE_THRESHOLD_SECS") {
            config.bounce_threshold_secs = raw
                .trim()
                .parse::<u64>()
                .map_err(|e| invalid("BOUNCE_THRESHOLD_SECS", format!("{e}")))?;
        }
        if let Some(raw) = var("TOP_ITEMS") {
            config.top_items_limit = raw
                .trim()
                .parse::<usize>()
                .map_err(|e| invalid("TOP_ITEMS", format!("{e}")))?;
        }
        if let Some(raw) = var("ALL_TIME_START") {
            config.all_time_start = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map_err(|e| invalid("ALL_TIME_START", e.to_string()))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> AnalyticsResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    ///
    /// The secret is only required while analytics is enabled.
    pub fn validate(&self) -> AnalyticsResult<()> {
        if self.enabled && self.fingerprint_secret.is_empty() {
            return Err(AnalyticsError::Configuration(
                "fingerprint_secret must not be empty".to_string(),
            ));
        }
        if self.top_items_limit == 0 {
            return Err(AnalyticsError::Configuration(
                "top_items_limit must be at least 1".to_string(),
            ));
        }
        if self.max_window_days == 0 {
            return Err(AnalyticsError::Configuration(
                "max_window_days must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

/// Builder for AnalyticsConfig
#[derive(Default)]
pub struct AnalyticsConfigBuilder {
    config: AnalyticsConfig,
}

impl AnalyticsConfigBuilder {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    pub fn fingerprint_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.fingerprint_secret = secret.into();
        self
    }

    pub fn missing_metadata_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.config.missing_metadata_sentinel = sentinel.into();
        self
    }

    pub fn bounce_threshold_secs(mut self, secs: u64) -> Self {
        self.config.bounce_threshold_secs = secs;
        self
    }

    pub fn top_items_limit(mut self, limit: usize) -> Self {
        self.config.top_items_limit = limit;
        self
    }

    pub fn all_time_start(mut self, start: NaiveDate) -> Self {
        self.config.all_time_start = start;
        self
    }

    pub fn unresolved_item_label(mut self, label: impl Into<String>) -> Self {
        self.config.unresolved_item_label = label.into();
        self
    }

    pub fn max_window_days(mut self, days: u32) -> Self {
        self.config.max_window_days = days;
        self
    }

    pub fn max_heartbeat_secs(mut self, secs: u64) -> Self {
        self.config.max_heartbeat_secs = secs;
        self
    }

    /// Build and validate.
    pub fn build(self) -> AnalyticsResult<AnalyticsConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
