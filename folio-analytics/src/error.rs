//! Analytics error types

use thiserror::Error;

/// Result type for analytics operations.
pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

/// Errors raised inside the analytics engine.
///
/// None of these cross the public tracking/reporting boundary: the
/// [`Analytics`](crate::Analytics) facade converts them into soft outcomes.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// No profile is published under the slug
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    /// Aggregate record id does not exist
    #[error("Aggregate record not found: {0}")]
    RecordNotFound(u64),

    /// Backing store failed or is unreachable
    #[error("Storage error: {0}")]
    Store(String),

    /// Profile/title directory failed
    #[error("Directory error: {0}")]
    Directory(String),

    /// Caller supplied unusable input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Analytics is disabled
    #[error("Analytics is disabled")]
    Disabled,

    /// Redis-specific error
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl AnalyticsError {
    /// Expected misses that should not page anyone.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AnalyticsError::ProfileNotFound(_) | AnalyticsError::RecordNotFound(_)
        )
    }

    /// Failures of an external dependency that operators should alert on.
    pub fn is_operational(&self) -> bool {
        match self {
            AnalyticsError::Store(_) | AnalyticsError::Directory(_) => true,
            #[cfg(feature = "redis")]
            AnalyticsError::Redis(_) => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for AnalyticsError {
    fn from(err: serde_json::Error) -> Self {
        AnalyticsError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for AnalyticsError {
    fn from(err: toml::de::Error) -> Self {
        AnalyticsError::Configuration(err.to_string())
    }
}
