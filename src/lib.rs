// Folio - visit analytics for developer portfolio pages
//
// This library bundles the analytics engine with its logging layer so an
// application embeds a single crate.

// Re-export the analytics engine
pub use folio_analytics::*;

// Re-export logging
pub use folio_log;
pub use folio_log::{debug, error, info, trace, warn};

/// Prelude for common imports
pub mod prelude {
    pub use folio_analytics::{
        Analytics, AnalyticsConfig, AnalyticsReport, AnalyticsWindow, DayKey, ProfileId,
        RequestMeta, TrackOutcome, VisitOptions,
    };

    // Re-export async_trait for implementing custom stores and directories
    pub use async_trait::async_trait;

    pub use folio_analytics::{AggregateStore, ProfileDirectory};
}
