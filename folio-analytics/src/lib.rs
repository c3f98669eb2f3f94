//! Visit Analytics for Folio Profiles
//!
//! Records anonymized visits to public profile pages and serves dashboard
//! reports to profile owners.
//!
//! ## Features
//!
//! - **Anonymous Visitors**: Keyed HMAC fingerprints, never raw addresses
//! - **Daily Aggregates**: One record per (profile, UTC day), created on first event
//! - **Referrer Grouping**: Bare hostnames with `www.` stripped, `direct` and `other` buckets
//! - **Reports**: Gap-filled history, bounce/returning rates, period trend, top items
//! - **Soft Failure**: Tracking and reporting never raise to the caller
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use folio_analytics::*;
//!
//! let config = AnalyticsConfig::builder()
//!     .fingerprint_secret("server-secret")
//!     .build()?;
//! let (analytics, directory) = Analytics::in_memory(config)?;
//! directory.register("alice", ProfileId::from("user-1"));
//!
//! let meta = RequestMeta::new()
//!     .with_remote_addr("203.0.113.7")
//!     .with_user_agent("Mozilla/5.0");
//! analytics.track_visit("alice", &VisitOptions::new(), &meta).await;
//!
//! let report = analytics
//!     .get_analytics(&ProfileId::from("user-1"), AnalyticsWindow::days(30))
//!     .await;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │             Page views / clicks / heartbeats                 │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Tracker                               │
//! │  ┌──────────────┐ ┌──────────────┐ ┌──────────────┐         │
//! │  │ Fingerprinter│ │  Referrer    │ │   Device     │         │
//! │  │  (HMAC)      │ │  Normalizer  │ │  Classifier  │         │
//! │  └──────────────┘ └──────────────┘ └──────────────┘         │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    AggregateStore                            │
//! │  ┌──────────┐ ┌──────────┐                                  │
//! │  │ In-memory│ │  Redis   │   one record per (profile, day)  │
//! │  └──────────┘ └──────────┘                                  │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ReportEngine                             │
//! │  history · summary · breakdowns · trend · top items          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod aggregate;
mod config;
mod day;
mod error;
mod fingerprint;
mod ingest;
mod memory;
mod referrer;
mod report;
mod request;
mod stats;
mod store;

#[cfg(feature = "redis")]
mod redis_store;

pub use aggregate::*;
pub use config::*;
pub use day::*;
pub use error::*;
pub use fingerprint::*;
pub use ingest::*;
pub use memory::*;
pub use referrer::*;
pub use report::*;
pub use request::*;
pub use stats::*;
pub use store::*;

#[cfg(feature = "redis")]
pub use redis_store::*;

use chrono::{DateTime, Utc};
use folio_log::{debug, error, info};
use std::sync::Arc;

/// Main analytics instance
///
/// Cheap to clone and safe to share across request handlers.
#[derive(Clone)]
pub struct Analytics {
    inner: Arc<AnalyticsInner>,
}

struct AnalyticsInner {
    config: Arc<AnalyticsConfig>,
    tracker: Tracker,
    reports: ReportEngine,
    stats: Arc<IngestionStats>,
}

impl Analytics {
    /// Create an analytics instance over the given backends.
    pub fn new(
        config: AnalyticsConfig,
        store: Arc<dyn AggregateStore>,
        directory: Arc<dyn ProfileDirectory>,
    ) -> AnalyticsResult<Self> {
        config.validate()?;

        let fingerprinter = if config.enabled {
            Some(Fingerprinter::new(
                config.fingerprint_secret.as_bytes(),
                config.missing_metadata_sentinel.clone(),
            )?)
        } else {
            None
        };
        let config = Arc::new(config);
        let stats = Arc::new(IngestionStats::new());

        let tracker = Tracker::new(
            store.clone(),
            directory.clone(),
            fingerprinter,
            config.clone(),
            stats.clone(),
        );
        let reports = ReportEngine::new(store, directory, config.clone());

        info!(
            target: ingest::INGEST_TARGET,
            "analytics ready (enabled={}, bounce threshold={}s)",
            config.enabled,
            config.bounce_threshold_secs
        );

        Ok(Self {
            inner: Arc::new(AnalyticsInner {
                config,
                tracker,
                reports,
                stats,
            }),
        })
    }

    /// Create an analytics instance over fresh in-memory backends.
    ///
    /// Returns the directory too, so callers can publish profiles.
    pub fn in_memory(
        config: AnalyticsConfig,
    ) -> AnalyticsResult<(Self, Arc<InMemoryProfileDirectory>)> {
        let directory = Arc::new(InMemoryProfileDirectory::new());
        let analytics = Self::new(
            config,
            Arc::new(InMemoryAggregateStore::new()),
            directory.clone(),
        )?;
        Ok((analytics, directory))
    }

    /// Record a page view on the profile published under `slug`.
    pub async fn track_visit(
        &self,
        slug: &str,
        options: &VisitOptions,
        meta: &RequestMeta,
    ) -> TrackOutcome {
        self.track_visit_at(slug, options, meta, Utc::now()).await
    }

    pub async fn track_visit_at(
        &self,
        slug: &str,
        options: &VisitOptions,
        meta: &RequestMeta,
        at: DateTime<Utc>,
    ) -> TrackOutcome {
        self.inner
            .tracker
            .track_visit_at(slug, options, meta, at)
            .await
    }

    /// Record an interaction with one of the profile's items.
    pub async fn track_interaction(&self, slug: &str, item_id: &str) -> TrackOutcome {
        self.track_interaction_at(slug, item_id, Utc::now()).await
    }

    pub async fn track_interaction_at(
        &self,
        slug: &str,
        item_id: &str,
        at: DateTime<Utc>,
    ) -> TrackOutcome {
        self.inner
            .tracker
            .track_interaction_at(slug, item_id, at)
            .await
    }

    /// Add dwell time reported by a client heartbeat.
    pub async fn track_duration(&self, slug: &str, seconds: i64) -> TrackOutcome {
        self.track_duration_at(slug, seconds, Utc::now()).await
    }

    pub async fn track_duration_at(
        &self,
        slug: &str,
        seconds: i64,
        at: DateTime<Utc>,
    ) -> TrackOutcome {
        self.inner
            .tracker
            .track_duration_at(slug, seconds, at)
            .await
    }

    /// Dashboard report for `profile_id` over `window`, ending today (UTC).
    ///
    /// Never fails: on any error the zero-valued report is returned.
    pub async fn get_analytics(
        &self,
        profile_id: &ProfileId,
        window: AnalyticsWindow,
    ) -> AnalyticsReport {
        self.get_analytics_as_of(profile_id, window, DayKey::today())
            .await
    }

    pub async fn get_analytics_as_of(
        &self,
        profile_id: &ProfileId,
        window: AnalyticsWindow,
        today: DayKey,
    ) -> AnalyticsReport {
        match self.inner.reports.build(profile_id, window, today).await {
            Ok(report) => {
                self.inner.stats.record_report(true);
                report
            }
            Err(AnalyticsError::Disabled) => {
                self.inner.stats.record_report(false);
                AnalyticsReport::empty()
            }
            Err(err) if err.is_not_found() => {
                self.inner.stats.record_report(false);
                debug!(target: report::REPORT_TARGET, "no report for {}: {}", profile_id, err);
                AnalyticsReport::empty()
            }
            Err(err) => {
                self.inner.stats.record_report(false);
                error!(
                    target: report::REPORT_TARGET,
                    "report for {} over {} failed: {}", profile_id, window, err
                );
                AnalyticsReport::empty()
            }
        }
    }

    /// Ingestion and reporting counters.
    pub fn stats(&self) -> IngestionSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.inner.stats.reset();
    }

    /// Get the configuration
    pub fn config(&self) -> &AnalyticsConfig {
        &self.inner.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config() -> AnalyticsConfig {
        AnalyticsConfig::builder()
            .fingerprint_secret("test-secret")
            .build()
            .unwrap()
    }

    #[test]
    fn test_rejects_empty_secret() {
        let result = Analytics::in_memory(AnalyticsConfig::default());
        assert!(matches!(result, Err(AnalyticsError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_visit_then_report() {
        let (analytics, directory) = Analytics::in_memory(config()).unwrap();
        let profile = ProfileId::from("p-1");
        directory.register("alice", profile.clone());

        let at = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let meta = RequestMeta::new().with_remote_addr("10.0.0.1").with_user_agent("ua");

        let outcome = analytics
            .track_visit_at("alice", &VisitOptions::new(), &meta, at)
            .await;
        assert_eq!(outcome, TrackOutcome::visit(true));

        let report = analytics
            .get_analytics_as_of(&profile, AnalyticsWindow::days(7), DayKey::from_datetime(at))
            .await;
        assert_eq!(report.history.len(), 7);
        assert_eq!(report.summary.total_views, 1);
        assert_eq!(report.summary.view_trend, 100);
        assert_eq!(analytics.stats().visits, 1);
        assert_eq!(analytics.stats().reports, 1);
    }

    #[tokio::test]
    async fn test_disabled_without_secret() {
        let disabled = AnalyticsConfig::builder().enabled(false).build().unwrap();
        let (analytics, directory) = Analytics::in_memory(disabled).unwrap();
        directory.register("alice", ProfileId::from("p-1"));

        let outcome = analytics
            .track_visit("alice", &VisitOptions::new(), &RequestMeta::new())
            .await;
        assert_eq!(outcome, TrackOutcome::failed());
        assert_eq!(
            analytics
                .get_analytics(&ProfileId::from("p-1"), AnalyticsWindow::days(7))
                .await,
            AnalyticsReport::empty()
        );
    }

    #[tokio::test]
    async fn test_disabled_is_soft() {
        let disabled = AnalyticsConfig::builder()
            .fingerprint_secret("test-secret")
            .enabled(false)
            .build()
            .unwrap();
        let (analytics, directory) = Analytics::in_memory(disabled).unwrap();
        directory.register("alice", ProfileId::from("p-1"));

        let outcome = analytics
            .track_visit("alice", &VisitOptions::new(), &RequestMeta::new())
            .await;
        assert!(!outcome.success);

        let report = analytics
            .get_analytics(&ProfileId::from("p-1"), AnalyticsWindow::AllTime)
            .await;
        assert_eq!(report, AnalyticsReport::empty());
        assert_eq!(analytics.stats().rejected, 1);
    }
}
