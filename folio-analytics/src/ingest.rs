//! Event ingestion: page visits, item interactions and dwell-time heartbeats

use crate::{
    AggregateKey, AggregateStore, AnalyticsConfig, AnalyticsError, AnalyticsResult, Counters,
    DayKey, EventKind, Fingerprinter, HistogramField, IngestionStats, ProfileDirectory, ProfileId,
    RequestMeta, normalize_referrer,
};
use chrono::{DateTime, Utc};
use folio_log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub(crate) const INGEST_TARGET: &str = "folio::analytics::ingest";

/// Client-supplied visit attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitOptions {
    /// `desktop`, `mobile`, `tablet`; classified from the user-agent when absent
    pub device_type: Option<String>,
    /// Raw referrer; falls back to the request's `Referer` header
    pub referrer: Option<String>,
}

impl VisitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device_type(mut self, device: impl Into<String>) -> Self {
        self.device_type = Some(device.into());
        self
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }
}

/// Soft result of a tracking call. Failures are reported here, never raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_new_visitor: Option<bool>,
}

impl TrackOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            is_new_visitor: None,
        }
    }

    pub fn visit(is_new_visitor: bool) -> Self {
        Self {
            success: true,
            is_new_visitor: Some(is_new_visitor),
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            is_new_visitor: None,
        }
    }
}

/// Writes events into the day's aggregate for a profile.
///
/// Delivery is at-least-once: a retried call adds another increment.
#[derive(Clone)]
pub struct Tracker {
    store: Arc<dyn AggregateStore>,
    directory: Arc<dyn ProfileDirectory>,
    // None while analytics is disabled
    fingerprinter: Option<Fingerprinter>,
    config: Arc<AnalyticsConfig>,
    stats: Arc<IngestionStats>,
}

impl Tracker {
    pub fn new(
        store: Arc<dyn AggregateStore>,
        directory: Arc<dyn ProfileDirectory>,
        fingerprinter: Option<Fingerprinter>,
        config: Arc<AnalyticsConfig>,
        stats: Arc<IngestionStats>,
    ) -> Self {
        Self {
            store,
            directory,
            fingerprinter,
            config,
            stats,
        }
    }

    /// Count a page view at `at`.
    pub async fn track_visit_at(
        &self,
        slug: &str,
        options: &VisitOptions,
        meta: &RequestMeta,
        at: DateTime<Utc>,
    ) -> TrackOutcome {
        let result = self.record_visit(slug, options, meta, at).await;
        match self.settle(EventKind::Visit, slug, result) {
            Some(is_new) => {
                self.stats.record_visit(is_new);
                TrackOutcome::visit(is_new)
            }
            None => TrackOutcome::failed(),
        }
    }

    /// Count an interaction with `item_id` at `at`.
    pub async fn track_interaction_at(
        &self,
        slug: &str,
        item_id: &str,
        at: DateTime<Utc>,
    ) -> TrackOutcome {
        let result = self.record_interaction(slug, item_id, at).await;
        match self.settle(EventKind::Interaction, slug, result) {
            Some(applied) => {
                self.stats.record_interaction(applied);
                TrackOutcome::ok()
            }
            None => TrackOutcome::failed(),
        }
    }

    /// Add `seconds` of dwell time at `at`.
    pub async fn track_duration_at(&self, slug: &str, seconds: i64, at: DateTime<Utc>) -> TrackOutcome {
        let result = self.record_duration(slug, seconds, at).await;
        match self.settle(EventKind::Duration, slug, result) {
            Some(applied) => {
                if applied > 0 {
                    self.stats.record_duration(applied);
                }
                TrackOutcome::ok()
            }
            None => TrackOutcome::failed(),
        }
    }

    async fn record_visit(
        &self,
        slug: &str,
        options: &VisitOptions,
        meta: &RequestMeta,
        at: DateTime<Utc>,
    ) -> AnalyticsResult<bool> {
        let key = self.key_for(slug, at).await?;
        let fingerprinter = self.fingerprinter.as_ref().ok_or(AnalyticsError::Disabled)?;
        let record = self
            .store
            .upsert_baseline(&key, Counters::views(1), Counters::views(1))
            .await?;

        let fingerprint = fingerprinter
            .fingerprint(meta.remote_addr.as_deref(), meta.user_agent.as_deref());
        let is_new = self.store.insert_visitor(record.id, &fingerprint).await?;

        let device = meta.device_label(options.device_type.as_deref());
        self.store
            .apply_histogram_delta(record.id, HistogramField::DeviceStats, &device, 1)
            .await?;

        let referrer = normalize_referrer(
            options
                .referrer
                .as_deref()
                .or(meta.referrer.as_deref()),
        );
        self.store
            .apply_histogram_delta(record.id, HistogramField::ReferrerStats, &referrer, 1)
            .await?;

        debug!(
            target: INGEST_TARGET,
            "visit recorded for {} on {} (device={}, referrer={}, new={})",
            key.profile_id, key.day, device, referrer, is_new
        );
        Ok(is_new)
    }

    /// Returns whether the interaction was applied; interactions on a day
    /// without a prior view are dropped.
    async fn record_interaction(
        &self,
        slug: &str,
        item_id: &str,
        at: DateTime<Utc>,
    ) -> AnalyticsResult<bool> {
        let item_id = item_id.trim();
        if item_id.is_empty() {
            return Err(AnalyticsError::InvalidInput("empty item id".to_string()));
        }

        let key = self.key_for(slug, at).await?;
        let Some(record) = self.store.find(&key).await? else {
            debug!(
                target: INGEST_TARGET,
                "interaction with {} dropped: no views for {} on {}",
                item_id, key.profile_id, key.day
            );
            return Ok(false);
        };

        self.store
            .apply_histogram_delta(record.id, HistogramField::ProjectInteractions, item_id, 1)
            .await?;
        Ok(true)
    }

    /// Returns the seconds actually added.
    async fn record_duration(&self, slug: &str, seconds: i64, at: DateTime<Utc>) -> AnalyticsResult<u64> {
        let key = self.key_for(slug, at).await?;
        if seconds <= 0 {
            return Ok(0);
        }
        let seconds = (seconds as u64).min(self.config.max_heartbeat_secs);

        // A heartbeat alone seeds the day with one view.
        self.store
            .upsert_baseline(
                &key,
                Counters::views(1).with_duration(seconds),
                Counters::duration(seconds),
            )
            .await?;
        Ok(seconds)
    }

    async fn key_for(&self, slug: &str, at: DateTime<Utc>) -> AnalyticsResult<AggregateKey> {
        if !self.config.enabled {
            return Err(AnalyticsError::Disabled);
        }
        let profile_id = self.resolve(slug).await?;
        Ok(AggregateKey::new(profile_id, DayKey::from_datetime(at)))
    }

    async fn resolve(&self, slug: &str) -> AnalyticsResult<ProfileId> {
        self.directory
            .resolve_slug(slug)
            .await?
            .ok_or_else(|| AnalyticsError::ProfileNotFound(slug.to_string()))
    }

    /// Log and count a failure; expected misses stay at debug level.
    fn settle<T>(&self, kind: EventKind, slug: &str, result: AnalyticsResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(AnalyticsError::Disabled) => {
                self.stats.record_rejected();
                None
            }
            Err(err) if err.is_not_found() => {
                self.stats.record_not_found();
                debug!(target: INGEST_TARGET, "{} for '{}' ignored: {}", kind.as_str(), slug, err);
                None
            }
            Err(err) if err.is_operational() => {
                self.stats.record_store_failure();
                error!(target: INGEST_TARGET, "{} for '{}' failed: {}", kind.as_str(), slug, err);
                None
            }
            Err(err) => {
                self.stats.record_rejected();
                warn!(target: INGEST_TARGET, "{} for '{}' rejected: {}", kind.as_str(), slug, err);
                None
            }
        }
    }
}
