//! Storage and directory traits

use crate::{
    AggregateId, AggregateKey, AnalyticsResult, Counters, DailyAggregate, DayRange,
    HistogramField, ProfileId, VisitorFingerprint,
};
use async_trait::async_trait;
use std::collections::HashMap;

/// Backing store for daily aggregates.
///
/// Every implementation must make [`upsert_baseline`](Self::upsert_baseline)
/// atomic for the counter fields: concurrent calls for the same key all land.
/// Histogram and visitor-set updates are only required to be eventually
/// applied; a backend without native map increments may lose a delta when
/// two writers race on the same (profile, day, map key).
#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Create the record for `key` seeded with `seed`, or add `increment` to
    /// the existing one. Returns the record after the write.
    async fn upsert_baseline(
        &self,
        key: &AggregateKey,
        seed: Counters,
        increment: Counters,
    ) -> AnalyticsResult<DailyAggregate>;

    /// Fetch the record for `key`, if any.
    async fn find(&self, key: &AggregateKey) -> AnalyticsResult<Option<DailyAggregate>>;

    /// Add `increment` to one entry of a histogram map.
    async fn apply_histogram_delta(
        &self,
        id: AggregateId,
        field: HistogramField,
        key: &str,
        increment: u64,
    ) -> AnalyticsResult<()>;

    /// Add a fingerprint to the day's visitor set, returning whether it was
    /// absent before.
    async fn insert_visitor(
        &self,
        id: AggregateId,
        fingerprint: &VisitorFingerprint,
    ) -> AnalyticsResult<bool>;

    /// All records of `profile_id` inside `range`, ascending by day.
    async fn query(
        &self,
        profile_id: &ProfileId,
        range: DayRange,
    ) -> AnalyticsResult<Vec<DailyAggregate>>;
}

/// Externally owned profile data the engine reads.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    /// Resolve a public slug to a profile id.
    async fn resolve_slug(&self, slug: &str) -> AnalyticsResult<Option<ProfileId>>;

    /// Display titles for the given item ids. Unknown ids are simply absent.
    async fn item_titles(
        &self,
        profile_id: &ProfileId,
        item_ids: &[String],
    ) -> AnalyticsResult<HashMap<String, String>>;
}
