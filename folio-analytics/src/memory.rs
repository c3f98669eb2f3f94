//! In-process store and directory backends

use crate::{
    AggregateId, AggregateKey, AggregateStore, AnalyticsError, AnalyticsResult, Counters,
    DailyAggregate, DayRange, HistogramField, ProfileDirectory, ProfileId, VisitorFingerprint,
};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// DashMap-backed aggregate store.
///
/// All mutations of one record happen under that record's shard lock, so
/// counters, histogram entries and the visitor set are all race-free here.
pub struct InMemoryAggregateStore {
    records: DashMap<AggregateKey, DailyAggregate>,
    ids: DashMap<AggregateId, AggregateKey>,
    next_id: AtomicU64,
}

impl InMemoryAggregateStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            ids: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert a prebuilt record, replacing any record with the same key.
    /// Intended for seeding fixtures and imports.
    pub fn insert(&self, mut record: DailyAggregate) -> AggregateId {
        let key = record.key();
        let id = match self.records.get(&key) {
            Some(existing) => existing.id,
            None => AggregateId(self.next_id.fetch_add(1, Ordering::Relaxed)),
        };
        record.id = id;
        self.ids.insert(id, key.clone());
        self.records.insert(key, record);
        id
    }

    fn key_for(&self, id: AggregateId) -> AnalyticsResult<AggregateKey> {
        self.ids
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(AnalyticsError::RecordNotFound(id.0))
    }

    fn with_record<T>(
        &self,
        id: AggregateId,
        f: impl FnOnce(&mut DailyAggregate) -> T,
    ) -> AnalyticsResult<T> {
        let key = self.key_for(id)?;
        let mut record = self
            .records
            .get_mut(&key)
            .ok_or(AnalyticsError::RecordNotFound(id.0))?;
        Ok(f(record.value_mut()))
    }
}

impl Default for InMemoryAggregateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AggregateStore for InMemoryAggregateStore {
    async fn upsert_baseline(
        &self,
        key: &AggregateKey,
        seed: Counters,
        increment: Counters,
    ) -> AnalyticsResult<DailyAggregate> {
        let mut created = false;
        let mut entry = self.records.entry(key.clone()).or_insert_with(|| {
            created = true;
            let id = AggregateId(self.next_id.fetch_add(1, Ordering::Relaxed));
            // Registered before the shard lock is released so the id is
            // resolvable by the time any caller can observe it.
            self.ids.insert(id, key.clone());
            DailyAggregate::new(id, key, seed)
        });

        if !created {
            entry.apply_counters(increment);
        }
        Ok(entry.value().clone())
    }

    async fn find(&self, key: &AggregateKey) -> AnalyticsResult<Option<DailyAggregate>> {
        Ok(self.records.get(key).map(|entry| entry.value().clone()))
    }

    async fn apply_histogram_delta(
        &self,
        id: AggregateId,
        field: HistogramField,
        key: &str,
        increment: u64,
    ) -> AnalyticsResult<()> {
        self.with_record(id, |record| record.increment_histogram(field, key, increment))
    }

    async fn insert_visitor(
        &self,
        id: AggregateId,
        fingerprint: &VisitorFingerprint,
    ) -> AnalyticsResult<bool> {
        self.with_record(id, |record| record.insert_visitor(fingerprint.clone()))
    }

    async fn query(
        &self,
        profile_id: &ProfileId,
        range: DayRange,
    ) -> AnalyticsResult<Vec<DailyAggregate>> {
        let mut rows: Vec<DailyAggregate> = if range.len() <= self.records.len() {
            range
                .iter()
                .filter_map(|day| {
                    self.records
                        .get(&AggregateKey::new(profile_id.clone(), day))
                        .map(|entry| entry.value().clone())
                })
                .collect()
        } else {
            self.records
                .iter()
                .filter(|entry| {
                    entry.key().profile_id == *profile_id && range.contains(entry.key().day)
                })
                .map(|entry| entry.value().clone())
                .collect()
        };

        rows.sort_by_key(|record| record.day);
        Ok(rows)
    }
}

/// Map-backed [`ProfileDirectory`].
#[derive(Default)]
pub struct InMemoryProfileDirectory {
    slugs: RwLock<HashMap<String, ProfileId>>,
    titles: RwLock<HashMap<ProfileId, HashMap<String, String>>>,
}

impl InMemoryProfileDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `profile_id` under `slug`.
    pub fn register(&self, slug: impl Into<String>, profile_id: ProfileId) {
        self.slugs.write().insert(slug.into(), profile_id);
    }

    /// Set the display title of one of a profile's items.
    pub fn set_item_title(
        &self,
        profile_id: &ProfileId,
        item_id: impl Into<String>,
        title: impl Into<String>,
    ) {
        self.titles
            .write()
            .entry(profile_id.clone())
            .or_default()
            .insert(item_id.into(), title.into());
    }
}

#[async_trait]
impl ProfileDirectory for InMemoryProfileDirectory {
    async fn resolve_slug(&self, slug: &str) -> AnalyticsResult<Option<ProfileId>> {
        Ok(self.slugs.read().get(slug).cloned())
    }

    async fn item_titles(
        &self,
        profile_id: &ProfileId,
        item_ids: &[String],
    ) -> AnalyticsResult<HashMap<String, String>> {
        let titles = self.titles.read();
        let Some(known) = titles.get(profile_id) else {
            return Ok(HashMap::new());
        };

        Ok(item_ids
            .iter()
            .filter_map(|id| known.get(id).map(|title| (id.clone(), title.clone())))
            .collect())
    }
}
