//! Per-(profile, day) aggregate record

use crate::{AggregateKey, DayKey, ProfileId, VisitorFingerprint};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Store-assigned identifier of a [`DailyAggregate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(pub u64);

impl fmt::Display for AggregateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Histogram maps held by a daily aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HistogramField {
    DeviceStats,
    ReferrerStats,
    ProjectInteractions,
}

impl HistogramField {
    pub const ALL: [HistogramField; 3] = [
        HistogramField::DeviceStats,
        HistogramField::ReferrerStats,
        HistogramField::ProjectInteractions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HistogramField::DeviceStats => "deviceStats",
            HistogramField::ReferrerStats => "referrerStats",
            HistogramField::ProjectInteractions => "projectInteractions",
        }
    }
}

/// Monotonic counter values, used both as creation seed and as increment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub views: u64,
    pub total_duration: u64,
}

impl Counters {
    pub fn views(views: u64) -> Self {
        Self {
            views,
            total_duration: 0,
        }
    }

    pub fn duration(seconds: u64) -> Self {
        Self {
            views: 0,
            total_duration: seconds,
        }
    }

    pub fn with_duration(mut self, seconds: u64) -> Self {
        self.total_duration = seconds;
        self
    }
}

/// Cumulative statistics for one profile on one UTC day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAggregate {
    pub id: AggregateId,
    pub profile_id: ProfileId,
    pub day: DayKey,
    pub views: u64,
    pub unique_visitors: HashSet<VisitorFingerprint>,
    pub device_stats: HashMap<String, u64>,
    pub referrer_stats: HashMap<String, u64>,
    pub project_interactions: HashMap<String, u64>,
    /// Seconds of measured dwell time
    pub total_duration: u64,
}

impl DailyAggregate {
    /// A fresh record seeded with `seed`.
    pub fn new(id: AggregateId, key: &AggregateKey, seed: Counters) -> Self {
        Self {
            id,
            profile_id: key.profile_id.clone(),
            day: key.day,
            views: seed.views,
            unique_visitors: HashSet::new(),
            device_stats: HashMap::new(),
            referrer_stats: HashMap::new(),
            project_interactions: HashMap::new(),
            total_duration: seed.total_duration,
        }
    }

    pub fn key(&self) -> AggregateKey {
        AggregateKey::new(self.profile_id.clone(), self.day)
    }

    /// Add counter increments. Saturates instead of wrapping.
    pub fn apply_counters(&mut self, increment: Counters) {
        self.views = self.views.saturating_add(increment.views);
        self.total_duration = self.total_duration.saturating_add(increment.total_duration);
    }

    pub fn histogram(&self, field: HistogramField) -> &HashMap<String, u64> {
        match field {
            HistogramField::DeviceStats => &self.device_stats,
            HistogramField::ReferrerStats => &self.referrer_stats,
            HistogramField::ProjectInteractions => &self.project_interactions,
        }
    }

    pub fn histogram_mut(&mut self, field: HistogramField) -> &mut HashMap<String, u64> {
        match field {
            HistogramField::DeviceStats => &mut self.device_stats,
            HistogramField::ReferrerStats => &mut self.referrer_stats,
            HistogramField::ProjectInteractions => &mut self.project_interactions,
        }
    }

    /// Count under `key`; missing keys read as zero.
    pub fn count(&self, field: HistogramField, key: &str) -> u64 {
        self.histogram(field).get(key).copied().unwrap_or(0)
    }

    pub fn increment_histogram(&mut self, field: HistogramField, key: &str, by: u64) {
        let slot = self.histogram_mut(field).entry(key.to_string()).or_insert(0);
        *slot = slot.saturating_add(by);
    }

    /// Insert a fingerprint, returning whether it was new for the day.
    pub fn insert_visitor(&mut self, fingerprint: VisitorFingerprint) -> bool {
        self.unique_visitors.insert(fingerprint)
    }

    /// Whole seconds of dwell time per view, rounded; zero without views.
    pub fn avg_time_per_view(&self) -> u64 {
        rounded_div(self.total_duration, self.views)
    }

    /// Whether this day's views count towards the bounce counter.
    pub fn is_bounce_day(&self, threshold_secs: u64) -> bool {
        // total_duration / views < threshold, without float division
        self.views > 0
            && (self.total_duration as u128) < (threshold_secs as u128) * (self.views as u128)
    }
}

/// `round(numerator / denominator)` with halves rounded up; 0 when `denominator == 0`.
pub(crate) fn rounded_div(numerator: u64, denominator: u64) -> u64 {
    if denominator == 0 {
        return 0;
    }
    let n = numerator as u128;
    let d = denominator as u128;
    ((2 * n + d) / (2 * d)) as u64
}
