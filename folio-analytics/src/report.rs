//! Dashboard reports: gap-filled history, summary metrics, breakdowns, trend

use crate::{
    AggregateStore, AnalyticsConfig, AnalyticsError, AnalyticsResult, DailyAggregate, DayKey,
    DayRange, ProfileDirectory, ProfileId, VisitorFingerprint, referrer_label,
};
use folio_log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub(crate) const REPORT_TARGET: &str = "folio::analytics::report";

// =============================================================================
// Window
// =============================================================================

/// Reporting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalyticsWindow {
    /// Rolling window of this many days ending today (inclusive)
    Days(u32),
    /// Everything since the configured all-time start
    AllTime,
}

impl AnalyticsWindow {
    pub fn days(days: u32) -> Self {
        AnalyticsWindow::Days(days.max(1))
    }

    /// Map a request parameter: positive numbers are day counts, anything
    /// else means all time.
    pub fn from_param(days: Option<i64>) -> Self {
        match days {
            Some(d) if d > 0 => AnalyticsWindow::days(d.min(u32::MAX as i64) as u32),
            _ => AnalyticsWindow::AllTime,
        }
    }

    /// Inclusive day range for a report generated on `today`.
    pub fn range(&self, today: DayKey, config: &AnalyticsConfig) -> DayRange {
        match self {
            AnalyticsWindow::Days(days) => {
                DayRange::ending_at(today, (*days).clamp(1, config.max_window_days.max(1)))
            }
            AnalyticsWindow::AllTime => {
                DayRange::new(DayKey::from_date(config.all_time_start), today)
            }
        }
    }

    pub fn is_all_time(&self) -> bool {
        matches!(self, AnalyticsWindow::AllTime)
    }
}

impl FromStr for AnalyticsWindow {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") || s.eq_ignore_ascii_case("all-time") {
            return Ok(AnalyticsWindow::AllTime);
        }
        match s.parse::<u32>() {
            Ok(days) if days > 0 => Ok(AnalyticsWindow::Days(days)),
            _ => Err(AnalyticsError::InvalidInput(format!("invalid window: {s}"))),
        }
    }
}

impl fmt::Display for AnalyticsWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalyticsWindow::Days(days) => write!(f, "{days}d"),
            AnalyticsWindow::AllTime => f.write_str("all"),
        }
    }
}

// =============================================================================
// Report shape
// =============================================================================

/// One point of the daily series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    /// Chart label, e.g. `Oct 18`
    pub date: String,
    /// ISO date, e.g. `2026-10-18`
    pub day: String,
    pub views: u64,
    /// Distinct fingerprints seen that day
    pub visitors: u64,
    /// Rounded seconds per view that day
    pub avg_time: u64,
}

impl HistoryPoint {
    fn empty(day: DayKey) -> Self {
        Self {
            date: day.label(),
            day: day.iso(),
            views: 0,
            visitors: 0,
            avg_time: 0,
        }
    }

    fn from_record(record: &DailyAggregate) -> Self {
        Self {
            date: record.day.label(),
            day: record.day.iso(),
            views: record.views,
            visitors: record.unique_visitors.len() as u64,
            avg_time: record.avg_time_per_view(),
        }
    }
}

/// Window-level headline numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_views: u64,
    /// Distinct fingerprints across the whole window
    pub unique_visitors: u64,
    /// Rounded seconds per view
    pub avg_time_on_page: u64,
    /// Percent of views on days whose average dwell time was under the threshold
    pub bounce_rate: u64,
    /// Percent of views attributable to already-seen fingerprints
    pub returning_rate: u64,
    /// Percent change in views against the preceding window of equal length
    pub view_trend: i64,
}

/// Chart-ready label/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledValue {
    pub label: String,
    pub value: u64,
}

/// Ranked item with its resolved display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopItem {
    pub id: String,
    pub label: String,
    pub value: u64,
}

/// Everything a dashboard needs for one profile and window.
///
/// The shape is always fully populated; on failure every number is zero and
/// every list empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub history: Vec<HistoryPoint>,
    pub summary: Summary,
    pub device_breakdown: Vec<LabeledValue>,
    pub referrer_breakdown: Vec<LabeledValue>,
    pub top_projects: Vec<TopItem>,
}

impl AnalyticsReport {
    pub fn empty() -> Self {
        Self::default()
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Running totals over the days of a window.
#[derive(Default)]
struct WindowTotals {
    views: u64,
    duration: u64,
    bounce_views: u64,
    visitors: HashSet<VisitorFingerprint>,
    devices: HashMap<String, u64>,
    referrers: HashMap<String, u64>,
    interactions: HashMap<String, u64>,
}

impl WindowTotals {
    fn absorb(&mut self, record: &DailyAggregate, bounce_threshold_secs: u64) {
        self.views = self.views.saturating_add(record.views);
        self.duration = self.duration.saturating_add(record.total_duration);
        // A visitor returning on another day is counted once.
        self.visitors.extend(record.unique_visitors.iter().cloned());

        merge_counts(&mut self.devices, &record.device_stats);
        merge_counts(&mut self.referrers, &record.referrer_stats);
        merge_counts(&mut self.interactions, &record.project_interactions);

        if record.is_bounce_day(bounce_threshold_secs) {
            self.bounce_views = self.bounce_views.saturating_add(record.views);
        }
    }

    fn summary(&self, view_trend: i64) -> Summary {
        let uniques = self.visitors.len() as u64;
        Summary {
            total_views: self.views,
            unique_visitors: uniques,
            avg_time_on_page: rounded_ratio(self.duration, self.views, 1),
            bounce_rate: rounded_ratio(self.bounce_views, self.views, 100),
            returning_rate: rounded_ratio(self.views.saturating_sub(uniques), self.views, 100),
            view_trend,
        }
    }
}

fn merge_counts(into: &mut HashMap<String, u64>, from: &HashMap<String, u64>) {
    for (key, count) in from {
        let slot = into.entry(key.clone()).or_insert(0);
        *slot = slot.saturating_add(*count);
    }
}

/// `round(scale * part / whole)` with halves rounded up; 0 when `whole == 0`.
fn rounded_ratio(part: u64, whole: u64, scale: u64) -> u64 {
    if whole == 0 {
        return 0;
    }
    let numerator = part as u128 * scale as u128;
    let whole = whole as u128;
    ((2 * numerator + whole) / (2 * whole)) as u64
}

/// Percent change with growth-from-nothing reported as 100.
pub fn view_trend(current: u64, previous: u64) -> i64 {
    if previous == 0 {
        return if current > 0 { 100 } else { 0 };
    }
    let delta = 100 * (current as i128 - previous as i128);
    let previous = previous as i128;
    // round half up: floor((2 * delta + previous) / (2 * previous))
    let rounded = (2 * delta + previous).div_euclid(2 * previous);
    rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Sort descending by value, then ascending by label.
fn ranked(counts: HashMap<String, u64>, label: impl Fn(&str) -> String) -> Vec<LabeledValue> {
    let mut pairs: Vec<LabeledValue> = counts
        .into_iter()
        .map(|(key, value)| LabeledValue {
            label: label(&key),
            value,
        })
        .collect();
    pairs.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.label.cmp(&b.label)));
    pairs
}

/// Reads aggregates and derives [`AnalyticsReport`]s.
#[derive(Clone)]
pub struct ReportEngine {
    store: Arc<dyn AggregateStore>,
    directory: Arc<dyn ProfileDirectory>,
    config: Arc<AnalyticsConfig>,
}

impl ReportEngine {
    pub fn new(
        store: Arc<dyn AggregateStore>,
        directory: Arc<dyn ProfileDirectory>,
        config: Arc<AnalyticsConfig>,
    ) -> Self {
        Self {
            store,
            directory,
            config,
        }
    }

    /// Build the report for `window` as seen on `today`.
    pub async fn build(
        &self,
        profile_id: &ProfileId,
        window: AnalyticsWindow,
        today: DayKey,
    ) -> AnalyticsResult<AnalyticsReport> {
        if !self.config.enabled {
            return Err(AnalyticsError::Disabled);
        }

        let range = window.range(today, &self.config);
        let records: HashMap<DayKey, DailyAggregate> = self
            .store
            .query(profile_id, range)
            .await?
            .into_iter()
            .map(|record| (record.day, record))
            .collect();

        // Every calendar day appears, stored or not.
        let mut totals = WindowTotals::default();
        let history: Vec<HistoryPoint> = range
            .iter()
            .map(|day| match records.get(&day) {
                Some(record) => {
                    totals.absorb(record, self.config.bounce_threshold_secs);
                    HistoryPoint::from_record(record)
                }
                None => HistoryPoint::empty(day),
            })
            .collect();

        let trend = if window.is_all_time() {
            0
        } else {
            let previous = self.total_views(profile_id, range.preceding()).await?;
            view_trend(totals.views, previous)
        };

        let summary = totals.summary(trend);
        let top_projects = self
            .top_items(profile_id, std::mem::take(&mut totals.interactions))
            .await;

        debug!(
            target: REPORT_TARGET,
            "report for {} over {}: {} days, {} views",
            profile_id,
            window,
            history.len(),
            summary.total_views
        );

        Ok(AnalyticsReport {
            history,
            summary,
            device_breakdown: ranked(totals.devices, str::to_string),
            referrer_breakdown: ranked(totals.referrers, referrer_label),
            top_projects,
        })
    }

    async fn total_views(&self, profile_id: &ProfileId, range: DayRange) -> AnalyticsResult<u64> {
        Ok(self
            .store
            .query(profile_id, range)
            .await?
            .iter()
            .fold(0u64, |sum, record| sum.saturating_add(record.views)))
    }

    /// Top interacted items; a failed title lookup degrades to placeholders.
    async fn top_items(&self, profile_id: &ProfileId, counts: HashMap<String, u64>) -> Vec<TopItem> {
        let mut ranked_ids: Vec<(String, u64)> = counts.into_iter().collect();
        ranked_ids.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked_ids.truncate(self.config.top_items_limit);

        if ranked_ids.is_empty() {
            return Vec::new();
        }

        let ids: Vec<String> = ranked_ids.iter().map(|(id, _)| id.clone()).collect();
        let titles = match self.directory.item_titles(profile_id, &ids).await {
            Ok(titles) => titles,
            Err(err) => {
                warn!(
                    target: REPORT_TARGET,
                    "item titles unavailable for {}: {}", profile_id, err
                );
                HashMap::new()
            }
        };

        ranked_ids
            .into_iter()
            .map(|(id, value)| TopItem {
                label: titles
                    .get(&id)
                    .cloned()
                    .unwrap_or_else(|| self.config.unresolved_item_label.clone()),
                id,
                value,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounded_ratio() {
        assert_eq!(rounded_ratio(1, 3, 100), 33);
        assert_eq!(rounded_ratio(2, 3, 100), 67);
        assert_eq!(rounded_ratio(1, 2, 100), 50);
        assert_eq!(rounded_ratio(1, 8, 100), 13);
        assert_eq!(rounded_ratio(5, 0, 100), 0);
        assert_eq!(rounded_ratio(30, 3, 1), 10);
    }

    #[test]
    fn test_view_trend() {
        assert_eq!(view_trend(5, 0), 100);
        assert_eq!(view_trend(0, 0), 0);
        assert_eq!(view_trend(15, 10), 50);
        assert_eq!(view_trend(5, 10), -50);
        assert_eq!(view_trend(0, 10), -100);
        // -2.5 rounds up to -2, 2.5 to 3
        assert_eq!(view_trend(39, 40), -2);
        assert_eq!(view_trend(41, 40), 3);
    }

    #[test]
    fn test_window_parsing() {
        assert_eq!("30".parse::<AnalyticsWindow>().unwrap(), AnalyticsWindow::Days(30));
        assert_eq!("all".parse::<AnalyticsWindow>().unwrap(), AnalyticsWindow::AllTime);
        assert!("0".parse::<AnalyticsWindow>().is_err());
        assert!("week".parse::<AnalyticsWindow>().is_err());
        assert_eq!(AnalyticsWindow::from_param(Some(7)), AnalyticsWindow::Days(7));
        assert_eq!(AnalyticsWindow::from_param(Some(-1)), AnalyticsWindow::AllTime);
        assert_eq!(AnalyticsWindow::from_param(None), AnalyticsWindow::AllTime);
    }

    #[test]
    fn test_window_range() {
        let config = AnalyticsConfig::default();
        let today = DayKey::from_days_since_epoch(20_000);

        let range = AnalyticsWindow::days(3).range(today, &config);
        assert_eq!(range.len(), 3);
        assert_eq!(range.end, today);

        let all = AnalyticsWindow::AllTime.range(today, &config);
        assert_eq!(all.start, DayKey::from_date(config.all_time_start));

        let clamped = AnalyticsWindow::Days(100_000).range(today, &config);
        assert_eq!(clamped.len(), config.max_window_days as usize);
    }

    #[test]
    fn test_ranked_ties_break_on_label() {
        let counts = HashMap::from([
            ("direct".to_string(), 2),
            ("github.com".to_string(), 5),
            ("bing.com".to_string(), 2),
        ]);
        let ranked = ranked(counts, referrer_label);
        let labels: Vec<&str> = ranked.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["github.com", "Direct", "bing.com"]);
    }

    #[test]
    fn test_engine_merges_days() {
        use crate::{AggregateKey, Counters, InMemoryAggregateStore, InMemoryProfileDirectory};

        let store = Arc::new(InMemoryAggregateStore::new());
        let profile = ProfileId::from("p1");
        let today = DayKey::from_days_since_epoch(20_000);

        for (offset, device) in [(0, "mobile"), (1, "desktop"), (2, "mobile")] {
            let key = AggregateKey::new(profile.clone(), today.offset(-offset));
            let mut record =
                DailyAggregate::new(crate::AggregateId(0), &key, Counters::views(2).with_duration(50));
            record.increment_histogram(crate::HistogramField::DeviceStats, device, 2);
            record.insert_visitor(VisitorFingerprint::from_token("same"));
            store.insert(record);
        }

        let engine = ReportEngine::new(
            store,
            Arc::new(InMemoryProfileDirectory::new()),
            Arc::new(AnalyticsConfig::default()),
        );
        let report = tokio_test::block_on(engine.build(&profile, AnalyticsWindow::days(3), today))
            .unwrap();

        assert_eq!(report.summary.total_views, 6);
        assert_eq!(report.summary.unique_visitors, 1);
        assert_eq!(report.summary.returning_rate, 83);
        assert_eq!(report.summary.avg_time_on_page, 25);
        assert_eq!(
            report.device_breakdown,
            vec![
                LabeledValue { label: "mobile".to_string(), value: 4 },
                LabeledValue { label: "desktop".to_string(), value: 2 },
            ]
        );
        assert!(report.top_projects.is_empty());
    }

    #[test]
    fn test_empty_report_serializes_full_shape() {
        let json = serde_json::to_value(AnalyticsReport::empty()).unwrap();
        assert_eq!(json["history"], serde_json::json!([]));
        assert_eq!(json["summary"]["totalViews"], 0);
        assert_eq!(json["summary"]["viewTrend"], 0);
        assert_eq!(json["topProjects"], serde_json::json!([]));
    }
}
