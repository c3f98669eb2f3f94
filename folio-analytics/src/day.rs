//! UTC day bucketing and record keys

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `NaiveDate::num_days_from_ce` of 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Opaque, externally owned profile reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(String);

impl ProfileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProfileId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Calendar day in UTC, counted in days since 1970-01-01.
///
/// Two timestamps on the same UTC day always map to the same key, so no
/// per-visit time survives bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayKey(i32);

impl DayKey {
    pub const fn from_days_since_epoch(days: i32) -> Self {
        Self(days)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self::from_date(at.date_naive())
    }

    pub fn today() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub const fn days_since_epoch(self) -> i32 {
        self.0
    }

    pub fn to_date(self) -> NaiveDate {
        NaiveDate::from_num_days_from_ce_opt(self.0 + UNIX_EPOCH_DAYS_FROM_CE).unwrap_or_default()
    }

    /// Shift by a signed number of days.
    pub fn offset(self, days: i64) -> Self {
        let shifted = (self.0 as i64 + days).clamp(i32::MIN as i64, i32::MAX as i64);
        Self(shifted as i32)
    }

    /// Short chart label, e.g. `Oct 18`.
    pub fn label(self) -> String {
        self.to_date().format("%b %-d").to_string()
    }

    /// ISO-8601 date, e.g. `2026-10-18`.
    pub fn iso(self) -> String {
        self.to_date().format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.iso())
    }
}

/// Natural key of a daily aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateKey {
    pub profile_id: ProfileId,
    pub day: DayKey,
}

impl AggregateKey {
    pub fn new(profile_id: ProfileId, day: DayKey) -> Self {
        Self { profile_id, day }
    }
}

impl fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.profile_id, self.day.days_since_epoch())
    }
}

/// Inclusive range of days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayRange {
    pub start: DayKey,
    pub end: DayKey,
}

impl DayRange {
    pub fn new(start: DayKey, end: DayKey) -> Self {
        Self { start, end }
    }

    /// The `days`-long range ending on (and including) `end`.
    pub fn ending_at(end: DayKey, days: u32) -> Self {
        Self {
            start: end.offset(1 - days.max(1) as i64),
            end,
        }
    }

    pub fn len(&self) -> usize {
        if self.end < self.start {
            0
        } else {
            (self.end.days_since_epoch() as i64 - self.start.days_since_epoch() as i64 + 1) as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, day: DayKey) -> bool {
        self.start <= day && day <= self.end
    }

    /// Range of equal length ending the day before `start`.
    pub fn preceding(&self) -> Self {
        let len = self.len().max(1) as i64;
        Self {
            start: self.start.offset(-len),
            end: self.start.offset(-1),
        }
    }

    /// Every day in the range, ascending.
    pub fn iter(&self) -> impl Iterator<Item = DayKey> + use<> {
        let start = self.start.days_since_epoch();
        let end = self.end.days_since_epoch();
        (start..=end).map(DayKey::from_days_since_epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_same_utc_day_same_key() {
        let morning = Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 1).unwrap();
        let night = Utc.with_ymd_and_hms(2026, 10, 18, 23, 59, 59).unwrap();
        let next = Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap();

        assert_eq!(DayKey::from_datetime(morning), DayKey::from_datetime(night));
        assert_eq!(
            DayKey::from_datetime(next),
            DayKey::from_datetime(night).offset(1)
        );
    }

    #[test]
    fn test_epoch_is_zero() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(DayKey::from_date(epoch).days_since_epoch(), 0);
        assert_eq!(DayKey::from_days_since_epoch(0).to_date(), epoch);
    }

    #[test]
    fn test_labels() {
        let day = DayKey::from_date(NaiveDate::from_ymd_opt(2026, 10, 8).unwrap());
        assert_eq!(day.label(), "Oct 8");
        assert_eq!(day.iso(), "2026-10-08");
    }

    #[test]
    fn test_range_ending_at() {
        let end = DayKey::from_days_since_epoch(100);
        let range = DayRange::ending_at(end, 7);
        assert_eq!(range.start.days_since_epoch(), 94);
        assert_eq!(range.len(), 7);
        assert_eq!(range.iter().count(), 7);
        assert_eq!(range.iter().last(), Some(end));
    }

    #[test]
    fn test_preceding_range() {
        let range = DayRange::new(
            DayKey::from_days_since_epoch(10),
            DayKey::from_days_since_epoch(14),
        );
        let previous = range.preceding();
        assert_eq!(previous.start.days_since_epoch(), 5);
        assert_eq!(previous.end.days_since_epoch(), 9);
        assert_eq!(previous.len(), range.len());
    }

    #[test]
    fn test_empty_range() {
        let range = DayRange::new(
            DayKey::from_days_since_epoch(5),
            DayKey::from_days_since_epoch(4),
        );
        assert!(range.is_empty());
        assert_eq!(range.iter().count(), 0);
    }

    #[test]
    fn test_key_display() {
        let key = AggregateKey::new(ProfileId::from("p1"), DayKey::from_days_since_epoch(3));
        assert_eq!(key.to_string(), "p1:3");
    }
}
