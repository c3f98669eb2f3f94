//! Lock-free counters describing ingestion health

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Which tracking path an event came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Visit,
    Interaction,
    Duration,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Visit => "visit",
            EventKind::Interaction => "interaction",
            EventKind::Duration => "duration",
        }
    }
}

/// Counters for accepted, dropped and failed events.
///
/// Tracking failures are swallowed at the API boundary; these counters keep
/// them visible to whoever embeds the engine.
#[derive(Debug, Default)]
pub struct IngestionStats {
    visits: AtomicU64,
    new_visitors: AtomicU64,
    interactions: AtomicU64,
    dropped_interactions: AtomicU64,
    durations: AtomicU64,
    tracked_seconds: AtomicU64,
    not_found: AtomicU64,
    rejected: AtomicU64,
    store_failures: AtomicU64,
    reports: AtomicU64,
    failed_reports: AtomicU64,
}

impl IngestionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_visit(&self, new_visitor: bool) {
        self.visits.fetch_add(1, Ordering::Relaxed);
        if new_visitor {
            self.new_visitors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_interaction(&self, applied: bool) {
        if applied {
            self.interactions.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped_interactions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_duration(&self, seconds: u64) {
        self.durations.fetch_add(1, Ordering::Relaxed);
        self.tracked_seconds.fetch_add(seconds, Ordering::Relaxed);
    }

    pub(crate) fn record_not_found(&self) {
        self.not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store_failure(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_report(&self, succeeded: bool) {
        self.reports.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.failed_reports.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> IngestionSnapshot {
        IngestionSnapshot {
            visits: self.visits.load(Ordering::Relaxed),
            new_visitors: self.new_visitors.load(Ordering::Relaxed),
            interactions: self.interactions.load(Ordering::Relaxed),
            dropped_interactions: self.dropped_interactions.load(Ordering::Relaxed),
            durations: self.durations.load(Ordering::Relaxed),
            tracked_seconds: self.tracked_seconds.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            reports: self.reports.load(Ordering::Relaxed),
            failed_reports: self.failed_reports.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.visits,
            &self.new_visitors,
            &self.interactions,
            &self.dropped_interactions,
            &self.durations,
            &self.tracked_seconds,
            &self.not_found,
            &self.rejected,
            &self.store_failures,
            &self.reports,
            &self.failed_reports,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Serializable view of [`IngestionStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionSnapshot {
    pub visits: u64,
    pub new_visitors: u64,
    pub interactions: u64,
    /// Interactions that arrived before any view on their day
    pub dropped_interactions: u64,
    pub durations: u64,
    pub tracked_seconds: u64,
    /// Events for slugs that resolve to no profile
    pub not_found: u64,
    /// Events rejected for invalid input or disabled analytics
    pub rejected: u64,
    pub store_failures: u64,
    pub reports: u64,
    pub failed_reports: u64,
}
