use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{MediaKind, TrackedMediaItem, WatchStatus};

/// A first-time entry into `watched`, as applied to the owner's aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchRecord {
    pub kind: MediaKind,
    pub watch_time_minutes: i64,
    /// UTC calendar day of the transition
    pub watched_on: NaiveDate,
}

impl WatchRecord {
    pub fn for_item(item: &TrackedMediaItem, at: DateTime<Utc>) -> Self {
        Self {
            kind: item.media_kind,
            watch_time_minutes: item.watch_time_as_watched(),
            watched_on: at.date_naive(),
        }
    }
}

/// Per-user running counters.
///
/// Only ever moved forward by [`UserStatistics::record_watch`];
/// `total_watched == movies_watched + shows_watched` holds after every call.
/// A streak is a run of consecutive UTC days with at least one new watch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatistics {
    pub total_watched: i64,
    pub total_watch_time_minutes: i64,
    pub movies_watched: i64,
    pub shows_watched: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_watched_on: Option<NaiveDate>,
}

impl UserStatistics {
    pub fn record_watch(&mut self, record: &WatchRecord) {
        self.total_watched += 1;
        self.total_watch_time_minutes += record.watch_time_minutes.max(0);
        match record.kind {
            MediaKind::Movie => self.movies_watched += 1,
            MediaKind::Show => self.shows_watched += 1,
        }
        self.advance_streak(record.watched_on);
    }

    fn advance_streak(&mut self, day: NaiveDate) {
        self.current_streak = match self.last_watched_on {
            Some(last) if last == day => self.current_streak.max(1),
            Some(last) if last + Duration::days(1) == day => self.current_streak + 1,
            // Out-of-order timestamps (clock skew) do not break a running streak
            Some(last) if day < last => self.current_streak.max(1),
            _ => 1,
        };
        self.longest_streak = self.longest_streak.max(self.current_streak);
        self.last_watched_on = Some(self.last_watched_on.map_or(day, |last| last.max(day)));
    }

    /// Recomputes the counters from scratch out of an owner's current items.
    ///
    /// Repair path only: items deleted since they were watched no longer
    /// contribute, unlike the running counters.
    pub fn rebuild_from(items: &[TrackedMediaItem]) -> Self {
        let mut records: Vec<WatchRecord> = items
            .iter()
            .filter(|item| item.status == WatchStatus::Watched)
            .filter_map(|item| {
                item.watched_at.map(|at| WatchRecord {
                    kind: item.media_kind,
                    watch_time_minutes: item.watch_time(),
                    watched_on: at.date_naive(),
                })
            })
            .collect();
        records.sort_by_key(|record| record.watched_on);

        let mut stats = Self::default();
        for record in &records {
            stats.record_watch(record);
        }
        stats
    }

    pub fn is_consistent(&self) -> bool {
        self.total_watched == self.movies_watched + self.shows_watched
    }
}

// ============================================================================
// Report rows
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCount {
    pub status: WatchStatus,
    pub count: u64,
    pub total_runtime: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenreCount {
    pub genre_id: i32,
    pub count: u64,
}

/// Slim projection of an item for the activity feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: Uuid,
    pub title: String,
    pub media_kind: MediaKind,
    pub status: WatchStatus,
    pub added_at: DateTime<Utc>,
    pub watched_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub user_rating: Option<i16>,
}

impl From<&TrackedMediaItem> for ActivityEntry {
    fn from(item: &TrackedMediaItem) -> Self {
        Self {
            id: item.id,
            title: item.title.clone(),
            media_kind: item.media_kind,
            status: item.status,
            added_at: item.added_at,
            watched_at: item.watched_at,
            updated_at: item.updated_at,
            user_rating: item.user_rating,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearRollup {
    pub year: i32,
    pub count: u64,
    pub total_runtime: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthRollup {
    pub month: u32,
    pub count: u64,
    pub total_runtime: i64,
}

/// Everything the statistics endpoint returns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsReport {
    pub status_breakdown: Vec<StatusCount>,
    pub genre_frequency: Vec<GenreCount>,
    pub recent_activity: Vec<ActivityEntry>,
    pub yearly_rollup: Vec<YearRollup>,
    pub year: i32,
    pub monthly_rollup: Vec<MonthRollup>,
    pub aggregate_counters: UserStatistics,
}
