use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use chrono::{DateTime, Datelike, Utc};
use uuid::Uuid;

use crate::{
    db::WatchlistStore,
    error::AppResult,
    models::{
        ActivityEntry, GenreCount, MonthRollup, StatisticsReport, StatsQuery, StatusCount,
        TrackedMediaItem, WatchStatus, YearRollup,
    },
};

/// Read-only views over an owner's items and running counters.
///
/// Every view is computed from a single snapshot of the owner's items, so
/// the sections of one report always agree with each other.
pub struct StatisticsAggregator {
    store: Arc<dyn WatchlistStore>,
}

impl StatisticsAggregator {
    pub fn new(store: Arc<dyn WatchlistStore>) -> Self {
        Self { store }
    }

    pub async fn status_breakdown(&self, owner_id: Uuid) -> AppResult<Vec<StatusCount>> {
        let items = self.store.items_for_owner(owner_id).await?;
        Ok(status_breakdown(&items))
    }

    pub async fn genre_frequency(&self, owner_id: Uuid, limit: usize) -> AppResult<Vec<GenreCount>> {
        let items = self.store.items_for_owner(owner_id).await?;
        Ok(genre_frequency(&items, limit))
    }

    pub async fn recent_activity(
        &self,
        owner_id: Uuid,
        limit: usize,
    ) -> AppResult<Vec<ActivityEntry>> {
        let items = self.store.items_for_owner(owner_id).await?;
        Ok(recent_activity(&items, limit))
    }

    pub async fn yearly_rollup(&self, owner_id: Uuid, max_years: usize) -> AppResult<Vec<YearRollup>> {
        let items = self.store.items_for_owner(owner_id).await?;
        Ok(yearly_rollup(&items, max_years))
    }

    pub async fn monthly_rollup(&self, owner_id: Uuid, year: i32) -> AppResult<Vec<MonthRollup>> {
        let items = self.store.items_for_owner(owner_id).await?;
        Ok(monthly_rollup(&items, year))
    }

    pub async fn report(&self, owner_id: Uuid, query: &StatsQuery) -> AppResult<StatisticsReport> {
        self.report_at(owner_id, query, Utc::now()).await
    }

    /// Full dashboard; `now` picks the monthly rollup year when none is given
    pub async fn report_at(
        &self,
        owner_id: Uuid,
        query: &StatsQuery,
        now: DateTime<Utc>,
    ) -> AppResult<StatisticsReport> {
        query.validate()?;

        let items = self.store.items_for_owner(owner_id).await?;
        let aggregate_counters = self.store.statistics(owner_id).await?;
        let year = query.year.unwrap_or_else(|| now.year());

        tracing::debug!(
            owner_id = %owner_id,
            items = items.len(),
            year = year,
            "Building statistics report"
        );

        Ok(StatisticsReport {
            status_breakdown: status_breakdown(&items),
            genre_frequency: genre_frequency(&items, query.genre_limit),
            recent_activity: recent_activity(&items, query.activity_limit),
            yearly_rollup: yearly_rollup(&items, query.max_years),
            year,
            monthly_rollup: monthly_rollup(&items, year),
            aggregate_counters,
        })
    }
}

/// Count and summed runtime per status; all four statuses are always listed
pub fn status_breakdown(items: &[TrackedMediaItem]) -> Vec<StatusCount> {
    let mut totals: HashMap<WatchStatus, (u64, i64)> = HashMap::new();
    for item in items {
        let entry = totals.entry(item.status).or_default();
        entry.0 += 1;
        entry.1 += item.runtime_minutes();
    }

    WatchStatus::ALL
        .into_iter()
        .map(|status| {
            let (count, total_runtime) = totals.get(&status).copied().unwrap_or_default();
            StatusCount {
                status,
                count,
                total_runtime,
            }
        })
        .collect()
}

/// Most frequent genres among watched items, ties broken by ascending genre id
pub fn genre_frequency(items: &[TrackedMediaItem], limit: usize) -> Vec<GenreCount> {
    let mut counts: BTreeMap<i32, u64> = BTreeMap::new();
    for item in items.iter().filter(|item| item.status == WatchStatus::Watched) {
        let genres: BTreeSet<i32> = item.genre_ids.iter().copied().collect();
        for genre_id in genres {
            *counts.entry(genre_id).or_default() += 1;
        }
    }

    let mut frequency: Vec<GenreCount> = counts
        .into_iter()
        .map(|(genre_id, count)| GenreCount { genre_id, count })
        .collect();
    frequency.sort_by(|a, b| b.count.cmp(&a.count).then(a.genre_id.cmp(&b.genre_id)));
    frequency.truncate(limit);
    frequency
}

/// Most recently updated items first
pub fn recent_activity(items: &[TrackedMediaItem], limit: usize) -> Vec<ActivityEntry> {
    let mut recent: Vec<&TrackedMediaItem> = items.iter().collect();
    recent.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
    recent.into_iter().take(limit).map(ActivityEntry::from).collect()
}

/// Watched items per UTC year of `watchedAt`, newest year first
pub fn yearly_rollup(items: &[TrackedMediaItem], max_years: usize) -> Vec<YearRollup> {
    let mut years: BTreeMap<i32, (u64, i64)> = BTreeMap::new();
    for (watched_at, item) in watched(items) {
        let entry = years.entry(watched_at.year()).or_default();
        entry.0 += 1;
        entry.1 += item.runtime_minutes();
    }

    years
        .into_iter()
        .rev()
        .take(max_years)
        .map(|(year, (count, total_runtime))| YearRollup {
            year,
            count,
            total_runtime,
        })
        .collect()
}

/// Watched items per UTC month within `year`; months without watches are omitted
pub fn monthly_rollup(items: &[TrackedMediaItem], year: i32) -> Vec<MonthRollup> {
    let mut months: BTreeMap<u32, (u64, i64)> = BTreeMap::new();
    for (watched_at, item) in watched(items).filter(|(at, _)| at.year() == year) {
        let entry = months.entry(watched_at.month()).or_default();
        entry.0 += 1;
        entry.1 += item.runtime_minutes();
    }

    months
        .into_iter()
        .map(|(month, (count, total_runtime))| MonthRollup {
            month,
            count,
            total_runtime,
        })
        .collect()
}

fn watched(
    items: &[TrackedMediaItem],
) -> impl Iterator<Item = (DateTime<Utc>, &TrackedMediaItem)> + '_ {
    items
        .iter()
        .filter(|item| item.status == WatchStatus::Watched)
        .filter_map(|item| item.watched_at.map(|at| (at, item)))
}
