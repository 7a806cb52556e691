use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    db::WatchlistStore,
    error::{AppError, AppResult},
    models::{
        ListQuery, MediaKind, SortOrder, TrackedMediaItem, UserStatistics, WatchRecord,
    },
};

#[derive(Default)]
struct Inner {
    items: HashMap<Uuid, TrackedMediaItem>,
    statistics: HashMap<Uuid, UserStatistics>,
}

impl Inner {
    fn holds_key(&self, owner_id: Uuid, media_id: i64, media_kind: MediaKind) -> bool {
        self.items.values().any(|existing| {
            existing.owner_id == owner_id
                && existing.media_id == media_id
                && existing.media_kind == media_kind
        })
    }

    fn record(&mut self, owner_id: Uuid, watch: Option<&WatchRecord>) {
        if let Some(watch) = watch {
            self.statistics.entry(owner_id).or_default().record_watch(watch);
        }
    }
}

/// Volatile store keeping everything behind one async `RwLock`.
///
/// Meant for local runs and tests; production deployments use
/// [`PostgresWatchlistStore`](crate::db::PostgresWatchlistStore). Item writes
/// and aggregate writes happen under the same write guard, which makes each
/// of them atomic with respect to every other operation. The guard is never
/// held across I/O, so contention between owners is limited to short
/// in-memory critical sections; per-owner ordering comes from
/// [`OwnerLocks`](crate::services::OwnerLocks).
#[derive(Default)]
pub struct InMemoryWatchlistStore {
    inner: RwLock<Inner>,
}

impl InMemoryWatchlistStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sort_items(items: &mut [TrackedMediaItem], order: SortOrder) {
    match order {
        SortOrder::AddedDesc => items.sort_by(|a, b| b.added_at.cmp(&a.added_at)),
        SortOrder::AddedAsc => items.sort_by(|a, b| a.added_at.cmp(&b.added_at)),
        SortOrder::UpdatedDesc => items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at)),
        // Never-watched items go last
        SortOrder::WatchedDesc => items.sort_by(|a, b| b.watched_at.cmp(&a.watched_at)),
        SortOrder::TitleAsc => items.sort_by(|a, b| a.title.cmp(&b.title)),
    }
}

#[async_trait::async_trait]
impl WatchlistStore for InMemoryWatchlistStore {
    async fn insert_item(
        &self,
        item: &TrackedMediaItem,
        watch: Option<&WatchRecord>,
    ) -> AppResult<TrackedMediaItem> {
        let mut inner = self.inner.write().await;

        if inner.holds_key(item.owner_id, item.media_id, item.media_kind) {
            return Err(AppError::Duplicate(format!(
                "{} {} is already tracked",
                item.media_kind, item.media_id
            )));
        }

        let stored = TrackedMediaItem {
            version: 1,
            ..item.clone()
        };
        inner.items.insert(stored.id, stored.clone());
        inner.record(item.owner_id, watch);

        Ok(stored)
    }

    async fn get_item(&self, id: Uuid) -> AppResult<Option<TrackedMediaItem>> {
        Ok(self.inner.read().await.items.get(&id).cloned())
    }

    async fn find_by_media(
        &self,
        owner_id: Uuid,
        media_id: i64,
        media_kind: MediaKind,
    ) -> AppResult<Option<TrackedMediaItem>> {
        let inner = self.inner.read().await;
        Ok(inner
            .items
            .values()
            .find(|item| {
                item.owner_id == owner_id
                    && item.media_id == media_id
                    && item.media_kind == media_kind
            })
            .cloned())
    }

    async fn list_items(
        &self,
        owner_id: Uuid,
        query: &ListQuery,
    ) -> AppResult<(Vec<TrackedMediaItem>, usize)> {
        let inner = self.inner.read().await;
        let mut matching: Vec<TrackedMediaItem> = inner
            .items
            .values()
            .filter(|item| item.owner_id == owner_id)
            .filter(|item| query.status.map_or(true, |status| item.status == status))
            .cloned()
            .collect();
        drop(inner);

        let total = matching.len();
        sort_items(&mut matching, query.sort);
        let page = matching
            .into_iter()
            .skip(query.offset())
            .take(query.limit)
            .collect();

        Ok((page, total))
    }

    async fn items_for_owner(&self, owner_id: Uuid) -> AppResult<Vec<TrackedMediaItem>> {
        let inner = self.inner.read().await;
        Ok(inner
            .items
            .values()
            .filter(|item| item.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn commit_update(
        &self,
        item: &TrackedMediaItem,
        watch: Option<&WatchRecord>,
    ) -> AppResult<TrackedMediaItem> {
        let mut inner = self.inner.write().await;

        let stored_version = inner
            .items
            .get(&item.id)
            .map(|stored| stored.version)
            .ok_or_else(|| AppError::NotFound(format!("Watchlist item {} not found", item.id)))?;

        if stored_version != item.version {
            return Err(AppError::Consistency(format!(
                "Watchlist item {} was modified concurrently",
                item.id
            )));
        }

        let updated = TrackedMediaItem {
            version: stored_version + 1,
            ..item.clone()
        };
        inner.items.insert(updated.id, updated.clone());
        inner.record(item.owner_id, watch);

        Ok(updated)
    }

    async fn delete_item(&self, id: Uuid) -> AppResult<bool> {
        Ok(self.inner.write().await.items.remove(&id).is_some())
    }

    async fn statistics(&self, owner_id: Uuid) -> AppResult<UserStatistics> {
        Ok(self
            .inner
            .read()
            .await
            .statistics
            .get(&owner_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_statistics(&self, owner_id: Uuid, stats: &UserStatistics) -> AppResult<()> {
        self.inner
            .write()
            .await
            .statistics
            .insert(owner_id, stats.clone());
        Ok(())
    }
}
