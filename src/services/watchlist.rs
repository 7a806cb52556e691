use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::WatchlistStore,
    error::{AppError, AppResult},
    models::{
        normalize_tags, CreateItemRequest, ItemResponse, ListQuery, MediaKind, Page,
        TrackedMediaItem, WatchRecord, WatchStatus,
    },
    services::{load_owned, providers::MediaLookupService, OwnerLocks},
};

/// Creates, lists and removes tracked items.
///
/// Status changes after creation go through
/// [`WatchStatusEngine`](crate::services::WatchStatusEngine).
pub struct WatchlistService {
    store: Arc<dyn WatchlistStore>,
    lookup: Arc<dyn MediaLookupService>,
    owner_locks: Arc<OwnerLocks>,
}

impl WatchlistService {
    pub fn new(
        store: Arc<dyn WatchlistStore>,
        lookup: Arc<dyn MediaLookupService>,
        owner_locks: Arc<OwnerLocks>,
    ) -> Self {
        Self {
            store,
            lookup,
            owner_locks,
        }
    }

    pub async fn create(
        &self,
        owner_id: Uuid,
        request: CreateItemRequest,
    ) -> AppResult<TrackedMediaItem> {
        self.create_at(owner_id, request, Utc::now()).await
    }

    /// Resolves the media through the lookup service and stores a snapshot.
    ///
    /// Nothing is written when the lookup fails. An item created directly as
    /// `watched` is counted in the owner's aggregate by the same write, under
    /// the owner's lock so a concurrent rebuild cannot drop it. The lookup
    /// itself runs outside the lock.
    pub async fn create_at(
        &self,
        owner_id: Uuid,
        request: CreateItemRequest,
        now: DateTime<Utc>,
    ) -> AppResult<TrackedMediaItem> {
        request.validate()?;

        if self
            .store
            .find_by_media(owner_id, request.media_id, request.media_kind)
            .await?
            .is_some()
        {
            return Err(duplicate(&request));
        }

        let mut details = self
            .lookup
            .fetch_details(request.media_id, request.media_kind)
            .await
            .map_err(|e| {
                tracing::warn!(
                    error = %e,
                    media_id = request.media_id,
                    kind = %request.media_kind,
                    provider = self.lookup.name(),
                    "Media lookup failed"
                );
                e
            })?;
        details.media_id = request.media_id;
        details.kind = request.media_kind;

        let mut item = TrackedMediaItem::from_details(owner_id, details, now);
        let watch = apply_overrides(&mut item, &request, now);

        let _guard = self.owner_locks.acquire(owner_id).await;
        let created = self
            .store
            .insert_item(&item, watch.as_ref())
            .await
            .map_err(|e| match e {
                AppError::Duplicate(_) => duplicate(&request),
                other => other,
            })?;

        tracing::info!(
            owner_id = %owner_id,
            item_id = %created.id,
            media_id = created.media_id,
            kind = %created.media_kind,
            status = %created.status,
            "Watchlist item created"
        );

        Ok(created)
    }

    pub async fn list(&self, owner_id: Uuid, query: &ListQuery) -> AppResult<Page<ItemResponse>> {
        query.validate()?;

        let (items, total) = self.store.list_items(owner_id, query).await?;

        tracing::debug!(
            owner_id = %owner_id,
            returned = items.len(),
            total = total,
            page = query.page,
            "Listed watchlist items"
        );

        Ok(Page::new(items, query, total).map(ItemResponse::from))
    }

    pub async fn get(&self, owner_id: Uuid, item_id: Uuid) -> AppResult<TrackedMediaItem> {
        load_owned(self.store.as_ref(), owner_id, item_id).await
    }

    /// Removes the item. Counters already recorded for it are kept.
    pub async fn delete(&self, owner_id: Uuid, item_id: Uuid) -> AppResult<()> {
        let _guard = self.owner_locks.acquire(owner_id).await;
        load_owned(self.store.as_ref(), owner_id, item_id).await?;

        if !self.store.delete_item(item_id).await? {
            return Err(AppError::NotFound(format!(
                "Watchlist item {} not found",
                item_id
            )));
        }

        tracing::info!(owner_id = %owner_id, item_id = %item_id, "Watchlist item deleted");
        Ok(())
    }
}

fn duplicate(request: &CreateItemRequest) -> AppError {
    AppError::Duplicate(format!(
        "{} {} is already on the watchlist",
        request.media_kind, request.media_id
    ))
}

/// Copies the caller-supplied fields onto a fresh item and returns the watch
/// to record when it starts out as `watched`.
fn apply_overrides(
    item: &mut TrackedMediaItem,
    request: &CreateItemRequest,
    now: DateTime<Utc>,
) -> Option<WatchRecord> {
    item.user_rating = request.user_rating;
    item.user_review = request.user_review.clone();
    item.is_favorite = request.is_favorite.unwrap_or(false);
    if let Some(tags) = &request.tags {
        item.tags = normalize_tags(tags);
    }

    if item.media_kind == MediaKind::Show {
        let progress = item.progress.get_or_insert_with(Default::default);
        if request.current_episode.is_some() {
            progress.current_episode = request.current_episode;
        }
        if request.current_season.is_some() {
            progress.current_season = request.current_season;
        }
    }

    item.status = request.initial_status.unwrap_or_default();
    if item.status == WatchStatus::Watched {
        item.watched_at = Some(now);
        Some(WatchRecord::for_item(item, now))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryWatchlistStore;
    use crate::models::ItemUpdate;
    use crate::services::{providers::MockMediaLookupService, WatchStatusEngine};
    use crate::test_support::{movie_details, show_details, t};
    use mockall::predicate::eq;
    use tokio_test::{assert_err, assert_ok};

    fn lookup_returning(details: crate::models::MediaDetails) -> MockMediaLookupService {
        let mut lookup = MockMediaLookupService::new();
        let media_id = details.media_id;
        let kind = details.kind;
        lookup
            .expect_fetch_details()
            .with(eq(media_id), eq(kind))
            .returning(move |_, _| Ok(details.clone()));
        lookup.expect_name().return_const("mock");
        lookup
    }

    fn service(lookup: MockMediaLookupService) -> (Arc<InMemoryWatchlistStore>, WatchlistService) {
        let store = Arc::new(InMemoryWatchlistStore::new());
        let service = WatchlistService::new(store.clone(), Arc::new(lookup), Arc::new(OwnerLocks::new()));
        (store, service)
    }

    #[tokio::test]
    async fn test_create_snapshots_lookup_result() {
        let (_store, service) = service(lookup_returning(movie_details(550, 139)));
        let owner = Uuid::new_v4();
        let now = t(2024, 2, 1, 12, 0, 0);

        let created = service
            .create_at(owner, CreateItemRequest::new(550, MediaKind::Movie), now)
            .await
            .unwrap();

        assert_eq!(created.owner_id, owner);
        assert_eq!(created.title, "Movie 550");
        assert_eq!(created.runtime, Some(139));
        assert_eq!(created.status, WatchStatus::Watchlist);
        assert_eq!(created.added_at, now);
        assert_eq!(created.watched_at, None);
        assert!(!created.is_favorite);
    }

    #[tokio::test]
    async fn test_create_applies_overrides_for_show() {
        let (_store, service) = service(lookup_returning(show_details(1396, Some(47))));
        let request = CreateItemRequest {
            initial_status: Some(WatchStatus::Watching),
            user_rating: Some(8),
            is_favorite: Some(true),
            current_episode: Some(4),
            current_season: Some(2),
            tags: Some(vec!["rewatch ".to_string(), "crime".to_string(), "rewatch".to_string()]),
            ..CreateItemRequest::new(1396, MediaKind::Show)
        };

        let created = service.create(Uuid::new_v4(), request).await.unwrap();

        let progress = created.progress.unwrap();
        assert_eq!(created.status, WatchStatus::Watching);
        assert_eq!(created.user_rating, Some(8));
        assert!(created.is_favorite);
        assert_eq!(created.tags, vec!["rewatch", "crime"]);
        assert_eq!(progress.current_episode, Some(4));
        assert_eq!(progress.current_season, Some(2));
        assert_eq!(progress.total_episodes, Some(30));
    }

    #[tokio::test]
    async fn test_create_as_watched_counts_immediately() {
        let (store, service) = service(lookup_returning(movie_details(27205, 148)));
        let owner = Uuid::new_v4();
        let now = t(2024, 2, 1, 12, 0, 0);
        let request = CreateItemRequest {
            initial_status: Some(WatchStatus::Watched),
            ..CreateItemRequest::new(27205, MediaKind::Movie)
        };

        let created = service.create_at(owner, request, now).await.unwrap();

        assert_eq!(created.watched_at, Some(now));
        let stats = store.statistics(owner).await.unwrap();
        assert_eq!(stats.total_watched, 1);
        assert_eq!(stats.total_watch_time_minutes, 148);
    }

    #[tokio::test]
    async fn test_duplicate_is_rejected_without_lookup() {
        let mut lookup = MockMediaLookupService::new();
        let details = movie_details(42, 100);
        lookup
            .expect_fetch_details()
            .times(1)
            .returning(move |_, _| Ok(details.clone()));
        lookup.expect_name().return_const("mock");
        let (_store, service) = service(lookup);
        let owner = Uuid::new_v4();

        assert_ok!(service.create(owner, CreateItemRequest::new(42, MediaKind::Movie)).await);
        let err = assert_err!(service.create(owner, CreateItemRequest::new(42, MediaKind::Movie)).await);

        assert!(matches!(err, AppError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_lookup_failure_creates_nothing() {
        let mut lookup = MockMediaLookupService::new();
        lookup
            .expect_fetch_details()
            .returning(|_, _| Err(AppError::UpstreamUnavailable("timed out".to_string())));
        lookup.expect_name().return_const("mock");
        let (store, service) = service(lookup);
        let owner = Uuid::new_v4();

        let err = assert_err!(service.create(owner, CreateItemRequest::new(9, MediaKind::Movie)).await);

        assert!(matches!(err, AppError::UpstreamUnavailable(_)));
        assert!(store.items_for_owner(owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_media_is_not_found() {
        let mut lookup = MockMediaLookupService::new();
        lookup
            .expect_fetch_details()
            .returning(|id, kind| Err(AppError::NotFound(format!("{} {}", kind, id))));
        lookup.expect_name().return_const("mock");
        let (_store, service) = service(lookup);

        let err = assert_err!(
            service
                .create(Uuid::new_v4(), CreateItemRequest::new(999_999, MediaKind::Show))
                .await
        );
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_invalid_request_skips_lookup() {
        let mut lookup = MockMediaLookupService::new();
        lookup.expect_fetch_details().times(0);
        let (_store, service) = service(lookup);
        let request = CreateItemRequest {
            user_rating: Some(11),
            ..CreateItemRequest::new(1, MediaKind::Movie)
        };

        let err = assert_err!(service.create(Uuid::new_v4(), request).await);
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_and_readd_keeps_counters() {
        let store = Arc::new(InMemoryWatchlistStore::new());
        let locks = Arc::new(OwnerLocks::new());
        let service = WatchlistService::new(
            store.clone(),
            Arc::new(lookup_returning(movie_details(42, 120))),
            locks.clone(),
        );
        let engine = WatchStatusEngine::new(store.clone(), locks);
        let owner = Uuid::new_v4();

        let first = service
            .create(owner, CreateItemRequest::new(42, MediaKind::Movie))
            .await
            .unwrap();
        engine
            .apply_update(
                owner,
                first.id,
                ItemUpdate {
                    status: Some(WatchStatus::Watched),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        service.delete(owner, first.id).await.unwrap();

        let again = service
            .create(owner, CreateItemRequest::new(42, MediaKind::Movie))
            .await
            .unwrap();

        assert_ne!(again.id, first.id);
        assert_eq!(again.status, WatchStatus::Watchlist);
        let stats = store.statistics(owner).await.unwrap();
        assert_eq!(stats.total_watched, 1);
        assert_eq!(stats.total_watch_time_minutes, 120);
    }

    #[tokio::test]
    async fn test_get_and_delete_check_ownership() {
        let (_store, service) = service(lookup_returning(movie_details(42, 120)));
        let owner = Uuid::new_v4();
        let intruder = Uuid::new_v4();
        let created = service
            .create(owner, CreateItemRequest::new(42, MediaKind::Movie))
            .await
            .unwrap();

        let err = assert_err!(service.get(intruder, created.id).await);
        assert!(matches!(err, AppError::Forbidden(_)));
        let err = assert_err!(service.delete(intruder, created.id).await);
        assert!(matches!(err, AppError::Forbidden(_)));
        let err = assert_err!(service.delete(owner, Uuid::new_v4()).await);
        assert!(matches!(err, AppError::NotFound(_)));

        assert_ok!(service.get(owner, created.id).await);
    }

    #[tokio::test]
    async fn test_list_pages_and_filters() {
        let mut lookup = MockMediaLookupService::new();
        lookup
            .expect_fetch_details()
            .returning(|id, _| Ok(movie_details(id, 100)));
        lookup.expect_name().return_const("mock");
        let (_store, service) = service(lookup);
        let owner = Uuid::new_v4();

        for (media_id, day) in [(1, 1), (2, 2), (3, 3)] {
            service
                .create_at(owner, CreateItemRequest::new(media_id, MediaKind::Movie), t(2024, 1, day, 0, 0, 0))
                .await
                .unwrap();
        }
        service
            .create_at(
                owner,
                CreateItemRequest {
                    initial_status: Some(WatchStatus::Watched),
                    ..CreateItemRequest::new(4, MediaKind::Movie)
                },
                t(2024, 1, 4, 0, 0, 0),
            )
            .await
            .unwrap();

        let query = ListQuery {
            status: Some(WatchStatus::Watchlist),
            limit: 2,
            ..Default::default()
        };
        let page = service.list(owner, &query).await.unwrap();

        let media_ids: Vec<i64> = page.items.iter().map(|i| i.item.media_id).collect();
        assert_eq!(media_ids, vec![3, 2]);
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.pagination.pages, 2);
        assert_eq!(page.items[0].watch_time, 100);
    }

    #[tokio::test]
    async fn test_rebuild_waits_for_watched_create() {
        let store = Arc::new(InMemoryWatchlistStore::new());
        let locks = Arc::new(OwnerLocks::new());
        let service = Arc::new(WatchlistService::new(
            store.clone(),
            Arc::new(lookup_returning(movie_details(603, 136))),
            locks.clone(),
        ));
        let engine = Arc::new(WatchStatusEngine::new(store.clone(), locks.clone()));
        let owner = Uuid::new_v4();

        // A rebuild that has read the owner's items holds the lock until it
        // writes the aggregate back.
        let rebuild_guard = locks.acquire(owner).await;
        let stale = crate::models::UserStatistics::rebuild_from(&store.items_for_owner(owner).await.unwrap());

        let create = tokio::spawn({
            let service = service.clone();
            async move {
                let request = CreateItemRequest {
                    initial_status: Some(WatchStatus::Watched),
                    ..CreateItemRequest::new(603, MediaKind::Movie)
                };
                service.create(owner, request).await
            }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(store.items_for_owner(owner).await.unwrap().is_empty());

        store.replace_statistics(owner, &stale).await.unwrap();
        drop(rebuild_guard);
        assert_ok!(create.await.unwrap());

        let stats = store.statistics(owner).await.unwrap();
        assert_eq!(stats.total_watched, 1);
        assert_eq!(stats.total_watch_time_minutes, 136);

        let rebuilt = engine.rebuild_statistics(owner).await.unwrap();
        assert_eq!(rebuilt.total_watched, 1);
    }

    #[tokio::test]
    async fn test_invalid_tags_rejected_before_lookup() {
        let mut lookup = MockMediaLookupService::new();
        lookup.expect_fetch_details().times(0);
        let (_store, service) = service(lookup);
        let request = CreateItemRequest {
            tags: Some(vec!["   ".to_string()]),
            ..CreateItemRequest::new(1, MediaKind::Movie)
        };

        let err = assert_err!(service.create(Uuid::new_v4(), request).await);
        assert!(matches!(err, AppError::Validation(_)));
    }
}
