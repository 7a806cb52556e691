use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::WatchlistStore,
    error::{AppError, AppResult},
    models::{
        normalize_tags, ItemUpdate, MediaKind, TrackedMediaItem, TransitionRequest,
        UserStatistics, WatchRecord, WatchStatus,
    },
    services::{load_owned, OwnerLocks},
};

/// Applies status transitions and field updates to tracked items, keeping
/// the owner's [`UserStatistics`] in step.
///
/// Only the first entry into `watched` touches the aggregate; the item write
/// and the aggregate write are committed by the store as one unit.
pub struct WatchStatusEngine {
    store: Arc<dyn WatchlistStore>,
    owner_locks: Arc<OwnerLocks>,
}

impl WatchStatusEngine {
    pub fn new(store: Arc<dyn WatchlistStore>, owner_locks: Arc<OwnerLocks>) -> Self {
        Self { store, owner_locks }
    }

    /// Moves an item to `request.status`, optionally rating and reviewing it
    pub async fn transition(
        &self,
        owner_id: Uuid,
        item_id: Uuid,
        request: TransitionRequest,
    ) -> AppResult<TrackedMediaItem> {
        self.apply_update_at(owner_id, item_id, request.into(), Utc::now())
            .await
    }

    pub async fn apply_update(
        &self,
        owner_id: Uuid,
        item_id: Uuid,
        update: ItemUpdate,
    ) -> AppResult<TrackedMediaItem> {
        self.apply_update_at(owner_id, item_id, update, Utc::now())
            .await
    }

    /// Field updates land first, then the status rule, then a single commit
    pub async fn apply_update_at(
        &self,
        owner_id: Uuid,
        item_id: Uuid,
        update: ItemUpdate,
        now: DateTime<Utc>,
    ) -> AppResult<TrackedMediaItem> {
        update.validate()?;

        let _guard = self.owner_locks.acquire(owner_id).await;
        let current = load_owned(self.store.as_ref(), owner_id, item_id).await?;

        let mut next = current.clone();
        apply_fields(&mut next, &update)?;

        let watch = match update.status {
            Some(status) => enter_status(&mut next, current.status, status, now),
            None => None,
        };
        next.updated_at = now;

        let committed = self.store.commit_update(&next, watch.as_ref()).await?;

        tracing::info!(
            owner_id = %owner_id,
            item_id = %item_id,
            from = %current.status,
            to = %committed.status,
            counted = watch.is_some(),
            "Watchlist item updated"
        );

        Ok(committed)
    }

    pub async fn toggle_favorite(
        &self,
        owner_id: Uuid,
        item_id: Uuid,
    ) -> AppResult<TrackedMediaItem> {
        let _guard = self.owner_locks.acquire(owner_id).await;
        let mut item = load_owned(self.store.as_ref(), owner_id, item_id).await?;

        item.is_favorite = !item.is_favorite;
        item.updated_at = Utc::now();

        let committed = self.store.commit_update(&item, None).await?;

        tracing::info!(
            owner_id = %owner_id,
            item_id = %item_id,
            is_favorite = committed.is_favorite,
            "Favorite toggled"
        );

        Ok(committed)
    }

    /// Recomputes the owner's aggregate from their current items.
    ///
    /// Out-of-band repair: watches of since-deleted items are dropped from
    /// the counters and streaks are rebuilt from `watchedAt` dates.
    pub async fn rebuild_statistics(&self, owner_id: Uuid) -> AppResult<UserStatistics> {
        let _guard = self.owner_locks.acquire(owner_id).await;

        let previous = self.store.statistics(owner_id).await?;
        let items = self.store.items_for_owner(owner_id).await?;
        let rebuilt = UserStatistics::rebuild_from(&items);
        self.store.replace_statistics(owner_id, &rebuilt).await?;

        tracing::info!(
            owner_id = %owner_id,
            items = items.len(),
            previous_total = previous.total_watched,
            rebuilt_total = rebuilt.total_watched,
            "Statistics rebuilt"
        );

        Ok(rebuilt)
    }
}

fn apply_fields(item: &mut TrackedMediaItem, update: &ItemUpdate) -> AppResult<()> {
    if let Some(rating) = update.user_rating {
        item.user_rating = Some(rating);
    }
    if let Some(review) = &update.user_review {
        item.user_review = Some(review.clone());
    }
    if let Some(is_favorite) = update.is_favorite {
        item.is_favorite = is_favorite;
    }
    if let Some(tags) = &update.tags {
        item.tags = normalize_tags(tags);
    }
    if let Some(changes) = &update.progress {
        if item.media_kind == MediaKind::Movie {
            return Err(AppError::Validation(
                "progress: only applies to shows".to_string(),
            ));
        }
        let progress = item.progress.get_or_insert_with(Default::default);
        if changes.current_episode.is_some() {
            progress.current_episode = changes.current_episode;
        }
        if changes.current_season.is_some() {
            progress.current_season = changes.current_season;
        }
        if changes.total_episodes.is_some() {
            progress.total_episodes = changes.total_episodes;
        }
        if changes.total_seasons.is_some() {
            progress.total_seasons = changes.total_seasons;
        }
    }
    Ok(())
}

/// Sets the new status and returns the watch to record, if this is a fresh
/// entry into `watched`.
fn enter_status(
    item: &mut TrackedMediaItem,
    previous: WatchStatus,
    status: WatchStatus,
    now: DateTime<Utc>,
) -> Option<WatchRecord> {
    item.status = status;
    if status == WatchStatus::Watched && previous != WatchStatus::Watched {
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
    use crate::models::ProgressUpdate;
    use crate::test_support::{item, movie_details, show_details, t};
    use tokio_test::assert_err;

    async fn setup() -> (Arc<InMemoryWatchlistStore>, WatchStatusEngine) {
        let store = Arc::new(InMemoryWatchlistStore::new());
        let engine = WatchStatusEngine::new(store.clone(), Arc::new(OwnerLocks::new()));
        (store, engine)
    }

    async fn seed(store: &InMemoryWatchlistStore, entry: TrackedMediaItem) -> TrackedMediaItem {
        store.insert_item(&entry, None).await.unwrap()
    }

    fn to(status: WatchStatus) -> ItemUpdate {
        ItemUpdate {
            status: Some(status),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_first_watch_updates_statistics() {
        let (store, engine) = setup().await;
        let owner = Uuid::new_v4();
        let movie = seed(&store, item(owner, movie_details(42, 120), t(2024, 3, 1, 0, 0, 0))).await;

        let now = t(2024, 3, 2, 20, 0, 0);
        let updated = engine
            .apply_update_at(owner, movie.id, to(WatchStatus::Watched), now)
            .await
            .unwrap();

        assert_eq!(updated.status, WatchStatus::Watched);
        assert_eq!(updated.watched_at, Some(now));
        assert_eq!(updated.updated_at, now);

        let stats = store.statistics(owner).await.unwrap();
        assert_eq!(stats.total_watched, 1);
        assert_eq!(stats.movies_watched, 1);
        assert_eq!(stats.total_watch_time_minutes, 120);
        assert_eq!(stats.current_streak, 1);
    }

    #[tokio::test]
    async fn test_show_watch_time_uses_progress() {
        let (store, engine) = setup().await;
        let owner = Uuid::new_v4();
        let mut show = item(owner, show_details(1396, Some(30)), t(2024, 3, 1, 0, 0, 0));
        show.progress.as_mut().unwrap().current_episode = Some(8);
        show.status = WatchStatus::Watching;
        let show = seed(&store, show).await;

        engine
            .apply_update_at(owner, show.id, to(WatchStatus::Watched), t(2024, 3, 2, 0, 0, 0))
            .await
            .unwrap();

        let stats = store.statistics(owner).await.unwrap();
        assert_eq!(stats.shows_watched, 1);
        assert_eq!(stats.total_watch_time_minutes, 240);
    }

    #[tokio::test]
    async fn test_progress_in_same_update_counts_towards_watch_time() {
        let (store, engine) = setup().await;
        let owner = Uuid::new_v4();
        let show = seed(&store, item(owner, show_details(1, Some(50)), t(2024, 3, 1, 0, 0, 0))).await;

        let update = ItemUpdate {
            status: Some(WatchStatus::Watched),
            progress: Some(ProgressUpdate {
                current_episode: Some(10),
                ..Default::default()
            }),
            ..Default::default()
        };
        engine
            .apply_update_at(owner, show.id, update, t(2024, 3, 2, 0, 0, 0))
            .await
            .unwrap();

        assert_eq!(store.statistics(owner).await.unwrap().total_watch_time_minutes, 500);
    }

    #[tokio::test]
    async fn test_rewatch_is_idempotent_but_updates_rating() {
        let (store, engine) = setup().await;
        let owner = Uuid::new_v4();
        let movie = seed(&store, item(owner, movie_details(7, 95), t(2024, 3, 1, 0, 0, 0))).await;

        let first = t(2024, 3, 2, 0, 0, 0);
        engine
            .apply_update_at(owner, movie.id, to(WatchStatus::Watched), first)
            .await
            .unwrap();
        let before = store.statistics(owner).await.unwrap();

        let again = TransitionRequest {
            status: WatchStatus::Watched,
            user_rating: Some(9),
            user_review: Some("Even better the second time".to_string()),
        };
        let updated = engine
            .apply_update_at(owner, movie.id, again.into(), t(2024, 3, 5, 0, 0, 0))
            .await
            .unwrap();

        assert_eq!(updated.user_rating, Some(9));
        assert_eq!(updated.watched_at, Some(first));
        assert_eq!(store.statistics(owner).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_other_transitions_have_no_side_effects() {
        let (store, engine) = setup().await;
        let owner = Uuid::new_v4();
        let movie = seed(&store, item(owner, movie_details(3, 100), t(2024, 3, 1, 0, 0, 0))).await;

        for status in [WatchStatus::Watching, WatchStatus::Dropped, WatchStatus::Watchlist] {
            let updated = engine
                .apply_update_at(owner, movie.id, to(status), t(2024, 3, 2, 0, 0, 0))
                .await
                .unwrap();
            assert_eq!(updated.status, status);
            assert_eq!(updated.watched_at, None);
        }

        assert_eq!(store.statistics(owner).await.unwrap(), UserStatistics::default());
    }

    #[tokio::test]
    async fn test_rewatch_after_leaving_watched_counts_again() {
        let (store, engine) = setup().await;
        let owner = Uuid::new_v4();
        let movie = seed(&store, item(owner, movie_details(3, 100), t(2024, 3, 1, 0, 0, 0))).await;

        for (status, day) in [
            (WatchStatus::Watched, 2),
            (WatchStatus::Watching, 3),
            (WatchStatus::Watched, 4),
        ] {
            engine
                .apply_update_at(owner, movie.id, to(status), t(2024, 3, day, 0, 0, 0))
                .await
                .unwrap();
        }

        let stats = store.statistics(owner).await.unwrap();
        assert_eq!(stats.total_watched, 2);
        assert!(stats.is_consistent());
    }

    #[tokio::test]
    async fn test_missing_item_is_not_found() {
        let (_store, engine) = setup().await;
        let err = assert_err!(
            engine
                .transition(
                    Uuid::new_v4(),
                    Uuid::new_v4(),
                    TransitionRequest {
                        status: WatchStatus::Watched,
                        user_rating: None,
                        user_review: None,
                    },
                )
                .await
        );
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_foreign_item_is_forbidden_and_untouched() {
        let (store, engine) = setup().await;
        let owner = Uuid::new_v4();
        let intruder = Uuid::new_v4();
        let movie = seed(&store, item(owner, movie_details(5, 100), t(2024, 3, 1, 0, 0, 0))).await;

        let err = assert_err!(
            engine
                .apply_update_at(intruder, movie.id, to(WatchStatus::Watched), t(2024, 3, 2, 0, 0, 0))
                .await
        );
        assert!(matches!(err, AppError::Forbidden(_)));

        let stored = store.get_item(movie.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WatchStatus::Watchlist);
        assert_eq!(store.statistics(intruder).await.unwrap().total_watched, 0);
    }

    #[tokio::test]
    async fn test_invalid_rating_rejected_before_lookup() {
        let (_store, engine) = setup().await;
        let update = ItemUpdate {
            user_rating: Some(0),
            ..Default::default()
        };
        let err = assert_err!(engine.apply_update(Uuid::new_v4(), Uuid::new_v4(), update).await);
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_progress_on_movie_rejected() {
        let (store, engine) = setup().await;
        let owner = Uuid::new_v4();
        let movie = seed(&store, item(owner, movie_details(5, 100), t(2024, 3, 1, 0, 0, 0))).await;

        let update = ItemUpdate {
            progress: Some(ProgressUpdate {
                current_episode: Some(2),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = assert_err!(engine.apply_update(owner, movie.id, update).await);
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_concurrent_watches_of_same_item_count_once() {
        let (store, engine) = setup().await;
        let engine = Arc::new(engine);
        let owner = Uuid::new_v4();
        let movie = seed(&store, item(owner, movie_details(11, 100), t(2024, 3, 1, 0, 0, 0))).await;

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let engine = engine.clone();
            let id = movie.id;
            tasks.push(tokio::spawn(async move {
                engine
                    .transition(
                        owner,
                        id,
                        TransitionRequest {
                            status: WatchStatus::Watched,
                            user_rating: None,
                            user_review: None,
                        },
                    )
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stats = store.statistics(owner).await.unwrap();
        assert_eq!(stats.total_watched, 1);
        assert_eq!(stats.total_watch_time_minutes, 100);
    }

    #[tokio::test]
    async fn test_streak_follows_consecutive_days() {
        let (store, engine) = setup().await;
        let owner = Uuid::new_v4();

        for (media_id, day) in [(1, 10), (2, 11), (3, 11), (4, 12), (5, 20)] {
            let movie = seed(&store, item(owner, movie_details(media_id, 90), t(2024, 6, 1, 0, 0, 0))).await;
            engine
                .apply_update_at(owner, movie.id, to(WatchStatus::Watched), t(2024, 6, day, 21, 0, 0))
                .await
                .unwrap();
        }

        let stats = store.statistics(owner).await.unwrap();
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.longest_streak, 3);
        assert_eq!(stats.total_watched, 5);
    }

    #[tokio::test]
    async fn test_toggle_favorite() {
        let (store, engine) = setup().await;
        let owner = Uuid::new_v4();
        let movie = seed(&store, item(owner, movie_details(8, 100), t(2024, 3, 1, 0, 0, 0))).await;

        assert!(engine.toggle_favorite(owner, movie.id).await.unwrap().is_favorite);
        assert!(!engine.toggle_favorite(owner, movie.id).await.unwrap().is_favorite);
    }

    #[tokio::test]
    async fn test_rebuild_drops_deleted_items() {
        let (store, engine) = setup().await;
        let owner = Uuid::new_v4();
        let kept = seed(&store, item(owner, movie_details(1, 100), t(2024, 3, 1, 0, 0, 0))).await;
        let removed = seed(&store, item(owner, movie_details(2, 80), t(2024, 3, 1, 0, 0, 0))).await;

        for id in [kept.id, removed.id] {
            engine
                .apply_update_at(owner, id, to(WatchStatus::Watched), t(2024, 3, 2, 0, 0, 0))
                .await
                .unwrap();
        }
        store.delete_item(removed.id).await.unwrap();
        assert_eq!(store.statistics(owner).await.unwrap().total_watched, 2);

        let rebuilt = engine.rebuild_statistics(owner).await.unwrap();
        assert_eq!(rebuilt.total_watched, 1);
        assert_eq!(rebuilt.total_watch_time_minutes, 100);
        assert_eq!(store.statistics(owner).await.unwrap(), rebuilt);
    }

    #[tokio::test]
    async fn test_tags_are_replaced_and_normalized() {
        let (store, engine) = setup().await;
        let owner = Uuid::new_v4();
        let mut movie = item(owner, movie_details(9, 100), t(2024, 3, 1, 0, 0, 0));
        movie.tags = vec!["old".to_string()];
        let movie = seed(&store, movie).await;

        let update = ItemUpdate {
            tags: Some(vec![" noir ".to_string(), "classic".to_string(), "noir".to_string()]),
            ..Default::default()
        };
        let updated = engine.apply_update(owner, movie.id, update).await.unwrap();
        assert_eq!(updated.tags, vec!["noir", "classic"]);

        let untouched = engine.apply_update(owner, movie.id, to(WatchStatus::Watching)).await.unwrap();
        assert_eq!(untouched.tags, vec!["noir", "classic"]);
    }

    #[tokio::test]
    async fn test_held_owner_lock_does_not_block_other_owners() {
        let store = Arc::new(InMemoryWatchlistStore::new());
        let locks = Arc::new(OwnerLocks::new());
        let engine = WatchStatusEngine::new(store.clone(), locks.clone());
        let busy = Uuid::new_v4();
        let idle = Uuid::new_v4();
        let movie = seed(&store, item(idle, movie_details(12, 100), t(2024, 3, 1, 0, 0, 0))).await;

        let _held = locks.acquire(busy).await;
        let updated = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            engine.apply_update(idle, movie.id, to(WatchStatus::Watched)),
        )
        .await
        .expect("other owner was blocked")
        .unwrap();

        assert_eq!(updated.status, WatchStatus::Watched);
        assert_eq!(store.statistics(idle).await.unwrap().total_watched, 1);
    }
}
