use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{ListQuery, MediaKind, TrackedMediaItem, UserStatistics, WatchRecord},
};

/// Persistent collection of tracked items and per-user aggregates
///
/// Implementations must apply an item write and its accompanying
/// [`WatchRecord`] as one unit: either both land or neither does.
#[async_trait::async_trait]
pub trait WatchlistStore: Send + Sync {
    /// Inserts a new item, failing with `Duplicate` if the owner already
    /// tracks the same `(media_id, media_kind)`.
    ///
    /// When `watch` is given the owner's aggregate is updated in the same unit.
    async fn insert_item(
        &self,
        item: &TrackedMediaItem,
        watch: Option<&WatchRecord>,
    ) -> AppResult<TrackedMediaItem>;

    async fn get_item(&self, id: Uuid) -> AppResult<Option<TrackedMediaItem>>;

    async fn find_by_media(
        &self,
        owner_id: Uuid,
        media_id: i64,
        media_kind: MediaKind,
    ) -> AppResult<Option<TrackedMediaItem>>;

    /// One page of the owner's items plus the total number matching the filter
    async fn list_items(
        &self,
        owner_id: Uuid,
        query: &ListQuery,
    ) -> AppResult<(Vec<TrackedMediaItem>, usize)>;

    /// Every item the owner tracks, in no particular order
    async fn items_for_owner(&self, owner_id: Uuid) -> AppResult<Vec<TrackedMediaItem>>;

    /// Writes the mutable fields of `item` if its `version` still matches the
    /// stored one, returning the stored result with the bumped version.
    ///
    /// A version mismatch fails with `Consistency` and writes nothing.
    async fn commit_update(
        &self,
        item: &TrackedMediaItem,
        watch: Option<&WatchRecord>,
    ) -> AppResult<TrackedMediaItem>;

    /// Returns whether an item was removed. Aggregates are left untouched.
    async fn delete_item(&self, id: Uuid) -> AppResult<bool>;

    /// The owner's aggregate, all zeros if nothing was recorded yet
    async fn statistics(&self, owner_id: Uuid) -> AppResult<UserStatistics>;

    async fn replace_statistics(&self, owner_id: Uuid, stats: &UserStatistics) -> AppResult<()>;
}
