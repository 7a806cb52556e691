mod locks;
pub mod providers;
pub mod statistics;
pub mod watch_status;
pub mod watchlist;

pub use locks::OwnerLocks;
pub use statistics::StatisticsAggregator;
pub use watch_status::WatchStatusEngine;
pub use watchlist::WatchlistService;

use uuid::Uuid;

use crate::{
    db::WatchlistStore,
    error::{AppError, AppResult},
    models::TrackedMediaItem,
};

/// Loads an item and checks that `owner_id` owns it.
///
/// Missing items are `NotFound`; items owned by someone else are `Forbidden`.
pub(crate) async fn load_owned(
    store: &dyn WatchlistStore,
    owner_id: Uuid,
    item_id: Uuid,
) -> AppResult<TrackedMediaItem> {
    let item = store
        .get_item(item_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Watchlist item {} not found", item_id)))?;

    if item.owner_id != owner_id {
        tracing::warn!(
            owner_id = %owner_id,
            item_id = %item_id,
            "Rejected access to another user's watchlist item"
        );
        return Err(AppError::Forbidden(format!(
            "item {} is not owned by {}",
            item_id, owner_id
        )));
    }

    Ok(item)
}
