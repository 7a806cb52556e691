/// Media metadata provider abstraction
///
/// A provider resolves a media identifier to the canonical record that gets
/// snapshotted into a tracked item. It is consulted once, when an item is
/// created; reads never go back to it.
use crate::{
    error::AppResult,
    models::{MediaDetails, MediaKind},
};

pub mod tmdb;

pub use tmdb::TmdbProvider;

/// Trait for media metadata providers
///
/// Failures must distinguish an unknown identifier (`AppError::NotFound`)
/// from a provider that cannot currently answer
/// (`AppError::UpstreamUnavailable`). No retries happen at this layer.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MediaLookupService: Send + Sync {
    /// Fetch the canonical record for one movie or show
    async fn fetch_details(&self, media_id: i64, kind: MediaKind) -> AppResult<MediaDetails>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}
