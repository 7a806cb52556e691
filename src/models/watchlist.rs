use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};
use uuid::Uuid;

use super::{MediaDetails, MediaKind, DEFAULT_EPISODE_RUNTIME};

/// Where a tracked title sits in the user's viewing lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchStatus {
    #[default]
    Watchlist,
    Watching,
    Watched,
    Dropped,
}

impl WatchStatus {
    /// All statuses in lifecycle order
    pub const ALL: [WatchStatus; 4] = [
        WatchStatus::Watchlist,
        WatchStatus::Watching,
        WatchStatus::Watched,
        WatchStatus::Dropped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WatchStatus::Watchlist => "watchlist",
            WatchStatus::Watching => "watching",
            WatchStatus::Watched => "watched",
            WatchStatus::Dropped => "dropped",
        }
    }
}

impl Display for WatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WatchStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown watch status '{}'", s))
    }
}

/// Episode progress, only meaningful for shows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub current_episode: Option<i32>,
    pub current_season: Option<i32>,
    pub total_episodes: Option<i32>,
    pub total_seasons: Option<i32>,
}

/// One user's relationship to one movie or show
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedMediaItem {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub media_id: i64,
    pub media_kind: MediaKind,

    // Snapshot copied from the metadata lookup at creation time
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub genre_ids: Vec<i32>,
    pub rating: Option<f64>,
    pub runtime: Option<i32>,

    pub status: WatchStatus,
    pub user_rating: Option<i16>,
    pub user_review: Option<String>,
    pub is_favorite: bool,
    /// Free-form labels chosen by the owner
    #[serde(default)]
    pub tags: Vec<String>,
    pub progress: Option<Progress>,
    pub added_at: DateTime<Utc>,
    pub watched_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,

    /// Optimistic concurrency token, bumped by the store on every committed write
    #[serde(skip)]
    pub version: i64,
}

impl TrackedMediaItem {
    /// Builds a fresh `watchlist` item from a looked-up media record
    pub fn from_details(owner_id: Uuid, details: MediaDetails, now: DateTime<Utc>) -> Self {
        let progress = match details.kind {
            MediaKind::Show => Some(Progress {
                current_episode: Some(1),
                current_season: Some(1),
                total_episodes: details.episode_count,
                total_seasons: details.season_count,
            }),
            MediaKind::Movie => None,
        };

        Self {
            id: Uuid::new_v4(),
            owner_id,
            media_id: details.media_id,
            media_kind: details.kind,
            title: details.title,
            overview: details.overview,
            poster_path: details.poster_path,
            backdrop_path: details.backdrop_path,
            release_date: details.release_date,
            genre_ids: details.genre_ids,
            rating: details.rating,
            runtime: details.runtime,
            status: WatchStatus::Watchlist,
            user_rating: None,
            user_review: None,
            is_favorite: false,
            tags: Vec::new(),
            progress,
            added_at: now,
            watched_at: None,
            updated_at: now,
            version: 0,
        }
    }

    /// Minutes of viewing this item represents in its current state.
    ///
    /// Movies always count their runtime. Shows count only once watched, as
    /// `currentEpisode × runtime`, falling back to a 45 minute episode.
    pub fn watch_time(&self) -> i64 {
        Self::watch_time_for(self.media_kind, self.status, self.runtime, self.progress.as_ref())
    }

    /// Watch time the item contributes once it is in the `watched` state
    pub fn watch_time_as_watched(&self) -> i64 {
        Self::watch_time_for(
            self.media_kind,
            WatchStatus::Watched,
            self.runtime,
            self.progress.as_ref(),
        )
    }

    fn watch_time_for(
        kind: MediaKind,
        status: WatchStatus,
        runtime: Option<i32>,
        progress: Option<&Progress>,
    ) -> i64 {
        match (kind, status) {
            (MediaKind::Movie, _) => i64::from(runtime.unwrap_or(0)),
            (MediaKind::Show, WatchStatus::Watched) => {
                let episodes = progress.and_then(|p| p.current_episode).unwrap_or(0);
                let per_episode = runtime.unwrap_or(DEFAULT_EPISODE_RUNTIME);
                i64::from(episodes) * i64::from(per_episode)
            }
            (MediaKind::Show, _) => 0,
        }
    }

    /// Stored runtime as used by the rollups, missing runtimes count as zero
    pub fn runtime_minutes(&self) -> i64 {
        i64::from(self.runtime.unwrap_or(0))
    }
}
