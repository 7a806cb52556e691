use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

/// Runtime assumed for a show episode when upstream does not report one
pub const DEFAULT_EPISODE_RUNTIME: i32 = 45;

/// Distinguishes runtime and progress semantics of a tracked title
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    #[serde(alias = "tv")]
    Show,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Show => "show",
        }
    }
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(MediaKind::Movie),
            "show" | "tv" => Ok(MediaKind::Show),
            other => Err(format!("unknown media kind '{}'", other)),
        }
    }
}

/// Canonical media record returned by a [`MediaLookupService`](crate::services::providers::MediaLookupService)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDetails {
    pub media_id: i64,
    pub kind: MediaKind,
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub genre_ids: Vec<i32>,
    pub rating: Option<f64>,
    /// Minutes; per episode for shows
    pub runtime: Option<i32>,
    pub season_count: Option<i32>,
    pub episode_count: Option<i32>,
    pub cast: Vec<String>,
}

// ============================================================================
// TMDB API Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TmdbGenre {
    pub id: i32,
}

#[derive(Debug, Deserialize)]
pub struct TmdbCastMember {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TmdbCredits {
    #[serde(default)]
    pub cast: Vec<TmdbCastMember>,
}

/// Raw `/movie/{id}` response
#[derive(Debug, Deserialize)]
pub struct TmdbMovie {
    pub id: i64,
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<String>,
    #[serde(default)]
    pub genres: Vec<TmdbGenre>,
    pub vote_average: Option<f64>,
    pub runtime: Option<i32>,
    #[serde(default)]
    pub credits: TmdbCredits,
}

/// Raw `/tv/{id}` response
#[derive(Debug, Deserialize)]
pub struct TmdbShow {
    pub id: i64,
    pub name: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub genres: Vec<TmdbGenre>,
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub episode_run_time: Vec<i32>,
    pub number_of_seasons: Option<i32>,
    pub number_of_episodes: Option<i32>,
    #[serde(default)]
    pub credits: TmdbCredits,
}
