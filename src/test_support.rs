//! Fixtures shared by unit tests across modules.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::models::{MediaDetails, MediaKind, TrackedMediaItem};

pub fn t(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, min, sec).unwrap()
}

pub fn movie_details(media_id: i64, runtime: i32) -> MediaDetails {
    MediaDetails {
        media_id,
        kind: MediaKind::Movie,
        title: format!("Movie {}", media_id),
        overview: Some("An overview".to_string()),
        poster_path: Some("https://image.tmdb.org/t/p/w500/poster.jpg".to_string()),
        backdrop_path: None,
        release_date: None,
        genre_ids: vec![],
        rating: Some(7.1),
        runtime: Some(runtime),
        season_count: None,
        episode_count: None,
        cast: vec![],
    }
}

pub fn show_details(media_id: i64, runtime: Option<i32>) -> MediaDetails {
    MediaDetails {
        media_id,
        kind: MediaKind::Show,
        title: format!("Show {}", media_id),
        overview: None,
        poster_path: None,
        backdrop_path: None,
        release_date: None,
        genre_ids: vec![],
        rating: Some(8.4),
        runtime,
        season_count: Some(3),
        episode_count: Some(30),
        cast: vec![],
    }
}

pub fn item(owner_id: Uuid, details: MediaDetails, added_at: DateTime<Utc>) -> TrackedMediaItem {
    TrackedMediaItem::from_details(owner_id, details, added_at)
}
