/// TMDB (The Movie Database) provider
///
/// API Flow:
/// 1. Movies: /movie/{id}?append_to_response=credits
/// 2. Shows:  /tv/{id}?append_to_response=credits
///
/// Both responses are normalised into [`MediaDetails`]; artwork paths are
/// turned into absolute URLs using the configured image base.
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Client as HttpClient, StatusCode};
use serde::de::DeserializeOwned;

use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{MediaDetails, MediaKind, TmdbMovie, TmdbShow, DEFAULT_EPISODE_RUNTIME},
    services::providers::MediaLookupService,
};

const MAX_CAST: usize = 10;

#[derive(Clone)]
pub struct TmdbProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    image_base_url: String,
    cache: Cache,
    cache_ttl: u64,
}

impl TmdbProvider {
    pub fn new(
        cache: Cache,
        api_key: String,
        api_url: String,
        image_base_url: String,
        timeout: Duration,
        cache_ttl: u64,
    ) -> AppResult<Self> {
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_key,
            api_url,
            image_base_url,
            cache,
            cache_ttl,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        media_id: i64,
        kind: MediaKind,
    ) -> AppResult<T> {
        let url = format!("{}/{}/{}", self.api_url, path, media_id);

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("append_to_response", "credits"),
            ])
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(AppError::NotFound(format!(
                    "No {} with id {} exists upstream",
                    kind, media_id
                )));
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                return Err(AppError::UpstreamUnavailable(format!(
                    "TMDB API returned status {}: {}",
                    status, body
                )));
            }
        }

        let response_text = response.text().await?;
        serde_json::from_str(&response_text).map_err(|e| {
            tracing::error!(
                error = %e,
                media_id = media_id,
                kind = %kind,
                "Failed to deserialize TMDB response"
            );
            AppError::UpstreamUnavailable(format!("Failed to parse TMDB response: {}", e))
        })
    }

    async fn fetch_from_api(&self, media_id: i64, kind: MediaKind) -> AppResult<MediaDetails> {
        let details = match kind {
            MediaKind::Movie => {
                let movie: TmdbMovie = self.get_json("movie", media_id, kind).await?;
                movie_details(movie, &self.image_base_url)
            }
            MediaKind::Show => {
                let show: TmdbShow = self.get_json("tv", media_id, kind).await?;
                show_details(show, &self.image_base_url)
            }
        };

        tracing::info!(
            media_id = media_id,
            kind = %kind,
            title = %details.title,
            provider = "tmdb",
            "Media details fetched"
        );

        Ok(details)
    }
}

fn image_url(base: &str, path: Option<String>) -> Option<String> {
    path.filter(|p| !p.is_empty())
        .map(|p| format!("{}{}", base.trim_end_matches('/'), p))
}

/// TMDB sends `""` for unknown dates
fn parse_date(raw: Option<String>) -> Option<NaiveDate> {
    raw.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}

fn movie_details(movie: TmdbMovie, image_base: &str) -> MediaDetails {
    MediaDetails {
        media_id: movie.id,
        kind: MediaKind::Movie,
        title: movie.title,
        overview: movie.overview.filter(|o| !o.is_empty()),
        poster_path: image_url(image_base, movie.poster_path),
        backdrop_path: image_url(image_base, movie.backdrop_path),
        release_date: parse_date(movie.release_date),
        genre_ids: movie.genres.into_iter().map(|g| g.id).collect(),
        rating: movie.vote_average,
        runtime: movie.runtime.filter(|r| *r > 0),
        season_count: None,
        episode_count: None,
        cast: movie
            .credits
            .cast
            .into_iter()
            .take(MAX_CAST)
            .map(|c| c.name)
            .collect(),
    }
}

fn show_details(show: TmdbShow, image_base: &str) -> MediaDetails {
    let runtime = show
        .episode_run_time
        .first()
        .copied()
        .filter(|r| *r > 0)
        .unwrap_or(DEFAULT_EPISODE_RUNTIME);

    MediaDetails {
        media_id: show.id,
        kind: MediaKind::Show,
        title: show.name,
        overview: show.overview.filter(|o| !o.is_empty()),
        poster_path: image_url(image_base, show.poster_path),
        backdrop_path: image_url(image_base, show.backdrop_path),
        release_date: parse_date(show.first_air_date),
        genre_ids: show.genres.into_iter().map(|g| g.id).collect(),
        rating: show.vote_average,
        runtime: Some(runtime),
        season_count: show.number_of_seasons,
        episode_count: show.number_of_episodes,
        cast: show
            .credits
            .cast
            .into_iter()
            .take(MAX_CAST)
            .map(|c| c.name)
            .collect(),
    }
}

#[async_trait::async_trait]
impl MediaLookupService for TmdbProvider {
    async fn fetch_details(&self, media_id: i64, kind: MediaKind) -> AppResult<MediaDetails> {
        cached!(
            self.cache,
            CacheKey::MediaDetails { kind, media_id },
            self.cache_ttl,
            async move { self.fetch_from_api(media_id, kind).await }
        )
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}
