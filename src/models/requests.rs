use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

use super::{MediaKind, TrackedMediaItem, WatchStatus};

pub const MAX_REVIEW_CHARS: usize = 1000;
pub const MAX_PAGE_SIZE: usize = 100;
pub const MAX_PAGE: usize = 1000;
pub const MAX_TAGS: usize = 20;
pub const MAX_TAG_CHARS: usize = 50;

fn validate_rating(rating: Option<i16>) -> AppResult<()> {
    match rating {
        Some(r) if !(1..=10).contains(&r) => Err(AppError::Validation(format!(
            "userRating: must be between 1 and 10, got {}",
            r
        ))),
        _ => Ok(()),
    }
}

fn validate_review(review: Option<&str>) -> AppResult<()> {
    match review {
        Some(text) if text.chars().count() > MAX_REVIEW_CHARS => Err(AppError::Validation(
            format!("userReview: cannot be more than {} characters", MAX_REVIEW_CHARS),
        )),
        _ => Ok(()),
    }
}

fn validate_non_negative(field: &str, value: Option<i32>) -> AppResult<()> {
    match value {
        Some(v) if v < 0 => Err(AppError::Validation(format!(
            "{}: must not be negative, got {}",
            field, v
        ))),
        _ => Ok(()),
    }
}

fn validate_tags(tags: Option<&[String]>) -> AppResult<()> {
    let Some(tags) = tags else {
        return Ok(());
    };
    if tags.len() > MAX_TAGS {
        return Err(AppError::Validation(format!(
            "tags: at most {} allowed, got {}",
            MAX_TAGS,
            tags.len()
        )));
    }
    for tag in tags {
        let length = tag.trim().chars().count();
        if length == 0 || length > MAX_TAG_CHARS {
            return Err(AppError::Validation(format!(
                "tags: each tag must be 1 to {} characters",
                MAX_TAG_CHARS
            )));
        }
    }
    Ok(())
}

/// Trims tags and drops repeats, keeping first-seen order
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !normalized.iter().any(|existing| existing == tag) {
            normalized.push(tag.to_string());
        }
    }
    normalized
}

fn validate_limit(field: &str, value: usize) -> AppResult<()> {
    if value == 0 || value > MAX_PAGE_SIZE {
        return Err(AppError::Validation(format!(
            "{}: must be between 1 and {}, got {}",
            field, MAX_PAGE_SIZE, value
        )));
    }
    Ok(())
}

/// Request to start tracking a title.
///
/// Snapshot fields always come from the metadata lookup; only the fields
/// listed here may be supplied by the caller.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateItemRequest {
    pub media_id: i64,
    pub media_kind: MediaKind,
    pub initial_status: Option<WatchStatus>,
    pub user_rating: Option<i16>,
    pub user_review: Option<String>,
    pub is_favorite: Option<bool>,
    pub current_episode: Option<i32>,
    pub current_season: Option<i32>,
    pub tags: Option<Vec<String>>,
}

impl CreateItemRequest {
    pub fn new(media_id: i64, media_kind: MediaKind) -> Self {
        Self {
            media_id,
            media_kind,
            initial_status: None,
            user_rating: None,
            user_review: None,
            is_favorite: None,
            current_episode: None,
            current_season: None,
            tags: None,
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.media_id < 1 {
            return Err(AppError::Validation(format!(
                "mediaId: must be a positive integer, got {}",
                self.media_id
            )));
        }
        validate_rating(self.user_rating)?;
        validate_review(self.user_review.as_deref())?;
        validate_tags(self.tags.as_deref())?;
        validate_non_negative("currentEpisode", self.current_episode)?;
        validate_non_negative("currentSeason", self.current_season)?;
        if self.media_kind == MediaKind::Movie
            && (self.current_episode.is_some() || self.current_season.is_some())
        {
            return Err(AppError::Validation(
                "currentEpisode/currentSeason: only apply to shows".to_string(),
            ));
        }
        Ok(())
    }
}

/// Status change with optional rating and review
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    pub status: WatchStatus,
    pub user_rating: Option<i16>,
    pub user_review: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProgressUpdate {
    pub current_episode: Option<i32>,
    pub current_season: Option<i32>,
    pub total_episodes: Option<i32>,
    pub total_seasons: Option<i32>,
}

/// Partial update of the mutable tracking fields. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ItemUpdate {
    pub status: Option<WatchStatus>,
    pub user_rating: Option<i16>,
    pub user_review: Option<String>,
    pub is_favorite: Option<bool>,
    pub progress: Option<ProgressUpdate>,
    /// Replaces the whole tag list when present
    pub tags: Option<Vec<String>>,
}

impl ItemUpdate {
    pub fn validate(&self) -> AppResult<()> {
        validate_rating(self.user_rating)?;
        validate_review(self.user_review.as_deref())?;
        validate_tags(self.tags.as_deref())?;
        if let Some(progress) = &self.progress {
            validate_non_negative("progress.currentEpisode", progress.current_episode)?;
            validate_non_negative("progress.currentSeason", progress.current_season)?;
            validate_non_negative("progress.totalEpisodes", progress.total_episodes)?;
            validate_non_negative("progress.totalSeasons", progress.total_seasons)?;
        }
        Ok(())
    }
}

impl From<TransitionRequest> for ItemUpdate {
    fn from(request: TransitionRequest) -> Self {
        Self {
            status: Some(request.status),
            user_rating: request.user_rating,
            user_review: request.user_review,
            ..Default::default()
        }
    }
}

/// Ordering for watchlist listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum SortOrder {
    #[default]
    #[serde(rename = "-addedAt")]
    AddedDesc,
    #[serde(rename = "addedAt")]
    AddedAsc,
    #[serde(rename = "-updatedAt")]
    UpdatedDesc,
    #[serde(rename = "-watchedAt")]
    WatchedDesc,
    #[serde(rename = "title")]
    TitleAsc,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub status: Option<WatchStatus>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub limit: usize,
    #[serde(default)]
    pub sort: SortOrder,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            status: None,
            page: default_page(),
            limit: default_page_size(),
            sort: SortOrder::default(),
        }
    }
}

impl ListQuery {
    pub fn validate(&self) -> AppResult<()> {
        if self.page == 0 || self.page > MAX_PAGE {
            return Err(AppError::Validation(format!(
                "page: must be between 1 and {}, got {}",
                MAX_PAGE, self.page
            )));
        }
        validate_limit("limit", self.limit)
    }

    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1)).saturating_mul(self.limit)
    }
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    20
}

fn default_report_limit() -> usize {
    10
}

fn default_max_years() -> usize {
    5
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    /// Calendar year for the monthly rollup, defaults to the current UTC year
    pub year: Option<i32>,
    #[serde(default = "default_report_limit")]
    pub genre_limit: usize,
    #[serde(default = "default_report_limit")]
    pub activity_limit: usize,
    #[serde(default = "default_max_years")]
    pub max_years: usize,
}

impl Default for StatsQuery {
    fn default() -> Self {
        Self {
            year: None,
            genre_limit: default_report_limit(),
            activity_limit: default_report_limit(),
            max_years: default_max_years(),
        }
    }
}

impl StatsQuery {
    pub fn validate(&self) -> AppResult<()> {
        validate_limit("genreLimit", self.genre_limit)?;
        validate_limit("activityLimit", self.activity_limit)?;
        validate_limit("maxYears", self.max_years)?;
        if let Some(year) = self.year {
            if !(1800..=9999).contains(&year) {
                return Err(AppError::Validation(format!(
                    "year: out of range, got {}",
                    year
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub current: usize,
    pub pages: usize,
    pub total: usize,
}

/// A page of results plus where it sits in the full listing
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, query: &ListQuery, total: usize) -> Self {
        Self {
            items,
            pagination: Pagination {
                current: query.page,
                pages: total.div_ceil(query.limit.max(1)),
                total,
            },
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

/// Item payload as returned to clients, with the derived watch time
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResponse {
    #[serde(flatten)]
    pub item: TrackedMediaItem,
    pub watch_time: i64,
}

impl From<TrackedMediaItem> for ItemResponse {
    fn from(item: TrackedMediaItem) -> Self {
        let watch_time = item.watch_time();
        Self { item, watch_time }
    }
}
