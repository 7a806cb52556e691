use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::{
    db::WatchlistStore,
    error::{AppError, AppResult},
    models::{
        ListQuery, MediaKind, Progress, SortOrder, TrackedMediaItem, UserStatistics, WatchRecord,
    },
};

#[derive(Debug, FromRow)]
struct ItemRow {
    id: Uuid,
    owner_id: Uuid,
    media_id: i64,
    media_kind: String,
    title: String,
    overview: Option<String>,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    release_date: Option<NaiveDate>,
    genre_ids: Vec<i32>,
    rating: Option<f64>,
    runtime: Option<i32>,
    status: String,
    user_rating: Option<i16>,
    user_review: Option<String>,
    is_favorite: bool,
    tags: Vec<String>,
    current_episode: Option<i32>,
    current_season: Option<i32>,
    total_episodes: Option<i32>,
    total_seasons: Option<i32>,
    added_at: DateTime<Utc>,
    watched_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<ItemRow> for TrackedMediaItem {
    type Error = AppError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let media_kind: MediaKind = row.media_kind.parse().map_err(AppError::Internal)?;
        let status = row.status.parse().map_err(AppError::Internal)?;

        let has_progress = row.current_episode.is_some()
            || row.current_season.is_some()
            || row.total_episodes.is_some()
            || row.total_seasons.is_some();
        let progress = (media_kind == MediaKind::Show || has_progress).then(|| Progress {
            current_episode: row.current_episode,
            current_season: row.current_season,
            total_episodes: row.total_episodes,
            total_seasons: row.total_seasons,
        });

        Ok(TrackedMediaItem {
            id: row.id,
            owner_id: row.owner_id,
            media_id: row.media_id,
            media_kind,
            title: row.title,
            overview: row.overview,
            poster_path: row.poster_path,
            backdrop_path: row.backdrop_path,
            release_date: row.release_date,
            genre_ids: row.genre_ids,
            rating: row.rating,
            runtime: row.runtime,
            status,
            user_rating: row.user_rating,
            user_review: row.user_review,
            is_favorite: row.is_favorite,
            tags: row.tags,
            progress,
            added_at: row.added_at,
            watched_at: row.watched_at,
            updated_at: row.updated_at,
            version: row.version,
        })
    }
}

#[derive(Debug, FromRow)]
struct StatisticsRow {
    total_watched: i64,
    total_watch_time_minutes: i64,
    movies_watched: i64,
    shows_watched: i64,
    current_streak: i64,
    longest_streak: i64,
    last_watched_on: Option<NaiveDate>,
}

impl From<StatisticsRow> for UserStatistics {
    fn from(row: StatisticsRow) -> Self {
        Self {
            total_watched: row.total_watched,
            total_watch_time_minutes: row.total_watch_time_minutes,
            movies_watched: row.movies_watched,
            shows_watched: row.shows_watched,
            current_streak: row.current_streak,
            longest_streak: row.longest_streak,
            last_watched_on: row.last_watched_on,
        }
    }
}

fn order_clause(order: SortOrder) -> &'static str {
    match order {
        SortOrder::AddedDesc => "added_at DESC, id",
        SortOrder::AddedAsc => "added_at ASC, id",
        SortOrder::UpdatedDesc => "updated_at DESC, id",
        SortOrder::WatchedDesc => "watched_at DESC NULLS LAST, id",
        SortOrder::TitleAsc => "title ASC, id",
    }
}

fn map_insert_error(err: sqlx::Error, item: &TrackedMediaItem) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => AppError::Duplicate(
            format!("{} {} is already tracked", item.media_kind, item.media_id),
        ),
        _ => AppError::Database(err),
    }
}

/// PostgreSQL-backed store.
///
/// Uniqueness of `(owner_id, media_id, media_kind)` is a table constraint.
/// Item writes that carry a [`WatchRecord`] run in one transaction with the
/// aggregate update; the aggregate row is locked `FOR UPDATE` while it is
/// recomputed.
#[derive(Clone)]
pub struct PostgresWatchlistStore {
    pool: PgPool,
}

impl PostgresWatchlistStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn apply_watch(
        tx: &mut Transaction<'_, Postgres>,
        owner_id: Uuid,
        watch: &WatchRecord,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_statistics (owner_id)
            VALUES ($1)
            ON CONFLICT (owner_id) DO NOTHING
            "#,
        )
        .bind(owner_id)
        .execute(&mut **tx)
        .await?;

        let row: StatisticsRow = sqlx::query_as(
            r#"
            SELECT total_watched, total_watch_time_minutes, movies_watched, shows_watched,
                   current_streak, longest_streak, last_watched_on
            FROM user_statistics
            WHERE owner_id = $1
            FOR UPDATE
            "#,
        )
        .bind(owner_id)
        .fetch_one(&mut **tx)
        .await?;

        let mut stats = UserStatistics::from(row);
        stats.record_watch(watch);

        Self::write_statistics(&mut **tx, owner_id, &stats).await
    }

    async fn write_statistics<'e, E>(
        executor: E,
        owner_id: Uuid,
        stats: &UserStatistics,
    ) -> AppResult<()>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO user_statistics (
                owner_id, total_watched, total_watch_time_minutes, movies_watched,
                shows_watched, current_streak, longest_streak, last_watched_on
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (owner_id) DO UPDATE SET
                total_watched = EXCLUDED.total_watched,
                total_watch_time_minutes = EXCLUDED.total_watch_time_minutes,
                movies_watched = EXCLUDED.movies_watched,
                shows_watched = EXCLUDED.shows_watched,
                current_streak = EXCLUDED.current_streak,
                longest_streak = EXCLUDED.longest_streak,
                last_watched_on = EXCLUDED.last_watched_on
            "#,
        )
        .bind(owner_id)
        .bind(stats.total_watched)
        .bind(stats.total_watch_time_minutes)
        .bind(stats.movies_watched)
        .bind(stats.shows_watched)
        .bind(stats.current_streak)
        .bind(stats.longest_streak)
        .bind(stats.last_watched_on)
        .execute(executor)
        .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl WatchlistStore for PostgresWatchlistStore {
    async fn insert_item(
        &self,
        item: &TrackedMediaItem,
        watch: Option<&WatchRecord>,
    ) -> AppResult<TrackedMediaItem> {
        let progress = item.progress.clone().unwrap_or_default();
        let mut tx = self.pool.begin().await?;

        let row: ItemRow = sqlx::query_as(
            r#"
            INSERT INTO watchlist_items (
                id, owner_id, media_id, media_kind, title, overview, poster_path,
                backdrop_path, release_date, genre_ids, rating, runtime, status,
                user_rating, user_review, is_favorite, tags, current_episode, current_season,
                total_episodes, total_seasons, added_at, watched_at, updated_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20, $21, $22, $23, $24, 1)
            RETURNING *
            "#,
        )
        .bind(item.id)
        .bind(item.owner_id)
        .bind(item.media_id)
        .bind(item.media_kind.as_str())
        .bind(&item.title)
        .bind(&item.overview)
        .bind(&item.poster_path)
        .bind(&item.backdrop_path)
        .bind(item.release_date)
        .bind(&item.genre_ids)
        .bind(item.rating)
        .bind(item.runtime)
        .bind(item.status.as_str())
        .bind(item.user_rating)
        .bind(&item.user_review)
        .bind(item.is_favorite)
        .bind(&item.tags)
        .bind(progress.current_episode)
        .bind(progress.current_season)
        .bind(progress.total_episodes)
        .bind(progress.total_seasons)
        .bind(item.added_at)
        .bind(item.watched_at)
        .bind(item.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_insert_error(e, item))?;

        if let Some(watch) = watch {
            Self::apply_watch(&mut tx, item.owner_id, watch).await?;
        }

        tx.commit().await?;

        TrackedMediaItem::try_from(row)
    }

    async fn get_item(&self, id: Uuid) -> AppResult<Option<TrackedMediaItem>> {
        let row: Option<ItemRow> = sqlx::query_as("SELECT * FROM watchlist_items WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TrackedMediaItem::try_from).transpose()
    }

    async fn find_by_media(
        &self,
        owner_id: Uuid,
        media_id: i64,
        media_kind: MediaKind,
    ) -> AppResult<Option<TrackedMediaItem>> {
        let row: Option<ItemRow> = sqlx::query_as(
            r#"
            SELECT * FROM watchlist_items
            WHERE owner_id = $1 AND media_id = $2 AND media_kind = $3
            "#,
        )
        .bind(owner_id)
        .bind(media_id)
        .bind(media_kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TrackedMediaItem::try_from).transpose()
    }

    async fn list_items(
        &self,
        owner_id: Uuid,
        query: &ListQuery,
    ) -> AppResult<(Vec<TrackedMediaItem>, usize)> {
        let status = query.status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM watchlist_items
            WHERE owner_id = $1 AND ($2::TEXT IS NULL OR status = $2)
            "#,
        )
        .bind(owner_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let mut builder =
            QueryBuilder::<Postgres>::new("SELECT * FROM watchlist_items WHERE owner_id = ");
        builder.push_bind(owner_id);
        if let Some(status) = status {
            builder.push(" AND status = ").push_bind(status);
        }
        builder
            .push(" ORDER BY ")
            .push(order_clause(query.sort))
            .push(" LIMIT ")
            .push_bind(query.limit as i64)
            .push(" OFFSET ")
            .push_bind(query.offset() as i64);

        let rows: Vec<ItemRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        let items = rows
            .into_iter()
            .map(TrackedMediaItem::try_from)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((items, total.max(0) as usize))
    }

    async fn items_for_owner(&self, owner_id: Uuid) -> AppResult<Vec<TrackedMediaItem>> {
        let rows: Vec<ItemRow> =
            sqlx::query_as("SELECT * FROM watchlist_items WHERE owner_id = $1")
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(TrackedMediaItem::try_from).collect()
    }

    async fn commit_update(
        &self,
        item: &TrackedMediaItem,
        watch: Option<&WatchRecord>,
    ) -> AppResult<TrackedMediaItem> {
        let progress = item.progress.clone().unwrap_or_default();
        let mut tx = self.pool.begin().await?;

        let row: Option<ItemRow> = sqlx::query_as(
            r#"
            UPDATE watchlist_items SET
                status = $3,
                user_rating = $4,
                user_review = $5,
                is_favorite = $6,
                tags = $7,
                current_episode = $8,
                current_season = $9,
                total_episodes = $10,
                total_seasons = $11,
                watched_at = $12,
                updated_at = $13,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING *
            "#,
        )
        .bind(item.id)
        .bind(item.version)
        .bind(item.status.as_str())
        .bind(item.user_rating)
        .bind(&item.user_review)
        .bind(item.is_favorite)
        .bind(&item.tags)
        .bind(progress.current_episode)
        .bind(progress.current_season)
        .bind(progress.total_episodes)
        .bind(progress.total_seasons)
        .bind(item.watched_at)
        .bind(item.updated_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM watchlist_items WHERE id = $1)")
                    .bind(item.id)
                    .fetch_one(&mut *tx)
                    .await?;
            tx.rollback().await?;

            return Err(if exists {
                AppError::Consistency(format!(
                    "Watchlist item {} was modified concurrently",
                    item.id
                ))
            } else {
                AppError::NotFound(format!("Watchlist item {} not found", item.id))
            });
        };

        if let Some(watch) = watch {
            Self::apply_watch(&mut tx, item.owner_id, watch).await?;
        }

        tx.commit().await?;

        TrackedMediaItem::try_from(row)
    }

    async fn delete_item(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM watchlist_items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn statistics(&self, owner_id: Uuid) -> AppResult<UserStatistics> {
        let row: Option<StatisticsRow> = sqlx::query_as(
            r#"
            SELECT total_watched, total_watch_time_minutes, movies_watched, shows_watched,
                   current_streak, longest_streak, last_watched_on
            FROM user_statistics
            WHERE owner_id = $1
            "#,
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserStatistics::from).unwrap_or_default())
    }

    async fn replace_statistics(&self, owner_id: Uuid, stats: &UserStatistics) -> AppResult<()> {
        Self::write_statistics(&self.pool, owner_id, stats).await
    }
}
