use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};

use crate::{
    error::AppResult,
    middleware::AuthUser,
    models::{StatisticsReport, StatsQuery, UserStatistics},
    routes::AppState,
};

/// Handler for the statistics dashboard
pub async fn report(
    State(state): State<Arc<AppState>>,
    AuthUser(owner_id): AuthUser,
    Query(query): Query<StatsQuery>,
) -> AppResult<Json<StatisticsReport>> {
    let report = state.statistics.report(owner_id, &query).await?;
    Ok(Json(report))
}

/// Recomputes the caller's counters from their current items
pub async fn rebuild(
    State(state): State<Arc<AppState>>,
    AuthUser(owner_id): AuthUser,
) -> AppResult<Json<UserStatistics>> {
    let stats = state.engine.rebuild_statistics(owner_id).await?;
    Ok(Json(stats))
}
