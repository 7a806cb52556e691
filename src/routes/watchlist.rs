use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    middleware::{AuthUser, RequestId},
    models::{CreateItemRequest, ItemResponse, ItemUpdate, ListQuery, Page, TransitionRequest},
    routes::AppState,
};

pub async fn create(
    State(state): State<Arc<AppState>>,
    AuthUser(owner_id): AuthUser,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<CreateItemRequest>,
) -> AppResult<(StatusCode, Json<ItemResponse>)> {
    tracing::debug!(
        request_id = %request_id,
        media_id = request.media_id,
        kind = %request.media_kind,
        "Create watchlist item"
    );
    let item = state.watchlist.create(owner_id, request).await?;
    Ok((StatusCode::CREATED, Json(item.into())))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    AuthUser(owner_id): AuthUser,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Page<ItemResponse>>> {
    let page = state.watchlist.list(owner_id, &query).await?;
    Ok(Json(page))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    AuthUser(owner_id): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ItemResponse>> {
    let item = state.watchlist.get(owner_id, id).await?;
    Ok(Json(item.into()))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    AuthUser(owner_id): AuthUser,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
    Json(update): Json<ItemUpdate>,
) -> AppResult<Json<ItemResponse>> {
    tracing::debug!(request_id = %request_id, item_id = %id, "Update watchlist item");
    let item = state.engine.apply_update(owner_id, id, update).await?;
    Ok(Json(item.into()))
}

pub async fn transition(
    State(state): State<Arc<AppState>>,
    AuthUser(owner_id): AuthUser,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> AppResult<Json<ItemResponse>> {
    tracing::debug!(
        request_id = %request_id,
        item_id = %id,
        status = %request.status,
        "Transition watchlist item"
    );
    let item = state.engine.transition(owner_id, id, request).await?;
    Ok(Json(item.into()))
}

pub async fn toggle_favorite(
    State(state): State<Arc<AppState>>,
    AuthUser(owner_id): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ItemResponse>> {
    let item = state.engine.toggle_favorite(owner_id, id).await?;
    Ok(Json(item.into()))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    AuthUser(owner_id): AuthUser,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    tracing::debug!(request_id = %request_id, item_id = %id, "Delete watchlist item");
    state.watchlist.delete(owner_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
