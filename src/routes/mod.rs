use std::sync::Arc;

use axum::{
    http::{HeaderValue, Method, StatusCode},
    middleware,
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    db::WatchlistStore,
    middleware::{make_span_with_request_id, request_id_middleware, CredentialService},
    services::{
        providers::MediaLookupService, OwnerLocks, StatisticsAggregator, WatchStatusEngine,
        WatchlistService,
    },
};

pub mod stats;
pub mod watchlist;

/// Shared handles for every request handler
pub struct AppState {
    pub watchlist: WatchlistService,
    pub engine: WatchStatusEngine,
    pub statistics: StatisticsAggregator,
    pub credentials: Arc<dyn CredentialService>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn WatchlistStore>,
        lookup: Arc<dyn MediaLookupService>,
        credentials: Arc<dyn CredentialService>,
    ) -> Self {
        let owner_locks = Arc::new(OwnerLocks::new());
        Self {
            watchlist: WatchlistService::new(store.clone(), lookup, owner_locks.clone()),
            engine: WatchStatusEngine::new(store.clone(), owner_locks),
            statistics: StatisticsAggregator::new(store),
            credentials,
        }
    }
}

/// Creates the application router with all routes.
///
/// An empty `cors_origins` list allows any origin.
pub fn create_router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(cors_layer(cors_origins))
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id)),
        )
}

/// API routes under /api/v1
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/watchlist", get(watchlist::list).post(watchlist::create))
        .route("/watchlist/stats", get(stats::report))
        .route("/watchlist/stats/rebuild", post(stats::rebuild))
        .route(
            "/watchlist/:id",
            get(watchlist::get)
                .put(watchlist::update)
                .delete(watchlist::delete),
        )
        .route("/watchlist/:id/status", patch(watchlist::transition))
        .route("/watchlist/:id/favorite", patch(watchlist::toggle_favorite))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(Any);

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    }
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
