use std::{sync::Arc, time::Duration};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use watchlog_api::{
    config::{Config, StoreBackend},
    db::{
        create_pool, create_redis_client, run_migrations, Cache, InMemoryWatchlistStore,
        PostgresWatchlistStore, WatchlistStore,
    },
    middleware::JwtCredentials,
    routes::{create_router, AppState},
    services::providers::TmdbProvider,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "watchlog_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn WatchlistStore> = match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, data is lost on restart");
            Arc::new(InMemoryWatchlistStore::new())
        }
        StoreBackend::Postgres => {
            let pool = create_pool(&config.database_url, config.database_max_connections).await?;
            run_migrations(&pool).await?;
            Arc::new(PostgresWatchlistStore::new(pool))
        }
    };

    let redis_client = create_redis_client(&config.redis_url)?;
    let (cache, cache_writer) = Cache::new(redis_client).await;

    let lookup = TmdbProvider::new(
        cache,
        config.tmdb_api_key.clone(),
        config.tmdb_api_url.clone(),
        config.tmdb_image_base_url.clone(),
        Duration::from_secs(config.lookup_timeout_secs),
        config.media_cache_ttl_secs,
    )?;
    let credentials = JwtCredentials::new(&config.jwt_secret);

    let state = Arc::new(AppState::new(store, Arc::new(lookup), Arc::new(credentials)));
    let app = create_router(state, &config.cors_origins);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        address = %address,
        backend = ?config.store_backend,
        "Server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cache_writer.shutdown().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
