mod api;
mod config;
mod error;
mod models;
mod services;

use crate::api::middleware::{RateLimiter, RedisHitCounter};
use crate::api::AppState;
use crate::config::Config;
use crate::services::{
    CatalogClient, CredentialManager, IntervalPacer, LyricsResolver, PgStore,
    PrimaryLyricsClient, SecondaryLyricsClient,
};
use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,lyrics_gateway=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded (dev mode: {})", config.dev_mode);

    let db = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await?;
    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations").run(&db).await?;
    tracing::info!("Database migrations completed");

    let redis_client = redis::Client::open(config.redis_url.as_str())?;
    let redis = redis::aio::ConnectionManager::new(redis_client).await?;
    tracing::info!("Connected to Redis");

    // Initialize services
    let store = Arc::new(PgStore::new(db.clone()));
    let credentials = Arc::new(CredentialManager::new(&config, store.clone()));
    let secondary = SecondaryLyricsClient::new(
        config.secondary_lyrics_url.clone(),
        credentials.clone(),
    )?;

    let resolver = Arc::new(LyricsResolver::new(
        store,
        Arc::new(CatalogClient::new(config.catalog_api_url.clone())),
        credentials,
        Arc::new(PrimaryLyricsClient::new(config.primary_lyrics_url.clone())),
        Arc::new(secondary),
        Arc::new(IntervalPacer(config.pacing)),
    ));

    let app_state = Arc::new(AppState {
        resolver,
        limiter: Arc::new(RateLimiter::new(
            &config,
            Arc::new(RedisHitCounter::new(redis)),
        )),
        dev_mode: config.dev_mode,
    });

    let app = Router::new()
        .route("/health", get(health))
        .merge(api::lyrics_routes().with_state(app_state))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer(&config.cors_origins));

    let addr = format!("{}:{}", config.server_host, config.server_port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(origin) => Some(origin),
                Err(_) => {
                    tracing::warn!("Ignoring invalid CORS origin: {}", o);
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}
