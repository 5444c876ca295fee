mod ai;
mod api;
mod auth;
mod cache;
mod chat;
mod config;
mod database;
mod error;
mod financial;
mod models;
mod repository;
mod services;
mod utils;

use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    api::handlers,
    cache::Cache,
    config::AppConfig,
    database::Database,
    services::AppServices,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub database: Arc<Database>,
    pub cache: Option<Arc<Cache>>,
    pub services: Arc<AppServices>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "egx_chat_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(AppConfig::new()?);
    let database = Arc::new(Database::new(&config.database).await?);
    let cache = match &config.redis {
        Some(redis) => Some(Arc::new(Cache::new(redis).await?)),
        None => {
            tracing::info!("REDIS_URL not set, using in-process context store");
            None
        }
    };
    let services = Arc::new(AppServices::new(&config, &database, cache.clone()).await?);

    let app_state = AppState {
        config: config.clone(),
        database,
        cache,
        services,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(handlers::health_check))
        .route("/api/health", get(handlers::health_check))
        .route("/chat", post(handlers::chat))
        .route("/chat/intents", get(handlers::list_intents))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(app_state);

    let port = config.server.port;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    tracing::info!("Server starting on port {}", port);

    axum::serve(listener, app).await?;

    Ok(())
}
