mod config;
mod core;
mod models;
mod routes;
mod services;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::Settings;
use crate::core::MatchingOrchestrator;
use crate::routes::matches::AppState;
use crate::services::{RedisBus, RedisPool};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    // Initialize logging
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_level(true);

    if log_format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.init();
    }

    info!("Starting matchpool service...");

    // Load configuration
    let settings = Settings::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        panic!("Configuration error: {}", e);
    });

    info!("Configuration loaded successfully");

    // One client for the pub/sub listener; the pool and publisher use
    // connection managers of their own.
    let redis_client = redis::Client::open(settings.redis.url.as_str()).unwrap_or_else(|e| {
        error!("Invalid Redis URL: {}", e);
        panic!("Redis configuration error: {}", e);
    });

    let pool = RedisPool::new(&settings.redis.url).await.unwrap_or_else(|e| {
        error!("Failed to connect to Redis: {}", e);
        panic!("Redis connection error: {}", e);
    });

    info!("Pool store connected");

    let bus = RedisBus::new(&settings.redis.url).await.unwrap_or_else(|e| {
        error!("Failed to connect notification bus: {}", e);
        panic!("Redis connection error: {}", e);
    });

    info!("Notification bus connected");

    let orchestrator = Arc::new(MatchingOrchestrator::new(
        pool,
        bus,
        settings.matching.match_timeout(),
        settings.matching.acceptance_timeout(),
    ));

    info!(
        "Orchestrator initialized (match timeout: {}ms, acceptance timeout: {}ms)",
        settings.matching.match_request_ms, settings.matching.match_acceptance_ms
    );

    // Subscriber loop: this is how this instance, like every other one,
    // learns about pool state changes.
    let listener = Arc::clone(&orchestrator);
    tokio::spawn(async move {
        if let Err(e) = services::run_listener(redis_client, listener).await {
            error!("Notification listener stopped: {}", e);
        }
    });

    // Build application state
    let app_state = AppState { orchestrator };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
