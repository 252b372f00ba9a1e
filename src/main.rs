mod app_state;
mod config;
mod db;
mod models;
mod routes;
mod services;
mod vision;

use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;
use services::cache::RedisResultCache;
use services::queue::TaskQueue;
use services::store::{PgResultBackend, ResultStore};
use services::task_store::PgTaskStore;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing depot-vision server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!("scan_tasks_submitted", "Total scan tasks submitted");
    metrics::describe_counter!("scan_tasks_completed", "Total scan tasks completed");
    metrics::describe_counter!("scan_tasks_failed", "Total scan tasks that failed");
    metrics::describe_histogram!(
        "scan_processing_seconds",
        "Time to process one scan task end to end"
    );
    metrics::describe_gauge!(
        "scan_queue_depth",
        "Current number of pending claims in the queue"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize Redis task queue
    tracing::info!("Connecting to Redis task queue");
    let queue = TaskQueue::new(&config.redis_url).expect("Failed to initialize task queue");

    // Initialize the two-tier result store
    let cache = RedisResultCache::new(
        &config.redis_url,
        Duration::from_secs(config.result_cache_ttl_secs),
    )
    .expect("Failed to initialize result cache");
    let store = ResultStore::new(PgResultBackend::new(db_pool.clone()), cache);

    let tasks = PgTaskStore::new(db_pool.clone());

    // Ensure the uploads directory exists
    let uploads_dir = PathBuf::from(&config.uploads_dir);
    tokio::fs::create_dir_all(&uploads_dir)
        .await
        .expect("Failed to create uploads directory");

    // Create shared application state
    let state = AppState::new(db_pool, tasks, store, queue, uploads_dir);

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/images/upload", post(routes::scan::upload_image))
        .route(
            "/api/v1/results/{task_id}",
            get(routes::scan::get_task_result),
        )
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(10 * 1024 * 1024)); // 10 MB limit

    tracing::info!("Starting depot-vision on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
