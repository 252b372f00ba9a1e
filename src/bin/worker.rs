use depot_vision::{
    config::AppConfig,
    db,
    services::{
        cache::RedisResultCache,
        detector::HttpDetector,
        orchestrator::{Orchestrator, TaskOutcome},
        queue::TaskQueue,
        store::{PgResultBackend, ResultStore},
        task_store::PgTaskStore,
    },
};
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL_MS: u64 = 1000; // 1 second

type WorkerOrchestrator =
    Orchestrator<PgTaskStore, PgResultBackend, RedisResultCache, HttpDetector>;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting depot-vision worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Initialize services
    tracing::info!("Initializing services");
    let queue = TaskQueue::new(&config.redis_url).expect("Failed to initialize task queue");

    let cache = RedisResultCache::new(
        &config.redis_url,
        Duration::from_secs(config.result_cache_ttl_secs),
    )
    .expect("Failed to initialize result cache");
    let store = ResultStore::new(PgResultBackend::new(db_pool.clone()), cache);

    let detector = HttpDetector::new(
        config.detector_url.clone(),
        config.detector_api_token.clone(),
    );

    let orchestrator = Orchestrator::new(
        PgTaskStore::new(db_pool),
        store,
        detector,
        config.pipeline(),
    );

    tracing::info!("Worker ready, starting scan processing loop");

    // Main processing loop
    loop {
        match process_next_scan(&queue, &orchestrator).await {
            Ok(true) => {
                // Claim processed, check for the next one immediately
                tracing::debug!("Scan processed, checking for next claim");
            }
            Ok(false) => {
                // No claim available, sleep before next poll
                tracing::trace!("No scans queued, sleeping");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error processing scan, will retry polling");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
        }
    }
}

/// Process the next claim from the queue.
/// Returns Ok(true) if a claim was handled, Ok(false) if the queue is empty.
async fn process_next_scan(
    queue: &TaskQueue,
    orchestrator: &WorkerOrchestrator,
) -> Result<bool, Box<dyn std::error::Error>> {
    let claim = match queue.dequeue().await? {
        Some(c) => c,
        None => return Ok(false),
    };

    tracing::info!(
        task_id = %claim.task_id,
        image_ref = %claim.image_ref,
        "Processing scan task"
    );

    match orchestrator.process(claim.task_id, &claim.image_ref).await {
        Ok(TaskOutcome::Completed(result)) => {
            tracing::info!(
                task_id = %claim.task_id,
                qr_codes = result.qr_codes.len(),
                objects = result.detected_objects.len(),
                "Scan task completed"
            );
        }
        Ok(TaskOutcome::Failed(message)) => {
            tracing::warn!(task_id = %claim.task_id, error = %message, "Scan task failed");
        }
        Ok(TaskOutcome::AlreadyTerminal { status, .. }) => {
            tracing::info!(
                task_id = %claim.task_id,
                status = ?status,
                "Duplicate claim for terminal task, nothing to do"
            );
        }
        Ok(TaskOutcome::InFlight) => {
            tracing::warn!(task_id = %claim.task_id, "Task claimed elsewhere, skipping");
        }
        Err(e) => {
            // Infrastructure error: leave the claim un-acked so the
            // processing list retains it for external requeue policy.
            tracing::error!(task_id = %claim.task_id, error = %e, "Task processing error");
            return Err(e.into());
        }
    }

    // Acknowledge the claim
    queue.complete(&claim).await?;

    Ok(true)
}
