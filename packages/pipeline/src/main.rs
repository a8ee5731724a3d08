// Main entry point for the assessment pipeline

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pipeline_core::domains::documents::PostgresStateStore;
use pipeline_core::domains::teachers::PostgresQuotaLedger;
use pipeline_core::kernel::tasks::{
    AssessmentWorker, BatchCoordinator, PostgresTaskStore, TaskStore, WorkerConfig,
};
use pipeline_core::kernel::{DetectorClient, FsBlobStorage, PlainTextExtractor, ServiceHost};
use pipeline_core::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pipeline_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting assessment pipeline");

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    // Stores and collaborators
    let tasks = Arc::new(PostgresTaskStore::new(pool.clone(), config.max_attempts));
    let state = Arc::new(PostgresStateStore::new(pool.clone()));
    let quota = Arc::new(PostgresQuotaLedger::new(pool.clone(), config.plan_limits));
    let blobs = Arc::new(FsBlobStorage::new(config.blob_root.clone()));
    let extractor = Arc::new(PlainTextExtractor);
    let detector = Arc::new(
        DetectorClient::new(config.detector_url.clone(), config.ai_timeout)
            .context("Failed to build detector client")?,
    );

    let depth = tasks.pending_depth().await?;
    tracing::info!(depth, "task queue depth at startup");

    // Worker pool + coordinator under one host; the claim lease is the
    // only coordination the workers need.
    let mut host = ServiceHost::new();
    for index in 0..config.worker_count {
        let worker_config = WorkerConfig {
            poll_interval: config.poll_interval,
            lease_duration: config.lease_duration,
            backoff_base: config.backoff_base,
            backoff_cap: config.backoff_cap,
            worker_id: format!("worker-{}", index),
        };
        host = host.with_service(AssessmentWorker::new(
            tasks.clone(),
            state.clone(),
            quota.clone(),
            blobs.clone(),
            extractor.clone(),
            detector.clone(),
            worker_config,
        ));
    }
    host = host.with_service(BatchCoordinator::new(
        state.clone(),
        config.coordinator_interval,
    ));

    host.run_until_shutdown().await
}
