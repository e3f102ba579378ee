use anyhow::{Context, Result};
use db_pool::{create_pool as create_pg_pool, DbConfig as DbPoolConfig};
use metrics_service::config::Config;
use metrics_service::jobs::{MetricsUpdateJob, RunOutcome};
use metrics_service::services::ClickHouseActivitySource;
use redis_lock::LockManager;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,metrics_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting metrics-service");

    let config = Config::from_env();

    // Initialize database (standardized pool)
    let db_cfg = DbPoolConfig::for_service(&config.service.service_name);
    db_cfg.log_config();

    let db_pool = create_pg_pool(db_cfg)
        .await
        .context("Failed to create database pool")?;

    tracing::info!("Database pool created successfully");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations completed successfully");

    let source = Arc::new(ClickHouseActivitySource::from_config(&config.clickhouse));
    let lock = LockManager::from_url(&config.redis.url)
        .context("Failed to create Redis lock manager")?;

    let job = MetricsUpdateJob::new(source, db_pool, lock, config.job.clone());

    tracing::info!(
        interval_secs = config.job.interval_secs,
        lock_ttl_secs = config.job.lock_ttl_secs,
        "Entering metrics update loop"
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(config.job.interval_secs));
    // A run may outlast the trigger period; do not pile up missed ticks
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match job.run_once().await {
            // The job logs its own completion summary
            Ok(RunOutcome::Completed(_)) | Ok(RunOutcome::Skipped) => {}
            Err(e) => {
                // Cursor untouched; the next tick retries the same interval
                tracing::error!(error = %e, "Metrics update run aborted");
            }
        }
    }
}
