//! Periodic metrics reconciliation job.
//!
//! One run: acquire the distributed lock, read the cursor, discover what new
//! activity touched, recompute per-version metrics for the affected ids,
//! roll them up to model level, advance the cursor, rebuild the rank tables,
//! release the lock.
//!
//! Every write is an idempotent overwrite derived from the canonical event
//! store, so a run that overlaps a stuck predecessor (lock expiry) or
//! retries after a partial failure converges to the same state.

use crate::aggregation;
use crate::config::JobConfig;
use crate::error::{MetricsError, Result};
use crate::models::ActivityKind;
use crate::repository::{
    CatalogRepository, CursorStore, ModelMetricsRepository, RankMaterializer,
    VersionMetricsRepository, MODEL_RANK, MODEL_VERSION_RANK,
};
use crate::services::ActivitySource;
use chrono::{DateTime, Duration, Utc};
use redis_lock::LockManager;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// key_value key holding the instant of the last successful run
pub const METRICS_CURSOR_KEY: &str = "last-metrics-update-models";

const LOCK_NAME: &str = "update-metrics-models";

/// How a run covers the activity backlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStrategy {
    /// Discovery from the raw cursor
    Incremental(DateTime<Utc>),
    /// First run after a day boundary: discovery from a widened lookback so
    /// every rolling window that shifted across midnight is recomputed
    FullRefresh(DateTime<Utc>),
}

impl RefreshStrategy {
    pub fn since(&self) -> DateTime<Utc> {
        match self {
            RefreshStrategy::Incremental(since) | RefreshStrategy::FullRefresh(since) => *since,
        }
    }

    pub fn is_full_refresh(&self) -> bool {
        matches!(self, RefreshStrategy::FullRefresh(_))
    }
}

/// Pick the discovery lower bound for this run.
///
/// Crossing a calendar-day boundary since the last run forces a full refresh
/// with a lookback of cursor minus one day minus one hour: the extra day
/// covers windows spanning midnight, the extra hour covers trigger drift.
/// The lookback never goes below the epoch: the analytical store's DateTime
/// is unsigned, so a negative bound would wrap instead of matching everything.
pub fn choose_strategy(cursor: DateTime<Utc>, now: DateTime<Utc>) -> RefreshStrategy {
    if cursor.date_naive() != now.date_naive() {
        let since = (cursor - Duration::days(1) - Duration::hours(1))
            .max(DateTime::<Utc>::UNIX_EPOCH);
        RefreshStrategy::FullRefresh(since)
    } else {
        RefreshStrategy::Incremental(cursor)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub full_refresh: bool,
    pub versions_with_downloads: u64,
    pub versions_with_ratings: u64,
    pub models_with_favorites: u64,
    pub models_with_comments: u64,
    pub models_rolled_up: u64,
    pub rank_rebuild_failures: u32,
    pub duration_ms: u64,
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunStats),
    /// Another run holds the lock; this trigger is a no-op
    Skipped,
}

pub struct MetricsUpdateJob {
    source: Arc<dyn ActivitySource>,
    catalog: CatalogRepository,
    version_metrics: VersionMetricsRepository,
    model_metrics: ModelMetricsRepository,
    ranks: RankMaterializer,
    cursor: CursorStore,
    lock: LockManager,
    config: JobConfig,
}

impl MetricsUpdateJob {
    pub fn new(
        source: Arc<dyn ActivitySource>,
        pool: PgPool,
        lock: LockManager,
        config: JobConfig,
    ) -> Self {
        Self {
            source,
            catalog: CatalogRepository::new(pool.clone()),
            version_metrics: VersionMetricsRepository::new(pool.clone()),
            model_metrics: ModelMetricsRepository::new(pool.clone()),
            ranks: RankMaterializer::new(pool.clone()),
            cursor: CursorStore::new(pool),
            lock,
            config,
        }
    }

    pub async fn run_once(&self) -> Result<RunOutcome> {
        let ttl = std::time::Duration::from_secs(self.config.lock_ttl_secs);
        let guard = self
            .lock
            .acquire(LOCK_NAME, ttl)
            .await
            .map_err(|e| MetricsError::Lock(e.to_string()))?;

        let Some(guard) = guard else {
            info!("Metrics update already running elsewhere, skipping this trigger");
            return Ok(RunOutcome::Skipped);
        };

        let result = self.run_locked().await;

        // The lock is released on success and abort alike; only expiry can
        // leave it behind.
        if let Err(e) = self.lock.release(guard).await {
            warn!(error = %e, "Failed to release metrics lock");
        }

        result.map(RunOutcome::Completed)
    }

    async fn run_locked(&self) -> Result<RunStats> {
        let started = Instant::now();
        let now = Utc::now();

        let cursor = self
            .cursor
            .get(METRICS_CURSOR_KEY)
            .await?
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let strategy = choose_strategy(cursor, now);
        let since = strategy.since();

        info!(
            since = %since,
            full_refresh = strategy.is_full_refresh(),
            "Starting metrics update run"
        );

        // The four kinds write disjoint columns, so they can run against the
        // sources concurrently. Rollup must not start before all of them
        // have committed.
        let (downloads, ratings, favorites, comments) = futures::try_join!(
            self.update_download_metrics(since, now),
            self.update_rating_metrics(since, now),
            self.update_favorite_metrics(since, now),
            self.update_comment_metrics(since, now),
        )?;

        let models_rolled_up = self.rollup_model_metrics().await?;

        // All metric stages succeeded; the next run may start from here.
        self.cursor.set(METRICS_CURSOR_KEY, now).await?;

        // Rank rebuilds run after the cursor advance. A failure leaves the
        // previous rank generation in place and does not fail the run; the
        // metrics themselves are already correct.
        let mut rank_rebuild_failures = 0u32;
        for spec in [&MODEL_VERSION_RANK, &MODEL_RANK] {
            if let Err(e) = self.ranks.rebuild(spec).await {
                rank_rebuild_failures += 1;
                error!(table = spec.table, error = %e, "Rank rebuild failed");
            }
        }

        let stats = RunStats {
            full_refresh: strategy.is_full_refresh(),
            versions_with_downloads: downloads,
            versions_with_ratings: ratings,
            models_with_favorites: favorites,
            models_with_comments: comments,
            models_rolled_up,
            rank_rebuild_failures,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            full_refresh = stats.full_refresh,
            versions_with_downloads = stats.versions_with_downloads,
            versions_with_ratings = stats.versions_with_ratings,
            models_with_favorites = stats.models_with_favorites,
            models_with_comments = stats.models_with_comments,
            models_rolled_up = stats.models_rolled_up,
            rank_rebuild_failures = stats.rank_rebuild_failures,
            duration_ms = stats.duration_ms,
            "Metrics update run completed"
        );

        Ok(stats)
    }

    async fn update_download_metrics(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> Result<u64> {
        let version_ids = self.source.affected_ids(ActivityKind::Download, since).await?;
        for version_id in &version_ids {
            let times = self
                .source
                .event_times(ActivityKind::Download, *version_id)
                .await?;
            let counts = aggregation::count_by_timeframe(&times, now);
            self.version_metrics
                .upsert_download_counts(*version_id, &counts)
                .await?;
        }
        Ok(version_ids.len() as u64)
    }

    async fn update_rating_metrics(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> Result<u64> {
        let version_ids = self.source.affected_ids(ActivityKind::Rating, since).await?;
        for version_id in &version_ids {
            let Some(owner) = self.catalog.owner_of_version(*version_id).await? else {
                warn!(
                    model_version_id = version_id,
                    "Version missing from catalog, skipping rating metrics"
                );
                continue;
            };
            let reviews = self.source.review_events(*version_id).await?;
            let ratings = aggregation::ratings_by_timeframe(&reviews, owner, now);
            self.version_metrics
                .upsert_rating_metrics(*version_id, &ratings)
                .await?;
        }
        Ok(version_ids.len() as u64)
    }

    async fn update_favorite_metrics(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> Result<u64> {
        let model_ids = self.source.affected_ids(ActivityKind::Favorite, since).await?;
        let versions_by_model = self.catalog.versions_of_models(&model_ids).await?;

        for model_id in &model_ids {
            let Some(version_ids) = versions_by_model.get(model_id) else {
                continue;
            };
            let times = self
                .source
                .event_times(ActivityKind::Favorite, *model_id)
                .await?;
            // Favorites attach to the model; every child version carries the
            // model-level counts.
            let counts = aggregation::count_by_timeframe(&times, now);
            for version_id in version_ids {
                self.version_metrics
                    .upsert_favorite_counts(*version_id, &counts)
                    .await?;
            }
        }
        Ok(model_ids.len() as u64)
    }

    async fn update_comment_metrics(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> Result<u64> {
        let model_ids = self.source.affected_ids(ActivityKind::Comment, since).await?;
        let versions_by_model = self.catalog.versions_of_models(&model_ids).await?;

        for model_id in &model_ids {
            let Some(version_ids) = versions_by_model.get(model_id) else {
                continue;
            };
            let times = self
                .source
                .event_times(ActivityKind::Comment, *model_id)
                .await?;
            let counts = aggregation::count_by_timeframe(&times, now);
            for version_id in version_ids {
                self.version_metrics
                    .upsert_comment_counts(*version_id, &counts)
                    .await?;
            }
        }
        Ok(model_ids.len() as u64)
    }

    async fn rollup_model_metrics(&self) -> Result<u64> {
        let rows = self.version_metrics.fetch_rollup_rows().await?;
        let records = aggregation::rollup_model_metrics(&rows);
        self.model_metrics.upsert_all(&records).await?;
        Ok(records.len() as u64)
    }
}
