//! Field-level merge into the per-version metric table.
//!
//! Each activity kind owns a disjoint subset of the columns: downloads own
//! download_count, ratings own rating_count + rating, favorites own
//! favorite_count, comments own comment_count. An upsert inserts the five
//! timeframe rows with zeros in the unowned columns and updates only the
//! owned ones on conflict, so concurrent kind stages never clobber each
//! other and re-running with the same inputs is a no-op.

use crate::aggregation::{TimeframeCounts, TimeframeRatings};
use crate::error::{MetricsError, Result};
use crate::models::{MetricTimeframe, VersionMetricRow};
use sqlx::PgPool;

#[derive(Clone)]
pub struct VersionMetricsRepository {
    pool: PgPool,
}

impl VersionMetricsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_download_counts(
        &self,
        model_version_id: i64,
        counts: &TimeframeCounts,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for tf in MetricTimeframe::ALL {
            sqlx::query(
                r#"
                INSERT INTO model_version_metrics
                    (model_version_id, timeframe, download_count, rating_count, rating, favorite_count, comment_count)
                VALUES ($1, $2, $3, 0, 0, 0, 0)
                ON CONFLICT (model_version_id, timeframe) DO UPDATE
                SET download_count = EXCLUDED.download_count
                "#,
            )
            .bind(model_version_id)
            .bind(tf.as_str())
            .bind(counts.get(tf))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn upsert_rating_metrics(
        &self,
        model_version_id: i64,
        ratings: &TimeframeRatings,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for tf in MetricTimeframe::ALL {
            let aggregate = ratings.get(tf);
            sqlx::query(
                r#"
                INSERT INTO model_version_metrics
                    (model_version_id, timeframe, download_count, rating_count, rating, favorite_count, comment_count)
                VALUES ($1, $2, 0, $3, $4, 0, 0)
                ON CONFLICT (model_version_id, timeframe) DO UPDATE
                SET rating_count = EXCLUDED.rating_count,
                    rating = EXCLUDED.rating
                "#,
            )
            .bind(model_version_id)
            .bind(tf.as_str())
            .bind(aggregate.count)
            .bind(aggregate.average)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn upsert_favorite_counts(
        &self,
        model_version_id: i64,
        counts: &TimeframeCounts,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for tf in MetricTimeframe::ALL {
            sqlx::query(
                r#"
                INSERT INTO model_version_metrics
                    (model_version_id, timeframe, download_count, rating_count, rating, favorite_count, comment_count)
                VALUES ($1, $2, 0, 0, 0, $3, 0)
                ON CONFLICT (model_version_id, timeframe) DO UPDATE
                SET favorite_count = EXCLUDED.favorite_count
                "#,
            )
            .bind(model_version_id)
            .bind(tf.as_str())
            .bind(counts.get(tf))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn upsert_comment_counts(
        &self,
        model_version_id: i64,
        counts: &TimeframeCounts,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for tf in MetricTimeframe::ALL {
            sqlx::query(
                r#"
                INSERT INTO model_version_metrics
                    (model_version_id, timeframe, download_count, rating_count, rating, favorite_count, comment_count)
                VALUES ($1, $2, 0, 0, 0, 0, $3)
                ON CONFLICT (model_version_id, timeframe) DO UPDATE
                SET comment_count = EXCLUDED.comment_count
                "#,
            )
            .bind(model_version_id)
            .bind(tf.as_str())
            .bind(counts.get(tf))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// The complete per-version metric table joined to parent model ids.
    /// Rollup input: always the whole table, never a delta.
    pub async fn fetch_rollup_rows(&self) -> Result<Vec<VersionMetricRow>> {
        let rows: Vec<(i64, i64, String, i64, i64, f64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT
                mv.model_id,
                vm.model_version_id,
                vm.timeframe,
                vm.download_count,
                vm.rating_count,
                vm.rating,
                vm.favorite_count,
                vm.comment_count
            FROM model_version_metrics vm
            JOIN model_versions mv ON mv.id = vm.model_version_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(model_id, model_version_id, timeframe, downloads, rating_count, rating, favorites, comments)| {
                let timeframe = MetricTimeframe::parse(&timeframe).ok_or_else(|| {
                    MetricsError::Database(format!("unknown timeframe in metric table: {timeframe}"))
                })?;
                Ok(VersionMetricRow {
                    model_id,
                    model_version_id,
                    timeframe,
                    download_count: downloads,
                    rating_count,
                    rating,
                    favorite_count: favorites,
                    comment_count: comments,
                })
            })
            .collect()
    }
}
