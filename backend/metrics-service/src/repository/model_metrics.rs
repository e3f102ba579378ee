use crate::error::Result;
use crate::models::ModelMetric;
use sqlx::PgPool;

/// Whole-row upserts into the model-level metric table. All columns are
/// owned by the rollup stage, so unlike the per-version table no field-level
/// merge is needed.
#[derive(Clone)]
pub struct ModelMetricsRepository {
    pool: PgPool,
}

impl ModelMetricsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_all(&self, records: &[ModelMetric]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO model_metrics
                    (model_id, timeframe, download_count, rating_count, rating, favorite_count, comment_count)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (model_id, timeframe) DO UPDATE
                SET download_count = EXCLUDED.download_count,
                    rating_count = EXCLUDED.rating_count,
                    rating = EXCLUDED.rating,
                    favorite_count = EXCLUDED.favorite_count,
                    comment_count = EXCLUDED.comment_count
                "#,
            )
            .bind(record.model_id)
            .bind(record.timeframe.as_str())
            .bind(record.download_count)
            .bind(record.rating_count)
            .bind(record.rating)
            .bind(record.favorite_count)
            .bind(record.comment_count)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
