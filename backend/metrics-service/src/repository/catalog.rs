use crate::error::Result;
use sqlx::PgPool;
use std::collections::HashMap;

/// Read access to the model catalog.
#[derive(Clone)]
pub struct CatalogRepository {
    pool: PgPool,
}

impl CatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Owning user of the model a version belongs to. `None` when the
    /// version is no longer in the catalog.
    pub async fn owner_of_version(&self, model_version_id: i64) -> Result<Option<i64>> {
        let owner: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT m.user_id
            FROM model_versions mv
            JOIN models m ON m.id = mv.model_id
            WHERE mv.id = $1
            "#,
        )
        .bind(model_version_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(owner)
    }

    /// Child version ids for each of the given models. Models without
    /// versions are absent from the result.
    pub async fn versions_of_models(&self, model_ids: &[i64]) -> Result<HashMap<i64, Vec<i64>>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT model_id, id
            FROM model_versions
            WHERE model_id = ANY($1)
            ORDER BY model_id, id
            "#,
        )
        .bind(model_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_model: HashMap<i64, Vec<i64>> = HashMap::new();
        for (model_id, version_id) in rows {
            by_model.entry(model_id).or_default().push(version_id);
        }
        Ok(by_model)
    }
}
