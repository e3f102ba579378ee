//! Shadow-build-and-swap rebuild of the denormalized rank tables.
//!
//! The expensive part (materializing the live view, building the primary
//! key and indexes) happens on a shadow table that no reader knows about.
//! The swap itself is a single transaction of renames, so concurrent readers
//! see either the complete previous generation or the complete new one. A
//! failure anywhere before the swap leaves the live table untouched.

use crate::error::Result;
use sqlx::PgPool;
use tracing::{debug, info};

/// Names a rank table and the live view it is materialized from.
#[derive(Debug, Clone, Copy)]
pub struct RankTable {
    pub live_view: &'static str,
    pub table: &'static str,
    pub shadow: &'static str,
    pub pk_column: &'static str,
    /// Extra lookup column indexed on the rebuilt table
    pub secondary_index: Option<&'static str>,
}

pub const MODEL_RANK: RankTable = RankTable {
    live_view: "model_rank_live",
    table: "model_rank",
    shadow: "model_rank_new",
    pk_column: "model_id",
    secondary_index: None,
};

pub const MODEL_VERSION_RANK: RankTable = RankTable {
    live_view: "model_version_rank_live",
    table: "model_version_rank",
    shadow: "model_version_rank_new",
    pk_column: "model_version_id",
    secondary_index: Some("model_id"),
};

#[derive(Clone)]
pub struct RankMaterializer {
    pool: PgPool,
}

impl RankMaterializer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn rebuild(&self, spec: &RankTable) -> Result<()> {
        debug!(table = spec.table, "Building rank shadow table");

        // Shadow build: outside any transaction with the live table, so a
        // failure here cannot disturb readers.
        sqlx::query(&format!(r#"DROP TABLE IF EXISTS "{}""#, spec.shadow))
            .execute(&self.pool)
            .await?;
        sqlx::query(&format!(
            r#"CREATE TABLE "{}" AS SELECT * FROM "{}""#,
            spec.shadow, spec.live_view
        ))
        .execute(&self.pool)
        .await?;
        sqlx::query(&format!(
            r#"ALTER TABLE "{shadow}" ADD CONSTRAINT "pk_{shadow}" PRIMARY KEY ("{pk}")"#,
            shadow = spec.shadow,
            pk = spec.pk_column,
        ))
        .execute(&self.pool)
        .await?;
        if let Some(column) = spec.secondary_index {
            sqlx::query(&format!(
                r#"CREATE INDEX "{shadow}_idx" ON "{shadow}" ("{column}")"#,
                shadow = spec.shadow,
                column = column,
            ))
            .execute(&self.pool)
            .await?;
        }

        // Atomic swap: one transaction of renames, all-or-nothing for any
        // concurrent reader.
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(r#"DROP TABLE IF EXISTS "{}""#, spec.table))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            r#"ALTER TABLE "{}" RENAME TO "{}""#,
            spec.shadow, spec.table
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!(
            r#"ALTER TABLE "{table}" RENAME CONSTRAINT "pk_{shadow}" TO "pk_{table}""#,
            table = spec.table,
            shadow = spec.shadow,
        ))
        .execute(&mut *tx)
        .await?;
        if spec.secondary_index.is_some() {
            sqlx::query(&format!(
                r#"ALTER INDEX "{shadow}_idx" RENAME TO "{table}_idx""#,
                shadow = spec.shadow,
                table = spec.table,
            ))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!(table = spec.table, "Rank table rebuilt");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_table_names_are_consistent() {
        for spec in [MODEL_RANK, MODEL_VERSION_RANK] {
            assert_eq!(spec.shadow, format!("{}_new", spec.table));
            assert!(spec.live_view.ends_with("_live"));
        }
    }
}
