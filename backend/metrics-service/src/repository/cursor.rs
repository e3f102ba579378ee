use crate::error::Result;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::PgPool;

/// Timestamp cursors persisted in the generic key_value table. Values are
/// epoch milliseconds.
#[derive(Clone)]
pub struct CursorStore {
    pool: PgPool,
}

impl CursorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let millis: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT value FROM key_value
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(millis.and_then(|ms| Utc.timestamp_millis_opt(ms).single()))
    }

    pub async fn set(&self, key: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO key_value (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value
            "#,
        )
        .bind(key)
        .bind(at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
