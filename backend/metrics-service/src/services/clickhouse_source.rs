//! ClickHouse implementation of the activity source.
//!
//! Queries the analytical event tables: model_version_events (downloads),
//! model_version_reviews, model_engagements (favorites), model_comments.

use super::ActivitySource;
use crate::config::ClickHouseConfig;
use crate::error::{MetricsError, Result};
use crate::models::{ActivityKind, ReviewEvent};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use clickhouse::{Client, Row};
use serde::Deserialize;
use tracing::{debug, error, info};

pub struct ClickHouseActivitySource {
    client: Client,
    database: String,
}

impl ClickHouseActivitySource {
    pub fn new(url: &str, database: &str, username: &str, password: &str) -> Self {
        let client = Client::default()
            .with_url(url)
            .with_database(database)
            .with_user(username)
            .with_password(password);

        info!(
            url = url,
            database = database,
            "ClickHouseActivitySource initialized"
        );

        Self {
            client,
            database: database.to_string(),
        }
    }

    pub fn from_config(config: &ClickHouseConfig) -> Self {
        Self::new(
            &config.url,
            &config.database,
            &config.username,
            &config.password,
        )
    }

    async fn fetch_ids(&self, query: String) -> Result<Vec<i64>> {
        let rows: Vec<IdRow> = self.client.query(&query).fetch_all().await.map_err(|e| {
            error!(error = %e, "Affected-id discovery query failed");
            MetricsError::ClickHouse(e.to_string())
        })?;
        Ok(rows.into_iter().map(|r| r.id).collect())
    }
}

// ============================================
// ClickHouse Row Types
// ============================================

#[derive(Debug, Row, Deserialize)]
struct IdRow {
    id: i64,
}

#[derive(Debug, Row, Deserialize)]
struct EventTimeRow {
    #[serde(with = "clickhouse::serde::time::datetime")]
    event_time: time::OffsetDateTime,
}

#[derive(Debug, Row, Deserialize)]
struct ReviewRow {
    user_id: i64,
    rating: f64,
    #[serde(with = "clickhouse::serde::time::datetime")]
    created_at: time::OffsetDateTime,
}

fn to_chrono(dt: time::OffsetDateTime) -> DateTime<Utc> {
    Utc.timestamp_opt(dt.unix_timestamp(), dt.nanosecond())
        .single()
        .unwrap_or_default()
}

#[async_trait]
impl ActivitySource for ClickHouseActivitySource {
    async fn affected_ids(&self, kind: ActivityKind, since: DateTime<Utc>) -> Result<Vec<i64>> {
        let since_ts = since.timestamp();
        let query = match kind {
            ActivityKind::Download => format!(
                r#"
                SELECT DISTINCT model_version_id AS id
                FROM {}.model_version_events
                WHERE event_type = 'Download'
                  AND time >= toDateTime({})
                "#,
                self.database, since_ts
            ),
            ActivityKind::Rating => format!(
                r#"
                SELECT DISTINCT model_version_id AS id
                FROM {}.model_version_reviews
                WHERE created_at >= toDateTime({})
                "#,
                self.database, since_ts
            ),
            ActivityKind::Favorite => format!(
                r#"
                SELECT DISTINCT model_id AS id
                FROM {}.model_engagements
                WHERE engagement_type = 'Favorite'
                  AND created_at >= toDateTime({})
                "#,
                self.database, since_ts
            ),
            ActivityKind::Comment => format!(
                r#"
                SELECT DISTINCT model_id AS id
                FROM {}.model_comments
                WHERE created_at >= toDateTime({})
                "#,
                self.database, since_ts
            ),
        };

        debug!(kind = kind.as_str(), since = %since, "Discovering affected ids");
        self.fetch_ids(query).await
    }

    async fn event_times(&self, kind: ActivityKind, id: i64) -> Result<Vec<DateTime<Utc>>> {
        let query = match kind {
            ActivityKind::Download => format!(
                r#"
                SELECT time AS event_time
                FROM {}.model_version_events
                WHERE event_type = 'Download'
                  AND model_version_id = {}
                "#,
                self.database, id
            ),
            ActivityKind::Rating => format!(
                r#"
                SELECT created_at AS event_time
                FROM {}.model_version_reviews
                WHERE model_version_id = {}
                  AND exclude = 0
                  AND tos_violation = 0
                "#,
                self.database, id
            ),
            ActivityKind::Favorite => format!(
                r#"
                SELECT created_at AS event_time
                FROM {}.model_engagements
                WHERE engagement_type = 'Favorite'
                  AND model_id = {}
                "#,
                self.database, id
            ),
            ActivityKind::Comment => format!(
                r#"
                SELECT created_at AS event_time
                FROM {}.model_comments
                WHERE model_id = {}
                "#,
                self.database, id
            ),
        };

        let rows: Vec<EventTimeRow> = self.client.query(&query).fetch_all().await.map_err(|e| {
            error!(kind = kind.as_str(), id = id, error = %e, "Event fetch failed");
            MetricsError::ClickHouse(e.to_string())
        })?;

        Ok(rows.into_iter().map(|r| to_chrono(r.event_time)).collect())
    }

    async fn review_events(&self, model_version_id: i64) -> Result<Vec<ReviewEvent>> {
        let query = format!(
            r#"
            SELECT user_id, rating, created_at
            FROM {}.model_version_reviews
            WHERE model_version_id = {}
              AND exclude = 0
              AND tos_violation = 0
            "#,
            self.database, model_version_id
        );

        let rows: Vec<ReviewRow> = self.client.query(&query).fetch_all().await.map_err(|e| {
            error!(model_version_id, error = %e, "Review fetch failed");
            MetricsError::ClickHouse(e.to_string())
        })?;

        Ok(rows
            .into_iter()
            .map(|r| ReviewEvent {
                user_id: r.user_id,
                rating: r.rating,
                created_at: to_chrono(r.created_at),
            })
            .collect())
    }
}
