use crate::error::Result;
use crate::models::{ActivityKind, ReviewEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Read-only access to the analytical event store.
///
/// Discovery and event fetches are the only queries the reconciliation needs;
/// everything downstream is computed in this service and written to Postgres.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Distinct ids touched by new activity of `kind` since the lower bound.
    /// Download and Rating return model-version ids; Favorite and Comment are
    /// recorded per model and return model ids. No upper bound: discovery
    /// always extends to now.
    async fn affected_ids(&self, kind: ActivityKind, since: DateTime<Utc>) -> Result<Vec<i64>>;

    /// All event timestamps of `kind` for one id (model-version id for
    /// Download, model id for Favorite/Comment). These kinds are plain
    /// counts; Rating carries per-review data and goes through
    /// [`review_events`](Self::review_events) instead.
    async fn event_times(&self, kind: ActivityKind, id: i64) -> Result<Vec<DateTime<Utc>>>;

    /// All admissible reviews for one model version. Rows flagged as excluded
    /// or policy-violating are filtered at the source.
    async fn review_events(&self, model_version_id: i64) -> Result<Vec<ReviewEvent>>;
}
