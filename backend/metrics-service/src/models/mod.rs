use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

/// The five aggregation timeframes. Closed set; stored as text in Postgres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MetricTimeframe {
    Day,
    Week,
    Month,
    Year,
    AllTime,
}

impl MetricTimeframe {
    pub const ALL: [MetricTimeframe; 5] = [
        MetricTimeframe::Day,
        MetricTimeframe::Week,
        MetricTimeframe::Month,
        MetricTimeframe::Year,
        MetricTimeframe::AllTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricTimeframe::Day => "Day",
            MetricTimeframe::Week => "Week",
            MetricTimeframe::Month => "Month",
            MetricTimeframe::Year => "Year",
            MetricTimeframe::AllTime => "AllTime",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Day" => Some(MetricTimeframe::Day),
            "Week" => Some(MetricTimeframe::Week),
            "Month" => Some(MetricTimeframe::Month),
            "Year" => Some(MetricTimeframe::Year),
            "AllTime" => Some(MetricTimeframe::AllTime),
            _ => None,
        }
    }

    /// Lower bound of the rolling window ending at `now`; `None` means
    /// unbounded (AllTime).
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            MetricTimeframe::Day => Some(now - Duration::days(1)),
            MetricTimeframe::Week => Some(now - Duration::weeks(1)),
            MetricTimeframe::Month => Some(now - Months::new(1)),
            MetricTimeframe::Year => Some(now - Months::new(12)),
            MetricTimeframe::AllTime => None,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.cutoff(now) {
            Some(cutoff) => ts >= cutoff,
            None => true,
        }
    }
}

/// Activity kinds the reconciliation covers. Downloads and ratings are
/// recorded per model version; favorites and comments per model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    Download,
    Rating,
    Favorite,
    Comment,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Download => "download",
            ActivityKind::Rating => "rating",
            ActivityKind::Favorite => "favorite",
            ActivityKind::Comment => "comment",
        }
    }
}

/// A review from the analytical store, already filtered of rows flagged as
/// excluded or policy-violating.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewEvent {
    pub user_id: i64,
    pub rating: f64,
    pub created_at: DateTime<Utc>,
}

/// One row of the per-version metric table joined to its parent model,
/// as fed into the rollup.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionMetricRow {
    pub model_id: i64,
    pub model_version_id: i64,
    pub timeframe: MetricTimeframe,
    pub download_count: i64,
    pub rating_count: i64,
    pub rating: f64,
    pub favorite_count: i64,
    pub comment_count: i64,
}

/// Derived model-level metrics for one timeframe.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMetric {
    pub model_id: i64,
    pub timeframe: MetricTimeframe,
    pub download_count: i64,
    pub rating_count: i64,
    pub rating: f64,
    pub favorite_count: i64,
    pub comment_count: i64,
}
