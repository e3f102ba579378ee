//! Pure per-timeframe aggregation.
//!
//! All four activity kinds share the same five-way timeframe fan-out; the
//! only thing that varies is the aggregation operator (plain count for
//! downloads/favorites/comments, per-author deduplicated count + mean for
//! ratings). Keeping these folds pure and off the database makes the window
//! semantics unit-testable and keeps the SQL layer to plain upserts.

use crate::models::{MetricTimeframe, ModelMetric, ReviewEvent, VersionMetricRow};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Event counts per timeframe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeframeCounts {
    pub day: i64,
    pub week: i64,
    pub month: i64,
    pub year: i64,
    pub all_time: i64,
}

impl TimeframeCounts {
    pub fn get(&self, tf: MetricTimeframe) -> i64 {
        match tf {
            MetricTimeframe::Day => self.day,
            MetricTimeframe::Week => self.week,
            MetricTimeframe::Month => self.month,
            MetricTimeframe::Year => self.year,
            MetricTimeframe::AllTime => self.all_time,
        }
    }

    fn set(&mut self, tf: MetricTimeframe, value: i64) {
        match tf {
            MetricTimeframe::Day => self.day = value,
            MetricTimeframe::Week => self.week = value,
            MetricTimeframe::Month => self.month = value,
            MetricTimeframe::Year => self.year = value,
            MetricTimeframe::AllTime => self.all_time = value,
        }
    }
}

/// Rating count and arithmetic mean for one timeframe. An empty window is
/// `{ count: 0, average: 0.0 }`, never absent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RatingAggregate {
    pub count: i64,
    pub average: f64,
}

/// Rating aggregates per timeframe.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeframeRatings {
    pub day: RatingAggregate,
    pub week: RatingAggregate,
    pub month: RatingAggregate,
    pub year: RatingAggregate,
    pub all_time: RatingAggregate,
}

impl TimeframeRatings {
    pub fn get(&self, tf: MetricTimeframe) -> RatingAggregate {
        match tf {
            MetricTimeframe::Day => self.day,
            MetricTimeframe::Week => self.week,
            MetricTimeframe::Month => self.month,
            MetricTimeframe::Year => self.year,
            MetricTimeframe::AllTime => self.all_time,
        }
    }

    fn set(&mut self, tf: MetricTimeframe, value: RatingAggregate) {
        match tf {
            MetricTimeframe::Day => self.day = value,
            MetricTimeframe::Week => self.week = value,
            MetricTimeframe::Month => self.month = value,
            MetricTimeframe::Year => self.year = value,
            MetricTimeframe::AllTime => self.all_time = value,
        }
    }
}

/// Count events falling inside each rolling timeframe ending at `now`.
pub fn count_by_timeframe(times: &[DateTime<Utc>], now: DateTime<Utc>) -> TimeframeCounts {
    let mut counts = TimeframeCounts::default();
    for tf in MetricTimeframe::ALL {
        let n = times.iter().filter(|t| tf.contains(**t, now)).count() as i64;
        counts.set(tf, n);
    }
    counts
}

/// Aggregate reviews per timeframe.
///
/// Reviews by the model's owning user are dropped. The remaining reviews
/// collapse to one per distinct author: the maximum rating value, timestamped
/// with the author's latest review. Timeframe membership is decided on that
/// latest timestamp.
pub fn ratings_by_timeframe(
    reviews: &[ReviewEvent],
    owner_user_id: i64,
    now: DateTime<Utc>,
) -> TimeframeRatings {
    // (max rating, latest created_at) per author
    let mut per_author: BTreeMap<i64, (f64, DateTime<Utc>)> = BTreeMap::new();
    for review in reviews {
        if review.user_id == owner_user_id {
            continue;
        }
        per_author
            .entry(review.user_id)
            .and_modify(|(rating, at)| {
                *rating = rating.max(review.rating);
                *at = (*at).max(review.created_at);
            })
            .or_insert((review.rating, review.created_at));
    }

    let mut ratings = TimeframeRatings::default();
    for tf in MetricTimeframe::ALL {
        let mut count = 0i64;
        let mut sum = 0f64;
        for (rating, at) in per_author.values() {
            if tf.contains(*at, now) {
                count += 1;
                sum += rating;
            }
        }
        let average = if count > 0 { sum / count as f64 } else { 0.0 };
        ratings.set(tf, RatingAggregate { count, average });
    }
    ratings
}

/// Derive model-level metrics from the full per-version metric table.
///
/// Counts are plain sums across the model's versions; the rating is the
/// rating-count-weighted mean, 0.0 when no version has ratings. Always a
/// total recompute: recomputing from the complete table self-heals missed
/// deltas and avoids compounding rounding error in the weighted mean.
pub fn rollup_model_metrics(rows: &[VersionMetricRow]) -> Vec<ModelMetric> {
    #[derive(Default)]
    struct Acc {
        download_count: i64,
        rating_count: i64,
        rating_weight: f64,
        favorite_count: i64,
        comment_count: i64,
    }

    let mut grouped: BTreeMap<(i64, MetricTimeframe), Acc> = BTreeMap::new();
    for row in rows {
        let acc = grouped.entry((row.model_id, row.timeframe)).or_default();
        acc.download_count += row.download_count;
        acc.rating_count += row.rating_count;
        acc.rating_weight += row.rating * row.rating_count as f64;
        acc.favorite_count += row.favorite_count;
        acc.comment_count += row.comment_count;
    }

    grouped
        .into_iter()
        .map(|((model_id, timeframe), acc)| ModelMetric {
            model_id,
            timeframe,
            download_count: acc.download_count,
            rating_count: acc.rating_count,
            rating: if acc.rating_count > 0 {
                acc.rating_weight / acc.rating_count as f64
            } else {
                0.0
            },
            favorite_count: acc.favorite_count,
            comment_count: acc.comment_count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_empty_stream_yields_zero_counts() {
        let now = at(2024, 6, 1, 12);
        let counts = count_by_timeframe(&[], now);
        assert_eq!(counts, TimeframeCounts::default());
        assert_eq!(counts.get(MetricTimeframe::Day), 0);
    }

    #[test]
    fn test_counts_widen_with_the_timeframe() {
        let now = at(2024, 6, 1, 12);
        let times = vec![
            at(2024, 6, 1, 10),  // within a day
            at(2024, 5, 29, 0),  // within a week
            at(2024, 5, 10, 0),  // within a month
            at(2023, 9, 1, 0),   // within a year
            at(2020, 1, 1, 0),   // all-time only
        ];
        let counts = count_by_timeframe(&times, now);
        assert_eq!(counts.day, 1);
        assert_eq!(counts.week, 2);
        assert_eq!(counts.month, 3);
        assert_eq!(counts.year, 4);
        assert_eq!(counts.all_time, 5);
    }

    #[test]
    fn test_empty_reviews_yield_zero_rating_not_error() {
        let now = at(2024, 6, 1, 12);
        let ratings = ratings_by_timeframe(&[], 7, now);
        for tf in MetricTimeframe::ALL {
            assert_eq!(ratings.get(tf), RatingAggregate { count: 0, average: 0.0 });
        }
    }

    #[test]
    fn test_owner_reviews_are_excluded() {
        let now = at(2024, 6, 1, 12);
        let reviews = vec![
            ReviewEvent { user_id: 7, rating: 5.0, created_at: at(2024, 6, 1, 10) },
            ReviewEvent { user_id: 8, rating: 3.0, created_at: at(2024, 6, 1, 10) },
        ];
        let ratings = ratings_by_timeframe(&reviews, 7, now);
        assert_eq!(ratings.all_time.count, 1);
        assert_eq!(ratings.all_time.average, 3.0);
    }

    #[test]
    fn test_duplicate_authors_collapse_to_max_rating() {
        let now = at(2024, 6, 1, 12);
        let reviews = vec![
            ReviewEvent { user_id: 8, rating: 2.0, created_at: at(2024, 1, 1, 0) },
            ReviewEvent { user_id: 8, rating: 4.0, created_at: at(2023, 12, 1, 0) },
            ReviewEvent { user_id: 9, rating: 5.0, created_at: at(2024, 6, 1, 10) },
        ];
        let ratings = ratings_by_timeframe(&reviews, 1, now);
        // two distinct authors; user 8 counts once at rating 4.0
        assert_eq!(ratings.all_time.count, 2);
        assert_eq!(ratings.all_time.average, 4.5);
    }

    #[test]
    fn test_window_membership_uses_latest_review_time() {
        let now = at(2024, 6, 1, 12);
        let reviews = vec![
            // old high rating, fresh lower one: rating collapses to the max
            // but the author lands in the Day window via the fresh timestamp
            ReviewEvent { user_id: 8, rating: 5.0, created_at: at(2023, 1, 1, 0) },
            ReviewEvent { user_id: 8, rating: 2.0, created_at: at(2024, 6, 1, 11) },
        ];
        let ratings = ratings_by_timeframe(&reviews, 1, now);
        assert_eq!(ratings.day.count, 1);
        assert_eq!(ratings.day.average, 5.0);
    }

    fn version_row(
        model_id: i64,
        version_id: i64,
        tf: MetricTimeframe,
        downloads: i64,
        rating_count: i64,
        rating: f64,
    ) -> VersionMetricRow {
        VersionMetricRow {
            model_id,
            model_version_id: version_id,
            timeframe: tf,
            download_count: downloads,
            rating_count,
            rating,
            favorite_count: downloads / 2,
            comment_count: downloads / 4,
        }
    }

    #[test]
    fn test_rollup_weighted_rating() {
        let rows = vec![
            version_row(1, 10, MetricTimeframe::AllTime, 100, 2, 4.0),
            version_row(1, 11, MetricTimeframe::AllTime, 40, 8, 2.0),
        ];
        let metrics = rollup_model_metrics(&rows);
        assert_eq!(metrics.len(), 1);
        let m = &metrics[0];
        assert_eq!(m.model_id, 1);
        assert_eq!(m.download_count, 140);
        assert_eq!(m.rating_count, 10);
        // (2 * 4.0 + 8 * 2.0) / 10
        assert!((m.rating - 2.4).abs() < 1e-9);
        assert_eq!(m.favorite_count, 70);
        assert_eq!(m.comment_count, 35);
    }

    #[test]
    fn test_rollup_zero_ratings_is_zero_not_nan() {
        let rows = vec![version_row(1, 10, MetricTimeframe::Day, 5, 0, 0.0)];
        let metrics = rollup_model_metrics(&rows);
        assert_eq!(metrics[0].rating, 0.0);
    }

    #[test]
    fn test_rollup_groups_by_model_and_timeframe() {
        let rows = vec![
            version_row(1, 10, MetricTimeframe::Day, 1, 0, 0.0),
            version_row(1, 10, MetricTimeframe::Week, 2, 0, 0.0),
            version_row(2, 20, MetricTimeframe::Day, 3, 0, 0.0),
        ];
        let metrics = rollup_model_metrics(&rows);
        assert_eq!(metrics.len(), 3);
        // BTreeMap grouping keeps the output deterministic
        assert_eq!(metrics[0].model_id, 1);
        assert_eq!(metrics[0].timeframe, MetricTimeframe::Day);
        assert_eq!(metrics[2].model_id, 2);
    }
}
