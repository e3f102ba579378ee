mod update_metrics;

pub use update_metrics::{
    choose_strategy, MetricsUpdateJob, RefreshStrategy, RunOutcome, RunStats,
};
