pub mod aggregation;
pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod repository;
pub mod services;

pub use config::Config;
pub use error::{MetricsError, Result};
pub use jobs::MetricsUpdateJob;
