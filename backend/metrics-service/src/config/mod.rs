use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub clickhouse: ClickHouseConfig,
    pub redis: RedisConfig,
    pub job: JobConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClickHouseConfig {
    pub url: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Seconds between periodic triggers of the metrics update job
    pub interval_secs: u64,
    /// Expiry of the mutual-exclusion lock held for the duration of a run
    pub lock_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Config {
            service: ServiceConfig {
                service_name: env::var("SERVICE_NAME")
                    .unwrap_or_else(|_| "metrics-service".to_string()),
            },
            clickhouse: ClickHouseConfig {
                url: env::var("CLICKHOUSE_URL")
                    .unwrap_or_else(|_| "http://localhost:8123".to_string()),
                database: env::var("CLICKHOUSE_DATABASE")
                    .unwrap_or_else(|_| "modelhub_analytics".to_string()),
                username: env::var("CLICKHOUSE_USER").unwrap_or_else(|_| "default".to_string()),
                password: env::var("CLICKHOUSE_PASSWORD").unwrap_or_default(),
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            },
            job: JobConfig {
                interval_secs: env::var("METRICS_INTERVAL_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .expect("METRICS_INTERVAL_SECS must be a valid u64"),
                lock_ttl_secs: env::var("METRICS_LOCK_TTL_SECS")
                    .unwrap_or_else(|_| "600".to_string())
                    .parse()
                    .expect("METRICS_LOCK_TTL_SECS must be a valid u64"),
            },
        }
    }
}
