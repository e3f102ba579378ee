use thiserror::Error;

pub type Result<T> = std::result::Result<T, MetricsError>;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("ClickHouse error: {0}")]
    ClickHouse(String),

    #[error("Lock error: {0}")]
    Lock(String),
}

impl From<sqlx::Error> for MetricsError {
    fn from(err: sqlx::Error) -> Self {
        MetricsError::Database(err.to_string())
    }
}
