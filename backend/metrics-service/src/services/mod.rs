mod activity_source;
mod clickhouse_source;

pub use activity_source::ActivitySource;
pub use clickhouse_source::ClickHouseActivitySource;
