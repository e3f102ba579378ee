mod catalog;
mod cursor;
mod model_metrics;
mod rank;
mod version_metrics;

pub use catalog::CatalogRepository;
pub use cursor::CursorStore;
pub use model_metrics::ModelMetricsRepository;
pub use rank::{RankMaterializer, RankTable, MODEL_RANK, MODEL_VERSION_RANK};
pub use version_metrics::VersionMetricsRepository;
