pub mod models;
pub mod sqlite;

pub use models::{
    AggregatedForecastPoint, BlendedData, FusionLogEntry, RawResponseLogRecord, RegionConfig, SourceWeight,
};
pub use sqlite::SqliteStore;
