pub mod config;
pub mod distance;
pub mod error;
pub mod health;
pub mod types;

pub use config::Config;
pub use distance::haversine_km;
pub use error::AppError;
pub use health::{AdapterHealth, HealthState};
pub use types::{
    AqiCategory, Coordinates, Measurement, Pollutants, QualityLevel, SourceCode, AQI_CATEGORIES,
};
