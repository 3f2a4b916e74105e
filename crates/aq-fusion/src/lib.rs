pub mod engine;
pub mod forecast;

pub use engine::{BlendResult, FusionEngine, SourceDetail};
pub use forecast::{AggregatedHour, ForecastAggregator};
