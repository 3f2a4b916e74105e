pub mod orchestrator;
pub mod rest;

pub use orchestrator::{AirQualityOrchestrator, AirQualityResponse, LocationSummary};
pub use rest::ApiState;
