use thiserror::Error;

/// Error type shared across the workspace at crate boundaries.
///
/// Individual crates keep their own narrower error enums internally;
/// this is what bubbles up to the HTTP layer and the orchestrator.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("adapter '{source_name}' failed: {message}")]
    AdapterError { source_name: String, message: String },

    #[error("no fresh data available for this location")]
    NoFreshData,

    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
