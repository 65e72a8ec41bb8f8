//! Error types for the clustering engine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClusterError>;

#[derive(Error, Debug)]
pub enum ClusterError {
    /// Fewer points than the configured minimum.
    #[error("insufficient data: have {have} points, need at least {need}")]
    InsufficientData { have: usize, need: usize },

    /// NaN or out-of-range coordinate on an input point.
    #[error("invalid coordinate at index {index}: lat={latitude}, lon={longitude}")]
    InvalidCoordinate {
        index: usize,
        latitude: f64,
        longitude: f64,
    },

    /// The spatial index backend cannot be used in this build.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("clustering cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
