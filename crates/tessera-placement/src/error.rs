use std::path::PathBuf;

use tessera_shape::ShapeError;

/// Errors from placement configuration and shape placement.
#[derive(Debug, thiserror::Error)]
pub enum PlacementError {
    /// A match rule carries a pattern that is not a valid regular expression.
    #[error("invalid pattern {pattern:?} for '{field}': {source}")]
    InvalidPattern {
        field: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to read placement config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid placement config: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// Result alias for placement operations.
pub type PlacementResult<T> = Result<T, PlacementError>;
