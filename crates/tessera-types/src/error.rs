use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error)]
pub enum TypeError {
    #[error("invalid content id: {0:?}")]
    InvalidId(String),

    #[error("content item has no type")]
    MissingType,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
