use std::path::PathBuf;

use tessera_types::TypeError;

/// Errors from content stores and fetch coordination.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    /// I/O failure reading from a backing medium.
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored document is not a valid content item.
    #[error("invalid content item at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: TypeError,
    },

    #[error(transparent)]
    Type(#[from] TypeError),

    /// A store failed for a reason of its own.
    #[error("content store '{store}' failed: {message}")]
    Store { store: String, message: String },
}

/// Result alias for content operations.
pub type ContentResult<T> = Result<T, ContentError>;
