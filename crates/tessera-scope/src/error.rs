/// Errors from scope operations.
#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    /// An event handler failed; emission stopped at that handler.
    #[error("handler for '{event}' failed: {source}")]
    Handler {
        event: String,
        #[source]
        source: crate::event::BoxError,
    },
}

/// Result alias for scope operations.
pub type ScopeResult<T> = Result<T, ScopeError>;
