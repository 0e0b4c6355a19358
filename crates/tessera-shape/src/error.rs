//! Error types for shape tree operations.

/// Errors that can occur while placing shapes.
#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    /// The shape is the target zone or one of its ancestors.
    #[error("cannot place shape '{0}' inside itself")]
    Cycle(String),
}

/// Convenience alias for shape results.
pub type ShapeResult<T> = Result<T, ShapeError>;
