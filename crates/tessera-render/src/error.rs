use std::path::PathBuf;

use tessera_content::ContentError;
use tessera_placement::PlacementError;
use tessera_shape::ShapeError;

/// Errors raised while building or rendering a page.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to load template {path}: {source}")]
    TemplateLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A template failed while rendering.
    #[error("template '{template}' failed: {message}")]
    Template { template: String, message: String },

    #[error("shape nesting exceeds {0} levels")]
    TooDeep(usize),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    Placement(#[from] PlacementError),

    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// Result alias for rendering.
pub type RenderResult<T> = Result<T, RenderError>;
