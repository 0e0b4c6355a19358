use std::path::PathBuf;

use tessera_content::ContentError;
use tessera_placement::PlacementError;
use tessera_render::RenderError;
use tessera_scope::ScopeError;

#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("invalid settings {path}: {message}")]
    Settings { path: PathBuf, message: String },

    #[error("invalid module manifest {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown module '{module}' (required by {required_by})")]
    UnknownModule { module: String, required_by: String },

    #[error("module dependency cycle: {}", chain.join(" -> "))]
    DependencyCycle { chain: Vec<String> },

    /// A manifest names a service the catalog has no factory for.
    #[error("module '{module}' declares unknown service '{path}'")]
    MissingService { module: String, path: String },

    /// An earlier load of this shell failed; shells are not reloaded.
    #[error("shell '{shell}' failed to load: {message}")]
    LoadFailed { shell: String, message: String },

    #[error("placement config {path}: {source}")]
    Placement {
        path: PathBuf,
        #[source]
        source: PlacementError,
    },

    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

pub type ShellResult<T> = Result<T, ShellError>;
