use std::sync::Arc;

use axum::{routing::get, Router};
use tessera_shell::ShellRegistry;
use tower_http::trace::TraceLayer;

use crate::handler;

/// Build the axum router: `/_health`, and every other path routed to a shell.
pub fn build_router(registry: Arc<ShellRegistry>) -> Router {
    Router::new()
        .route("/_health", get(handler::health_handler))
        .fallback(handler::site_handler)
        .with_state(registry)
        .layer(TraceLayer::new_for_http())
}
