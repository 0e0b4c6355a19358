use std::sync::Arc;

use tessera_shell::{ServiceCatalog, ShellRegistry};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;

/// Tessera HTTP host.
pub struct TesseraServer {
    config: ServerConfig,
    registry: Arc<ShellRegistry>,
}

impl TesseraServer {
    pub fn new(config: ServerConfig, registry: Arc<ShellRegistry>) -> Self {
        Self { config, registry }
    }

    /// Discover the sites under `config.sites_root`.
    pub fn open(config: ServerConfig, catalog: Arc<ServiceCatalog>) -> ServerResult<Self> {
        let registry =
            ShellRegistry::discover(&config.sites_root, &config.module_roots, catalog)?;
        Ok(Self::new(config, Arc::new(registry)))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ShellRegistry> {
        &self.registry
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        let router = build_router(Arc::clone(&self.registry));
        if self.config.cors {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Load every shell, then serve requests until the process stops.
    ///
    /// A shell that fails to load does not stop the server; its requests
    /// answer 500 until it is fixed.
    pub async fn serve(self) -> ServerResult<()> {
        if let Err(e) = self.registry.load_all().await {
            tracing::error!(error = %e, "not every shell loaded");
        }
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            addr = %self.config.bind_addr,
            shells = self.registry.len(),
            "Tessera listening"
        );
        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}
