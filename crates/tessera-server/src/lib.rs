//! HTTP host for Tessera.
//!
//! Serves every site under a sites root from one listener. Each request is
//! matched to a tenant shell by its `Host` header and handed to
//! [`Shell::handle_request`](tessera_shell::Shell::handle_request).

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::TesseraServer;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tessera_shell::{ServiceCatalog, ShellRegistry};
    use tower::util::ServiceExt;

    fn write(path: &Path, text: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    /// Two sites: `acme` bound to acme.test, `docs` on any host.
    fn sites() -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        write(
            &root.path().join("acme/settings.toml"),
            "host = \"acme.test\"\n",
        );
        write(
            &root.path().join("acme/content/index.json"),
            r#"{ "meta": { "type": "page" }, "title": "Acme home" }"#,
        );
        write(
            &root.path().join("acme/placement.json"),
            r#"{ "types": { "title": "header:1" } }"#,
        );
        write(&root.path().join("docs/settings.toml"), "host = \"*\"\n");
        root
    }

    fn server(root: &Path) -> TesseraServer {
        let config = ServerConfig {
            sites_root: root.to_path_buf(),
            module_roots: Vec::new(),
            ..ServerConfig::default()
        };
        TesseraServer::open(config, Arc::new(ServiceCatalog::new())).unwrap()
    }

    async fn get(app: axum::Router, host: &str, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .header("host", host)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn health_endpoint() {
        let root = sites();
        let (status, body) = get(server(root.path()).router(), "localhost", "/_health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["shells"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn routes_by_host() {
        let root = sites();
        let server = server(root.path());

        let (status, body) = get(server.router(), "acme.test:8080", "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Acme home"));
        assert!(server.registry().get("acme").unwrap().is_loaded());
        assert!(!server.registry().get("docs").unwrap().is_loaded());

        let (status, _) = get(server.router(), "other.test", "/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(server.registry().get("docs").unwrap().is_loaded());
    }

    #[tokio::test]
    async fn no_matching_shell_is_not_found() {
        let (status, _) = get(
            build(Arc::new(ShellRegistry::new())),
            "acme.test",
            "/",
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    fn build(registry: Arc<ShellRegistry>) -> axum::Router {
        router::build_router(registry)
    }
}
