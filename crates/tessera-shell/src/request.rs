use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tessera_content::STORAGE_MANAGER;
use tessera_render::{item_promise, PAGE};
use tessera_scope::{Contract, Scope};
use tessera_shape::PlacementHint;
use tracing::debug;

use crate::error::ShellResult;

/// Services that try to claim incoming requests, in registration order.
pub const ROUTE_HANDLER: Contract<dyn RouteHandler> = Contract::new("route-handler");

/// An incoming request, independent of the HTTP host.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub query: IndexMap<String, String>,
    pub headers: IndexMap<String, String>,
}

impl Request {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Seed values for the request scope.
    pub fn seed(&self) -> Map<String, Value> {
        let mut seed = Map::new();
        seed.insert("method".into(), Value::String(self.method.clone()));
        seed.insert("path".into(), Value::String(self.path.clone()));
        if let Some(host) = &self.host {
            seed.insert("host".into(), Value::String(host.clone()));
        }
        seed
    }
}

/// The shell's answer to a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: IndexMap<String, String>,
    pub body: String,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: IndexMap::new(),
            body: body.into(),
        }
    }

    pub fn html(body: impl Into<String>) -> Self {
        Self::new(200, body).with_header("content-type", "text/html; charset=utf-8")
    }

    pub fn not_found() -> Self {
        Self::new(404, "Not Found").with_header("content-type", "text/plain; charset=utf-8")
    }

    pub fn error() -> Self {
        Self::new(500, "Internal Server Error")
            .with_header("content-type", "text/plain; charset=utf-8")
    }

    pub fn unavailable() -> Self {
        Self::new(503, "Service Unavailable")
            .with_header("content-type", "text/plain; charset=utf-8")
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// State handed down the route-handler chain.
pub struct RequestContext {
    pub scope: Scope,
    pub request: Request,
    /// A complete response. When a handler sets it, the page is not rendered.
    pub response: Option<Response>,
}

impl RequestContext {
    pub fn new(scope: Scope, request: Request) -> Self {
        Self {
            scope,
            request,
            response: None,
        }
    }
}

#[async_trait]
pub trait RouteHandler: Send + Sync {
    /// Try to claim the request. Returns `true` if this handler took it,
    /// which stops the chain.
    async fn handle(&self, context: &mut RequestContext) -> ShellResult<bool>;
}

/// Serves content items by URL path.
///
/// `/blog/hello/` looks up the item `/blog/hello`. When the item exists, a
/// `shape-item-promise` for it is queued on the page, placed in the given
/// zone; otherwise the request is left for later handlers.
pub struct ContentRouteHandler {
    zone: String,
}

impl Default for ContentRouteHandler {
    fn default() -> Self {
        Self::new("main")
    }
}

impl ContentRouteHandler {
    pub fn new(zone: impl Into<String>) -> Self {
        Self { zone: zone.into() }
    }

    /// Content id for a URL path.
    pub fn content_id(path: &str) -> String {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        }
    }
}

#[async_trait]
impl RouteHandler for ContentRouteHandler {
    async fn handle(&self, context: &mut RequestContext) -> ShellResult<bool> {
        let Some(storage) = context.scope.require(&STORAGE_MANAGER) else {
            return Ok(false);
        };
        let id = Self::content_id(&context.request.path);
        if storage.get_available_item(&id).is_none() {
            storage.promise_to_get(&[id.as_str()], None);
            storage.fetch_content(&context.scope).await?;
        }
        if storage.get_available_item(&id).is_none() {
            debug!(%id, "no content for path");
            return Ok(false);
        }

        let Some(page) = context.scope.require(&PAGE) else {
            return Ok(false);
        };
        let shape = item_promise(id);
        shape.write().meta.placement = Some(PlacementHint::Spec(self.zone.clone()));
        page.add_shape(shape);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tessera_content::{ContentManager, ContentStore, InMemoryContentStore, CONTENT_STORE};
    use tessera_render::Page;
    use tessera_scope::ServiceDescriptor;
    use tessera_types::ContentItem;

    #[test]
    fn content_ids_from_paths() {
        assert_eq!(ContentRouteHandler::content_id("/"), "/");
        assert_eq!(ContentRouteHandler::content_id(""), "/");
        assert_eq!(ContentRouteHandler::content_id("/blog/hello/"), "/blog/hello");
        assert_eq!(ContentRouteHandler::content_id("/a?x=1"), "/a");
        assert_eq!(ContentRouteHandler::content_id("about"), "/about");
    }

    #[test]
    fn response_helpers() {
        assert!(Response::html("<p>").is_success());
        assert_eq!(Response::not_found().status, 404);
        assert_eq!(Response::error().status, 500);
        assert_eq!(
            Response::html("").headers.get("content-type").map(String::as_str),
            Some("text/html; charset=utf-8")
        );
    }

    fn scope() -> Scope {
        let scope = Scope::new("request");
        let store = InMemoryContentStore::new();
        store.insert(ContentItem::new("/about", "page"));
        scope.register(
            CONTENT_STORE.name(),
            ServiceDescriptor::value::<dyn ContentStore>(Arc::new(store)),
        );
        scope.register(STORAGE_MANAGER.name(), ContentManager::descriptor());
        scope.register(PAGE.name(), Page::descriptor());
        scope
    }

    #[tokio::test]
    async fn claims_paths_with_content() {
        let scope = scope();
        let mut context = RequestContext::new(scope.clone(), Request::get("/about/"));
        assert!(ContentRouteHandler::default().handle(&mut context).await.unwrap());
        assert_eq!(scope.require(&PAGE).unwrap().shape_count(), 1);
    }

    #[tokio::test]
    async fn leaves_unknown_paths() {
        let scope = scope();
        let mut context = RequestContext::new(scope.clone(), Request::get("/nope"));
        assert!(!ContentRouteHandler::default().handle(&mut context).await.unwrap());
        assert_eq!(scope.require(&PAGE).unwrap().shape_count(), 0);
    }
}
