//! The page of a request and the lifecycle that renders it.

use std::sync::{Arc, Mutex};

use tessera_placement::{PlacementContext, PLACEMENT_STRATEGY};
use tessera_scope::{Contract, Lifecycle, Scope, ServiceDescriptor};
use tessera_shape::ShapeRef;
use tracing::{debug, info};

use crate::error::{RenderError, RenderResult};
use crate::resources::RESOURCE_REGISTRAR;
use crate::stream::RenderStream;

/// The request's page.
pub const PAGE: Contract<Page> = Contract::new("page");

/// Renders the request's page.
pub const PAGE_RENDERER: Contract<PageRenderer> = Contract::new("page-renderer");

/// Type of the root shape of every page.
pub const LAYOUT: &str = "layout";

/// Per-request page state: the layout root and the shapes route handlers
/// produced for it.
pub struct Page {
    layout: ShapeRef,
    shapes: Mutex<Vec<ShapeRef>>,
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Page {
    pub fn new() -> Self {
        Self {
            layout: ShapeRef::of_type(LAYOUT),
            shapes: Mutex::new(Vec::new()),
        }
    }

    pub fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor::singleton::<Page, _>(|_, _| Arc::new(Self::new()))
            .with_name("page")
            .in_scope("request")
    }

    pub fn layout(&self) -> &ShapeRef {
        &self.layout
    }

    /// Queue a shape for placement into the layout.
    pub fn add_shape(&self, shape: ShapeRef) {
        self.shapes.lock().expect("page lock poisoned").push(shape);
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.lock().expect("page lock poisoned").len()
    }

    fn take_shapes(&self) -> Vec<ShapeRef> {
        std::mem::take(&mut *self.shapes.lock().expect("page lock poisoned"))
    }
}

/// State threaded through the page lifecycle.
pub struct PageContext {
    pub scope: Scope,
    /// Root of the page's shape tree.
    pub layout: ShapeRef,
    /// Shapes still waiting for placement.
    pub shapes: Vec<ShapeRef>,
    /// Final output, set by the render step.
    pub html: Option<String>,
}

impl PageContext {
    pub fn new(scope: Scope, layout: ShapeRef, shapes: Vec<ShapeRef>) -> Self {
        Self {
            scope,
            layout,
            shapes,
            html: None,
        }
    }
}

/// The page lifecycle.
///
/// Steps run strictly in order:
/// 1. `placement` hands the page's shapes to every `placement-strategy`;
/// 2. `resource-registrar` services add meta tags, styles and scripts;
/// 3. `render` streams the layout, running the `shape-handler` chain and
///    the rendering strategy on every shape.
pub struct PageRenderer {
    lifecycle: Lifecycle<PageContext, RenderError>,
}

impl Default for PageRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PageRenderer {
    pub fn new() -> Self {
        let lifecycle = Lifecycle::<PageContext, RenderError>::new()
            .step("placement", |scope, context| {
                Box::pin(async move { place_page_shapes(scope, context).await })
            })
            .service(RESOURCE_REGISTRAR, |registrar, context| {
                Box::pin(async move { registrar.register_resources(context).await })
            })
            .step("render", |scope, context| {
                Box::pin(async move {
                    let mut stream = RenderStream::new(scope.clone());
                    stream.shape(&context.layout);
                    stream.flush().await?;
                    context.html = Some(stream.into_output());
                    Ok(())
                })
            });
        Self { lifecycle }
    }

    pub fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor::value::<PageRenderer>(Arc::new(Self::new())).with_name("page-renderer")
    }

    pub fn labels(&self) -> Vec<&str> {
        self.lifecycle.labels()
    }

    /// Run the lifecycle over the request's [`Page`] and return the HTML.
    pub async fn render(&self, scope: &Scope) -> RenderResult<String> {
        let page = scope.require(&PAGE).unwrap_or_else(|| Arc::new(Page::new()));
        let mut context = PageContext::new(scope.clone(), page.layout().clone(), page.take_shapes());
        self.lifecycle.run(scope, &mut context).await?;
        let html = context.html.unwrap_or_default();
        info!(scope = scope.name(), bytes = html.len(), "rendered page");
        Ok(html)
    }
}

async fn place_page_shapes(scope: &Scope, context: &mut PageContext) -> RenderResult<()> {
    let shapes = std::mem::take(&mut context.shapes);
    let mut placement = PlacementContext::new(scope.clone(), context.layout.clone(), shapes);
    scope
        .call_service(&PLACEMENT_STRATEGY, &mut placement, |strategy, placement| {
            Box::pin(async move {
                strategy
                    .place_shapes(placement)
                    .await
                    .map_err(RenderError::from)
            })
        })
        .await?;
    if !placement.shapes.is_empty() {
        debug!(unplaced = placement.shapes.len(), "shapes left out of the page");
    }
    context.shapes = placement.shapes;
    Ok(())
}

/// Render the request's page with the registered renderer, or the stock
/// lifecycle if none is registered.
pub async fn render_page(scope: &Scope) -> RenderResult<String> {
    match scope.require(&PAGE_RENDERER) {
        Some(renderer) => renderer.render(scope).await,
        None => PageRenderer::new().render(scope).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use tessera_content::{
        ContentManager, ContentStore, InMemoryContentStore, CONTENT_STORE, STORAGE_MANAGER,
    };
    use tessera_placement::{PlacementStrategy, RulePlacementStrategy, Target};
    use tessera_shape::PlacementHint;
    use tessera_types::{ContentItem, ContentPart};

    use crate::engine::{CodeViewEngine, ViewEngine, VIEW_ENGINE};
    use crate::handler::{
        item_promise, ContentHandler, PartShapeHandler, ShapeHandler, ShapeItemPromiseHandler,
        ZoneHandler, CONTENT_HANDLER, SHAPE_HANDLER,
    };
    use crate::resources::{ResourceRegistrar, ResourceRegistry, RESOURCE_REGISTRY};
    use crate::strategy::{RenderingStrategy, TemplateRenderingStrategy, RENDERING_STRATEGY};

    struct SiteResources;

    #[async_trait]
    impl ResourceRegistrar for SiteResources {
        async fn register_resources(&self, context: &mut PageContext) -> RenderResult<()> {
            if let Some(registry) = context.scope.require(&RESOURCE_REGISTRY) {
                registry.add_style("/site.css");
                registry.add_meta([("name", "generator"), ("content", "tessera")]);
            }
            context
                .layout
                .write()
                .meta
                .extra
                .insert("title".into(), json!("Home"));
            Ok(())
        }
    }

    fn request_scope() -> Scope {
        let scope = Scope::new("request");
        let store = InMemoryContentStore::new();
        store.insert(
            ContentItem::new("/foo", "page")
                .with_part("title", json!("Hello & co"))
                .with_part("body", ContentPart::text("Body")),
        );
        scope.register(
            CONTENT_STORE.name(),
            ServiceDescriptor::value::<dyn ContentStore>(Arc::new(store)),
        );
        scope.register(STORAGE_MANAGER.name(), ContentManager::descriptor());
        scope.register(PAGE.name(), Page::descriptor());
        scope.register(RESOURCE_REGISTRY.name(), ResourceRegistry::descriptor());
        scope.register(
            RESOURCE_REGISTRAR.name(),
            ServiceDescriptor::value::<dyn ResourceRegistrar>(Arc::new(SiteResources)),
        );
        scope.register(
            SHAPE_HANDLER.name(),
            ServiceDescriptor::value::<dyn ShapeHandler>(Arc::new(ShapeItemPromiseHandler)),
        );
        scope.register(
            SHAPE_HANDLER.name(),
            ServiceDescriptor::value::<dyn ShapeHandler>(Arc::new(ZoneHandler)),
        );
        scope.register(
            CONTENT_HANDLER.name(),
            ServiceDescriptor::value::<dyn ContentHandler>(Arc::new(PartShapeHandler)),
        );
        scope.register(
            RENDERING_STRATEGY.name(),
            ServiceDescriptor::value::<dyn RenderingStrategy>(Arc::new(
                TemplateRenderingStrategy::new(),
            )),
        );
        scope.register(
            VIEW_ENGINE.name(),
            ServiceDescriptor::value::<dyn ViewEngine>(Arc::new(CodeViewEngine::with_defaults())),
        );
        let placement = RulePlacementStrategy::new()
            .with_type("title", Target::new("header", "1"))
            .with_type("body", Target::new("main", "1"));
        scope.register(
            PLACEMENT_STRATEGY.name(),
            ServiceDescriptor::value::<dyn PlacementStrategy>(Arc::new(placement)),
        );
        scope
    }

    #[test]
    fn lifecycle_step_order() {
        assert_eq!(
            PageRenderer::new().labels(),
            vec!["placement", "resource-registrar", "render"]
        );
    }

    #[tokio::test]
    async fn renders_a_deferred_item_into_the_layout() {
        let scope = request_scope();
        let promise = item_promise("/foo");
        promise.write().meta.placement = Some(PlacementHint::Spec("main:1".into()));
        scope.require(&PAGE).unwrap().add_shape(promise);

        let html = render_page(&scope).await.unwrap();

        assert!(html.starts_with("<!DOCTYPE html>\n"));
        assert!(html.contains("<title>Home</title>"));
        assert!(html.contains("<meta name=\"generator\" content=\"tessera\">"));
        assert!(html.contains("<link rel=\"stylesheet\" href=\"/site.css\">"));
        let article = html.find("<article data-id=\"/foo\">").unwrap();
        let title = html.find("<h1>Hello &amp; co</h1>").unwrap();
        let body = html.find("<div class=\"text\">Body</div>").unwrap();
        assert!(article < title && title < body);
        assert!(html.trim_end().ends_with("</html>"));
    }

    #[tokio::test]
    async fn unplaced_shapes_are_not_rendered() {
        let scope = request_scope();
        let stray = ShapeRef::of_type("stray");
        stray.set_html("<p>stray</p>");
        scope.require(&PAGE).unwrap().add_shape(stray);

        let html = render_page(&scope).await.unwrap();
        assert!(!html.contains("stray"));
        assert_eq!(scope.require(&PAGE).unwrap().shape_count(), 0);
    }

    #[tokio::test]
    async fn missing_content_renders_an_empty_layout() {
        let scope = request_scope();
        let promise = item_promise("/missing");
        promise.write().meta.placement = Some(PlacementHint::Spec("main".into()));
        scope.require(&PAGE).unwrap().add_shape(promise);

        let html = render_page(&scope).await.unwrap();
        assert!(!html.contains("<article"));
        assert!(html.contains("<body>"));
    }
}
