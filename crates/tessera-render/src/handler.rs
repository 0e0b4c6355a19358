//! Per-shape and per-item handler chains.

use std::sync::Arc;

use async_trait::async_trait;
use tessera_content::STORAGE_MANAGER;
use tessera_placement::{PlacementContext, PLACEMENT_STRATEGY};
use tessera_scope::{Contract, Scope};
use tessera_shape::{ShapeMeta, ShapeRef};
use tessera_types::ContentItem;
use tracing::{debug, warn};

use crate::error::{RenderError, RenderResult};
use crate::stream::RenderStream;

/// Services run on every shape before the rendering strategy.
pub const SHAPE_HANDLER: Contract<dyn ShapeHandler> = Contract::new("shape-handler");

/// Services that turn a content item into child shapes.
pub const CONTENT_HANDLER: Contract<dyn ContentHandler> = Contract::new("content-handler");

/// Type of the id-only stand-in for content that is fetched on render.
pub const SHAPE_ITEM_PROMISE: &str = "shape-item-promise";

/// Type a content shape is morphed into once its item is attached.
pub const CONTENT: &str = "content";

/// A shape on its way through the handler chain.
pub struct ShapeContext<'a> {
    pub scope: Scope,
    pub shape: ShapeRef,
    /// The stream the shape renders into.
    pub stream: &'a mut RenderStream,
    /// Template name requested by the caller, tried after the shape's own.
    pub template: Option<String>,
    /// Set by a handler that rendered the shape itself.
    pub handled: bool,
}

#[async_trait]
pub trait ShapeHandler: Send + Sync {
    async fn handle(&self, context: &mut ShapeContext<'_>) -> RenderResult<()>;
}

/// A content item being expanded into shapes.
pub struct ContentContext {
    pub scope: Scope,
    pub item: Arc<ContentItem>,
    /// The content shape the item is attached to.
    pub shape: ShapeRef,
    /// Shapes produced so far, to be placed under `shape`.
    pub shapes: Vec<ShapeRef>,
}

#[async_trait]
pub trait ContentHandler: Send + Sync {
    async fn handle_item(&self, context: &mut ContentContext) -> RenderResult<()>;
}

// ---------------------------------------------------------------------------
// Zones
// ---------------------------------------------------------------------------

/// Renders a zone as its items in order, then its sub-zones.
pub struct ZoneHandler;

#[async_trait]
impl ShapeHandler for ZoneHandler {
    async fn handle(&self, context: &mut ShapeContext<'_>) -> RenderResult<()> {
        if !context.shape.is_zone() {
            return Ok(());
        }
        let shape = context.shape.clone();
        context.stream.children(&shape);
        context.handled = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Shape item promises
// ---------------------------------------------------------------------------

/// A placeholder for the item `id`, expanded when it is rendered.
pub fn item_promise(id: impl Into<String>) -> ShapeRef {
    let mut meta = ShapeMeta::new(SHAPE_ITEM_PROMISE);
    meta.id = Some(id.into());
    ShapeRef::new(meta)
}

/// Expands `shape-item-promise` placeholders in place.
///
/// The backing item is taken from the request's storage manager, fetching
/// it if nobody has yet. The placeholder then becomes a `content` shape and
/// its parts are built and placed before rendering continues, so a deferred
/// item needs no second page pass. Placeholders whose item cannot be found
/// render nothing.
pub struct ShapeItemPromiseHandler;

#[async_trait]
impl ShapeHandler for ShapeItemPromiseHandler {
    async fn handle(&self, context: &mut ShapeContext<'_>) -> RenderResult<()> {
        if context.shape.type_name() != SHAPE_ITEM_PROMISE {
            return Ok(());
        }
        let Some(id) = context.shape.id() else {
            warn!("shape-item-promise without an id");
            context.handled = true;
            return Ok(());
        };
        let Some(storage) = context.scope.require(&STORAGE_MANAGER) else {
            warn!(%id, "no storage manager to resolve shape-item-promise");
            context.handled = true;
            return Ok(());
        };

        let item = match storage.get_available_item(&id) {
            Some(item) => item,
            None => {
                storage.promise_to_get(&[id.as_str()], None);
                storage.fetch_content(&context.scope).await?;
                match storage.get_available_item(&id) {
                    Some(item) => item,
                    None => {
                        debug!(%id, "promised item not found");
                        context.handled = true;
                        return Ok(());
                    }
                }
            }
        };

        expand_content(&context.scope, &context.shape, item).await
    }
}

/// Turn `shape` into a `content` shape for `item`, then build and place its
/// part shapes.
pub async fn expand_content(
    scope: &Scope,
    shape: &ShapeRef,
    item: Arc<ContentItem>,
) -> RenderResult<()> {
    {
        let mut morphed = shape.write();
        morphed.meta.type_name = CONTENT.to_string();
        morphed.meta.id.get_or_insert_with(|| item.id.clone());
        morphed.temp.item = Some(Arc::clone(&item));
    }
    let type_name = item.type_name().to_string();
    if let Some(display_type) = shape.display_type() {
        shape.add_alternate(format!("content-{type_name}-{display_type}"));
    }
    shape.add_alternate(format!("content-{type_name}"));

    let mut content = ContentContext {
        scope: scope.clone(),
        item,
        shape: shape.clone(),
        shapes: Vec::new(),
    };
    scope
        .call_service(&CONTENT_HANDLER, &mut content, |handler, content| {
            Box::pin(async move { handler.handle_item(content).await })
        })
        .await?;

    let mut placement = PlacementContext::new(scope.clone(), shape.clone(), content.shapes);
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
    let id = shape.id().unwrap_or_default();
    debug!(%id, unplaced = placement.shapes.len(), "expanded content shape");
    Ok(())
}

// ---------------------------------------------------------------------------
// Parts
// ---------------------------------------------------------------------------

/// Makes one shape per content part.
///
/// The shape's type is the part's `meta.shape` or else the part name; its
/// name is the part name and `temp["part"]` holds the part value.
pub struct PartShapeHandler;

#[async_trait]
impl ContentHandler for PartShapeHandler {
    async fn handle_item(&self, context: &mut ContentContext) -> RenderResult<()> {
        let display_type = context.shape.display_type();
        for (name, part) in &context.item.parts {
            let mut meta = ShapeMeta::new(part.shape_type().unwrap_or(name.as_str()));
            meta.name = Some(name.clone());
            let shape = ShapeRef::new(meta);
            {
                let mut built = shape.write();
                built.temp.item = Some(Arc::clone(&context.item));
                built.temp.display_type = display_type.clone();
                built.temp.extra.insert("part".into(), part.to_value());
            }
            context.shapes.push(shape);
        }
        Ok(())
    }
}
