//! Rendering for Tessera.
//!
//! A request's page is rendered by the [`PageRenderer`] lifecycle: loose
//! shapes are placed into the layout tree, resource registrars run, and the
//! layout is streamed through a [`RenderStream`]. Every shape the stream
//! meets goes through the `shape-handler` chain ([`ZoneHandler`],
//! [`ShapeItemPromiseHandler`], ...) and, unless a handler claims it, the
//! `rendering-strategy` service, which finds a [`Template`] by name.
//!
//! # Contracts
//!
//! | Contract | Trait | Stock implementation |
//! |---|---|---|
//! | `shape-handler` | [`ShapeHandler`] | [`ZoneHandler`], [`ShapeItemPromiseHandler`] |
//! | `content-handler` | [`ContentHandler`] | [`PartShapeHandler`] |
//! | `rendering-strategy` | [`RenderingStrategy`] | [`TemplateRenderingStrategy`] |
//! | `view-engine` | [`ViewEngine`] | [`CodeViewEngine`], [`RawViewEngine`] |
//! | `template-resolver` | [`TemplateResolver`] | [`ModuleTemplateResolver`] |
//! | `resource-registrar` | [`ResourceRegistrar`] | none |

pub mod engine;
pub mod error;
pub mod handler;
pub mod page;
pub mod resources;
pub mod strategy;
pub mod stream;

pub use engine::{
    part_text, template, CodeViewEngine, FnTemplate, ModuleTemplateResolver, RawViewEngine,
    Template, TemplateResolver, ViewEngine, TEMPLATE_RESOLVER, VIEW_ENGINE,
};
pub use error::{RenderError, RenderResult};
pub use handler::{
    expand_content, item_promise, ContentContext, ContentHandler, PartShapeHandler, ShapeContext,
    ShapeHandler, ShapeItemPromiseHandler, ZoneHandler, CONTENT, CONTENT_HANDLER, SHAPE_HANDLER,
    SHAPE_ITEM_PROMISE,
};
pub use page::{render_page, Page, PageContext, PageRenderer, LAYOUT, PAGE, PAGE_RENDERER};
pub use resources::{
    encode, ResourceKind, ResourceRegistrar, ResourceRegistry, RESOURCE_REGISTRAR,
    RESOURCE_REGISTRY,
};
pub use strategy::{RenderingStrategy, TemplateRenderingStrategy, RENDERING_STRATEGY};
pub use stream::{RenderStream, MAX_DEPTH};
