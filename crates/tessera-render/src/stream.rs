//! The sequential render output sink.

use std::collections::VecDeque;

use tessera_scope::{BoxFuture, Scope};
use tessera_shape::ShapeRef;
use tracing::trace;

use crate::error::{RenderError, RenderResult};
use crate::handler::{ShapeContext, SHAPE_HANDLER};
use crate::resources::{encode, ResourceKind, RESOURCE_REGISTRY};
use crate::strategy::RENDERING_STRATEGY;

/// Deepest shape nesting a stream will render.
pub const MAX_DEPTH: usize = 64;

enum Op {
    Text(String),
    Shape {
        shape: ShapeRef,
        display_type: Option<String>,
        template: Option<String>,
    },
    Resources(ResourceKind),
}

/// Ordered output sink for rendering a shape tree.
///
/// Write calls only queue operations; [`flush`](Self::flush) runs them one
/// at a time, each completing (including any nested shape rendering and
/// template loading) before the next starts. A queued shape renders into a
/// child stream whose output is appended in place, so document order
/// follows call order no matter where rendering suspends.
pub struct RenderStream {
    scope: Scope,
    queue: VecDeque<Op>,
    output: String,
    depth: usize,
}

impl RenderStream {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            queue: VecDeque::new(),
            output: String::new(),
            depth: 0,
        }
    }

    fn child(&self) -> Self {
        Self {
            scope: self.scope.clone(),
            queue: VecDeque::new(),
            output: String::new(),
            depth: self.depth + 1,
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Queue raw text.
    pub fn write(&mut self, text: impl Into<String>) -> &mut Self {
        self.queue.push_back(Op::Text(text.into()));
        self
    }

    /// Queue HTML-escaped text.
    pub fn write_encoded(&mut self, text: &str) -> &mut Self {
        self.write(encode(text))
    }

    pub fn write_line(&mut self, text: &str) -> &mut Self {
        self.write(format!("{text}\n"))
    }

    pub fn start_tag(&mut self, name: &str, attributes: &[(&str, &str)]) -> &mut Self {
        let mut tag = format!("<{name}");
        for (key, value) in attributes {
            tag.push_str(&format!(" {key}=\"{}\"", encode(value)));
        }
        tag.push('>');
        self.write(tag)
    }

    pub fn end_tag(&mut self, name: &str) -> &mut Self {
        self.write(format!("</{name}>"))
    }

    /// Queue a complete element with encoded `content`.
    pub fn tag(&mut self, name: &str, attributes: &[(&str, &str)], content: &str) -> &mut Self {
        self.start_tag(name, attributes)
            .write_encoded(content)
            .end_tag(name)
    }

    /// Queue a shape for rendering.
    pub fn shape(&mut self, shape: &ShapeRef) -> &mut Self {
        self.shape_as(shape, None, None)
    }

    /// Queue a shape with a display type and/or an explicit template name.
    pub fn shape_as(
        &mut self,
        shape: &ShapeRef,
        display_type: Option<&str>,
        template: Option<&str>,
    ) -> &mut Self {
        self.queue.push_back(Op::Shape {
            shape: shape.clone(),
            display_type: display_type.map(str::to_string),
            template: template.map(str::to_string),
        });
        self
    }

    /// Queue `parent`'s zone `name`, if it exists.
    pub fn zone(&mut self, parent: &ShapeRef, name: &str) -> &mut Self {
        if let Some(zone) = parent.child_zone(name) {
            self.shape(&zone);
        }
        self
    }

    /// Queue every item of `parent`, then every zone.
    pub fn children(&mut self, parent: &ShapeRef) -> &mut Self {
        for child in parent.children() {
            self.shape(&child);
        }
        self
    }

    /// Queue the request's registered resources of `kind`.
    pub fn resources(&mut self, kind: ResourceKind) -> &mut Self {
        self.queue.push_back(Op::Resources(kind));
        self
    }

    /// Run queued operations in order until the queue is empty.
    pub fn flush(&mut self) -> BoxFuture<'_, RenderResult<()>> {
        Box::pin(async move {
            while let Some(op) = self.queue.pop_front() {
                match op {
                    Op::Text(text) => self.output.push_str(&text),
                    Op::Resources(kind) => {
                        if let Some(registry) = self.scope.require(&RESOURCE_REGISTRY) {
                            self.output.push_str(&registry.render(kind));
                        }
                    }
                    Op::Shape {
                        shape,
                        display_type,
                        template,
                    } => {
                        if self.depth >= MAX_DEPTH {
                            return Err(RenderError::TooDeep(MAX_DEPTH));
                        }
                        let mut child = self.child();
                        render_shape(&mut child, shape, display_type, template).await?;
                        child.flush().await?;
                        self.output.push_str(&child.output);
                    }
                }
            }
            Ok(())
        })
    }

    /// Output produced by flushed operations so far.
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn into_output(self) -> String {
        self.output
    }
}

/// Run the `shape-handler` chain on `shape`, then the rendering strategy
/// unless a handler claimed it.
async fn render_shape(
    stream: &mut RenderStream,
    shape: ShapeRef,
    display_type: Option<String>,
    template: Option<String>,
) -> RenderResult<()> {
    if let Some(display_type) = display_type {
        shape.set_display_type(display_type);
    }
    trace!(shape = ?shape, depth = stream.depth, "rendering shape");

    let scope = stream.scope.clone();
    let mut context = ShapeContext {
        scope: scope.clone(),
        shape,
        stream,
        template,
        handled: false,
    };
    scope
        .call_service(&SHAPE_HANDLER, &mut context, |handler, context| {
            Box::pin(async move {
                if context.handled {
                    return Ok(());
                }
                handler.handle(context).await
            })
        })
        .await?;

    if !context.handled {
        if let Some(strategy) = scope.require(&RENDERING_STRATEGY) {
            strategy.render(&mut context).await?;
        }
    }
    Ok(())
}
