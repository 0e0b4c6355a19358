//! Templates, view engines and template file resolution.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tessera_scope::Contract;
use tessera_shape::ShapeRef;
use tracing::debug;

use crate::error::{RenderError, RenderResult};
use crate::resources::ResourceKind;
use crate::stream::RenderStream;

/// Engines that turn template files (or registered values) into templates.
pub const VIEW_ENGINE: Contract<dyn ViewEngine> = Contract::new("view-engine");

/// Finds the template file for a name.
pub const TEMPLATE_RESOLVER: Contract<dyn TemplateResolver> = Contract::new("template-resolver");

/// A loaded template: expands one shape onto a stream.
#[async_trait]
pub trait Template: Send + Sync {
    async fn render(&self, shape: &ShapeRef, stream: &mut RenderStream) -> RenderResult<()>;
}

/// Template backed by a closure that queues output on the stream.
pub struct FnTemplate<F>(pub F);

#[async_trait]
impl<F> Template for FnTemplate<F>
where
    F: Fn(&ShapeRef, &mut RenderStream) -> RenderResult<()> + Send + Sync,
{
    async fn render(&self, shape: &ShapeRef, stream: &mut RenderStream) -> RenderResult<()> {
        (self.0)(shape, stream)
    }
}

/// Wrap a closure as a shareable template.
pub fn template<F>(f: F) -> Arc<dyn Template>
where
    F: Fn(&ShapeRef, &mut RenderStream) -> RenderResult<()> + Send + Sync + 'static,
{
    Arc::new(FnTemplate(f))
}

#[async_trait]
pub trait ViewEngine: Send + Sync {
    /// File extension this engine loads, without the dot.
    fn extension(&self) -> &str;

    /// A template held in memory under `name`, if the engine has one.
    fn find(&self, _name: &str) -> Option<Arc<dyn Template>> {
        None
    }

    async fn load(&self, path: &Path) -> RenderResult<Arc<dyn Template>>;
}

#[async_trait]
pub trait TemplateResolver: Send + Sync {
    /// Path of the template file for `name` with one of `extensions`.
    async fn resolve(&self, name: &str, extensions: &[String]) -> Option<PathBuf>;
}

// ---------------------------------------------------------------------------
// Code templates
// ---------------------------------------------------------------------------

/// Templates written in Rust and registered by name.
///
/// A `views/<name>.code` file resolves to the template registered as
/// `<name>`, which lets a module switch a code template on by shipping the
/// marker file.
#[derive(Default)]
pub struct CodeViewEngine {
    templates: RwLock<HashMap<String, Arc<dyn Template>>>,
}

impl CodeViewEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine preloaded with the stock `layout`, `content` and part templates.
    pub fn with_defaults() -> Self {
        let engine = Self::new();
        engine.register("layout", template(render_layout));
        engine.register("content", template(render_content));
        engine.register(
            "title",
            template(|shape, stream| {
                stream.tag("h1", &[], &part_text(shape).unwrap_or_default());
                Ok(())
            }),
        );
        for name in ["body", "text"] {
            engine.register(
                name,
                template(|shape, stream| {
                    stream.tag("div", &[("class", "text")], &part_text(shape).unwrap_or_default());
                    Ok(())
                }),
            );
        }
        engine
    }

    pub fn register(&self, name: impl Into<String>, template: Arc<dyn Template>) {
        self.templates
            .write()
            .expect("template lock poisoned")
            .insert(name.into(), template);
    }
}

#[async_trait]
impl ViewEngine for CodeViewEngine {
    fn extension(&self) -> &str {
        "code"
    }

    fn find(&self, name: &str) -> Option<Arc<dyn Template>> {
        self.templates
            .read()
            .expect("template lock poisoned")
            .get(name)
            .cloned()
    }

    async fn load(&self, path: &Path) -> RenderResult<Arc<dyn Template>> {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.find(&name).ok_or_else(|| RenderError::Template {
            template: name,
            message: format!("no code template registered for {}", path.display()),
        })
    }
}

fn render_layout(shape: &ShapeRef, stream: &mut RenderStream) -> RenderResult<()> {
    let title = shape
        .lookup("meta.title")
        .and_then(|v| v.as_str().map(str::to_string));
    stream
        .write_line("<!DOCTYPE html>")
        .write_line("<html>")
        .write_line("<head>")
        .resources(ResourceKind::Meta);
    if let Some(title) = title {
        stream.tag("title", &[], &title).write_line("");
    }
    stream
        .resources(ResourceKind::Style)
        .write_line("</head>")
        .write_line("<body>")
        .children(shape)
        .resources(ResourceKind::Script)
        .write_line("</body>")
        .write_line("</html>");
    Ok(())
}

fn render_content(shape: &ShapeRef, stream: &mut RenderStream) -> RenderResult<()> {
    let id = shape.item().map(|item| item.id.clone()).unwrap_or_default();
    stream
        .start_tag("article", &[("data-id", id.as_str())])
        .children(shape)
        .end_tag("article");
    Ok(())
}

/// Text of the content part a part shape renders.
pub fn part_text(shape: &ShapeRef) -> Option<String> {
    match shape.temp_value("part")? {
        Value::String(text) => Some(text),
        Value::Object(map) => map.get("text").and_then(Value::as_str).map(str::to_string),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Raw HTML templates
// ---------------------------------------------------------------------------

/// Loads `.html` files and emits them verbatim.
#[derive(Default)]
pub struct RawViewEngine;

struct RawTemplate(String);

#[async_trait]
impl Template for RawTemplate {
    async fn render(&self, _shape: &ShapeRef, stream: &mut RenderStream) -> RenderResult<()> {
        stream.write(self.0.clone());
        Ok(())
    }
}

#[async_trait]
impl ViewEngine for RawViewEngine {
    fn extension(&self) -> &str {
        "html"
    }

    async fn load(&self, path: &Path) -> RenderResult<Arc<dyn Template>> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| RenderError::TemplateLoad {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), "loaded raw template");
        Ok(Arc::new(RawTemplate(text)))
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Looks for `<name>.<ext>` in a list of view directories, first hit wins.
///
/// The shell passes the site's `views/` first, then each loaded module's
/// `views/` with later modules (themes) ahead of earlier ones.
#[derive(Clone, Debug, Default)]
pub struct ModuleTemplateResolver {
    dirs: Vec<PathBuf>,
}

impl ModuleTemplateResolver {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }
}

#[async_trait]
impl TemplateResolver for ModuleTemplateResolver {
    async fn resolve(&self, name: &str, extensions: &[String]) -> Option<PathBuf> {
        for dir in &self.dirs {
            for extension in extensions {
                let path = dir.join(format!("{name}.{extension}"));
                if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    return Some(path);
                }
            }
        }
        None
    }
}
