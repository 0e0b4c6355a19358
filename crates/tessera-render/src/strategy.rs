use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tessera_scope::{Contract, Scope};
use tessera_shape::ShapeRef;
use tracing::{debug, trace};

use crate::engine::{Template, ViewEngine, TEMPLATE_RESOLVER, VIEW_ENGINE};
use crate::error::RenderResult;
use crate::handler::ShapeContext;

/// Renders a shape no handler claimed.
pub const RENDERING_STRATEGY: Contract<dyn RenderingStrategy> =
    Contract::new("rendering-strategy");

#[async_trait]
pub trait RenderingStrategy: Send + Sync {
    async fn render(&self, context: &mut ShapeContext<'_>) -> RenderResult<()>;
}

/// Template lookup by name.
///
/// Candidates, first hit wins: every alternate in the order the shape lists
/// them, then the type name, then the caller's explicit template. Each
/// candidate is looked up as a file through the `template-resolver` service
/// and then in memory (`find` on every view engine), so a view file in the
/// site or a theme overrides a built-in template. Resolved templates are
/// cached by name for as long as the strategy lives, which for the shell's
/// registration is the shell's lifetime.
#[derive(Default)]
pub struct TemplateRenderingStrategy {
    cache: RwLock<HashMap<String, Arc<dyn Template>>>,
}

impl TemplateRenderingStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names tried for `shape`, in priority order and without repeats.
    pub fn candidates(shape: &ShapeRef, explicit: Option<&str>) -> Vec<String> {
        let mut names = shape.alternates();
        names.push(shape.type_name());
        if let Some(explicit) = explicit {
            names.push(explicit.to_string());
        }
        let mut seen = Vec::with_capacity(names.len());
        names.retain(|name| {
            if name.is_empty() || seen.contains(name) {
                return false;
            }
            seen.push(name.clone());
            true
        });
        names
    }

    pub fn cached(&self) -> usize {
        self.cache.read().expect("template cache lock poisoned").len()
    }

    async fn resolve(
        &self,
        scope: &Scope,
        engines: &[Arc<dyn ViewEngine>],
        name: &str,
    ) -> RenderResult<Option<Arc<dyn Template>>> {
        let cached = self
            .cache
            .read()
            .expect("template cache lock poisoned")
            .get(name)
            .cloned();
        if cached.is_some() {
            return Ok(cached);
        }

        let mut found = None;
        if let Some(resolver) = scope.require(&TEMPLATE_RESOLVER) {
            let extensions: Vec<String> =
                engines.iter().map(|e| e.extension().to_string()).collect();
            if let Some(path) = resolver.resolve(name, &extensions).await {
                let extension = path
                    .extension()
                    .map(|ext| ext.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if let Some(engine) = engines.iter().find(|e| e.extension() == extension) {
                    debug!(template = name, path = %path.display(), "loading template");
                    found = Some(engine.load(&path).await?);
                }
            }
        }
        if found.is_none() {
            found = engines.iter().find_map(|engine| engine.find(name));
        }

        if let Some(template) = &found {
            self.cache
                .write()
                .expect("template cache lock poisoned")
                .insert(name.to_string(), Arc::clone(template));
        }
        Ok(found)
    }
}

#[async_trait]
impl RenderingStrategy for TemplateRenderingStrategy {
    async fn render(&self, context: &mut ShapeContext<'_>) -> RenderResult<()> {
        if let Some(html) = context.shape.html() {
            context.stream.write(html);
            return Ok(());
        }

        let engines = context.scope.get_services(&VIEW_ENGINE);
        for name in Self::candidates(&context.shape, context.template.as_deref()) {
            if let Some(template) = self.resolve(&context.scope, &engines, &name).await? {
                trace!(template = %name, shape = ?context.shape, "rendering with template");
                return template.render(&context.shape, &mut *context.stream).await;
            }
        }
        trace!(shape = ?context.shape, "no template");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{template, CodeViewEngine, ModuleTemplateResolver, RawViewEngine};
    use crate::stream::RenderStream;
    use tessera_scope::ServiceDescriptor;
    use tessera_shape::ShapeMeta;

    fn scope_with(code: CodeViewEngine, views: Option<&std::path::Path>) -> Scope {
        let scope = Scope::new("request");
        scope.register(
            VIEW_ENGINE.name(),
            ServiceDescriptor::value::<dyn ViewEngine>(Arc::new(code)),
        );
        scope.register(
            VIEW_ENGINE.name(),
            ServiceDescriptor::value::<dyn ViewEngine>(Arc::new(RawViewEngine)),
        );
        if let Some(dir) = views {
            scope.register(
                TEMPLATE_RESOLVER.name(),
                ServiceDescriptor::value::<dyn crate::engine::TemplateResolver>(Arc::new(
                    ModuleTemplateResolver::new(vec![dir.to_path_buf()]),
                )),
            );
        }
        scope
    }

    async fn render(
        strategy: &TemplateRenderingStrategy,
        scope: &Scope,
        shape: &ShapeRef,
        explicit: Option<&str>,
    ) -> String {
        let mut stream = RenderStream::new(scope.clone());
        let mut context = ShapeContext {
            scope: scope.clone(),
            shape: shape.clone(),
            stream: &mut stream,
            template: explicit.map(str::to_string),
            handled: false,
        };
        strategy.render(&mut context).await.unwrap();
        stream.flush().await.unwrap();
        stream.into_output()
    }

    fn labelled(label: &'static str) -> Arc<dyn Template> {
        template(move |_, stream| {
            stream.write(label);
            Ok(())
        })
    }

    #[test]
    fn candidate_order() {
        let mut meta = ShapeMeta::new("content");
        meta.alternates = vec!["content-page-summary".into(), "content-page".into()];
        let shape = ShapeRef::new(meta);
        assert_eq!(
            TemplateRenderingStrategy::candidates(&shape, Some("content-page")),
            vec!["content-page-summary", "content-page", "content"]
        );
    }

    #[tokio::test]
    async fn alternates_beat_type_name() {
        let code = CodeViewEngine::new();
        code.register("content", labelled("generic"));
        code.register("content-page", labelled("page"));
        let scope = scope_with(code, None);
        let strategy = TemplateRenderingStrategy::new();

        let shape = ShapeRef::of_type("content");
        assert_eq!(render(&strategy, &scope, &shape, None).await, "generic");
        shape.add_alternate("content-page");
        assert_eq!(render(&strategy, &scope, &shape, None).await, "page");
    }

    #[tokio::test]
    async fn explicit_template_is_a_last_resort() {
        let code = CodeViewEngine::new();
        code.register("fallback", labelled("fallback"));
        let scope = scope_with(code, None);
        let strategy = TemplateRenderingStrategy::new();
        let shape = ShapeRef::of_type("unknown");
        assert_eq!(render(&strategy, &scope, &shape, Some("fallback")).await, "fallback");
        assert_eq!(render(&strategy, &scope, &shape, None).await, "");
    }

    #[tokio::test]
    async fn pre_rendered_html_wins() {
        let code = CodeViewEngine::new();
        code.register("widget", labelled("template"));
        let scope = scope_with(code, None);
        let shape = ShapeRef::of_type("widget");
        shape.set_html("<b>cached</b>");
        let out = render(&TemplateRenderingStrategy::new(), &scope, &shape, None).await;
        assert_eq!(out, "<b>cached</b>");
    }

    #[tokio::test]
    async fn files_are_resolved_once_then_cached() {
        let views = tempfile::tempdir().unwrap();
        let path = views.path().join("hero.html");
        std::fs::write(&path, "<div>v1</div>").unwrap();
        let scope = scope_with(CodeViewEngine::new(), Some(views.path()));
        let strategy = TemplateRenderingStrategy::new();
        let shape = ShapeRef::of_type("hero");

        assert_eq!(render(&strategy, &scope, &shape, None).await, "<div>v1</div>");
        assert_eq!(strategy.cached(), 1);

        std::fs::write(&path, "<div>v2</div>").unwrap();
        assert_eq!(render(&strategy, &scope, &shape, None).await, "<div>v1</div>");
    }

    #[tokio::test]
    async fn view_files_override_registered_templates() {
        let views = tempfile::tempdir().unwrap();
        std::fs::write(views.path().join("title.html"), "<h1>file</h1>").unwrap();
        let scope = scope_with(CodeViewEngine::with_defaults(), Some(views.path()));
        let out = render(
            &TemplateRenderingStrategy::new(),
            &scope,
            &ShapeRef::of_type("title"),
            None,
        )
        .await;
        assert_eq!(out, "<h1>file</h1>");
    }

    #[tokio::test]
    async fn code_marker_files_select_registered_templates() {
        let views = tempfile::tempdir().unwrap();
        std::fs::write(views.path().join("banner.code"), "").unwrap();
        let code = CodeViewEngine::new();
        code.register("banner", labelled("banner"));
        let scope = scope_with(code, Some(views.path()));
        let shape = ShapeRef::of_type("promo");
        shape.add_alternate("banner");
        let out = render(&TemplateRenderingStrategy::new(), &scope, &shape, None).await;
        assert_eq!(out, "banner");
    }
}
