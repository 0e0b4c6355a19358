use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use serde_json::Value;
use tessera_content::{
    ContentManager, ContentStore, JsonDirContentStore, CONTENT_STORE, STORAGE_MANAGER,
};
use tessera_placement::{
    PlacementConfig, PlacementStrategy, RulePlacementStrategy, PLACEMENT_STRATEGY,
};
use tessera_render::{
    render_page, CodeViewEngine, ContentHandler, ModuleTemplateResolver, Page, PageRenderer,
    PartShapeHandler, RawViewEngine, RenderingStrategy, ResourceRegistry, ShapeHandler,
    ShapeItemPromiseHandler, TemplateRenderingStrategy, TemplateResolver, ViewEngine,
    ZoneHandler, CONTENT_HANDLER, PAGE, PAGE_RENDERER, RENDERING_STRATEGY, RESOURCE_REGISTRY,
    SHAPE_HANDLER, TEMPLATE_RESOLVER, VIEW_ENGINE,
};
use tessera_scope::{EventPayload, Scope, ScopeEvent, ServiceDescriptor};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::catalog::ServiceCatalog;
use crate::error::{ShellError, ShellResult};
use crate::localize::{IdentityLocalizer, Localizer, LOCALIZER};
use crate::manifest::{self, ModuleManifest};
use crate::request::{
    ContentRouteHandler, Request, RequestContext, Response, RouteHandler, ROUTE_HANDLER,
};
use crate::settings::ShellSettings;

/// Name of the shell-level scope.
pub const SHELL_SCOPE: &str = "shell";

/// Name of every request scope.
pub const REQUEST_SCOPE: &str = tessera_content::REQUEST_SCOPE;

#[derive(Default)]
struct LoadState {
    loaded: bool,
    /// Why the load failed. Set once, never retried.
    failure: Option<String>,
    /// Manifests of every module that was loaded, in load order.
    manifests: IndexMap<String, ModuleManifest>,
    /// Modules that contributed a service or are themes, in load order.
    modules: Vec<String>,
    /// Catalog keys already registered.
    registered: HashSet<String>,
}

/// One tenant: a site's settings, its loaded modules and the shell scope
/// that request scopes hang off.
pub struct Shell {
    scope: Scope,
    settings: ShellSettings,
    available: IndexMap<String, ModuleManifest>,
    catalog: Arc<ServiceCatalog>,
    state: RwLock<LoadState>,
    /// Held for the whole of a load, including the `shell-loaded` emit.
    load_lock: Mutex<()>,
}

impl Shell {
    pub fn new(
        settings: ShellSettings,
        available: IndexMap<String, ModuleManifest>,
        catalog: Arc<ServiceCatalog>,
    ) -> Self {
        let scope = Scope::new(SHELL_SCOPE);
        scope.set_value("shell", Value::String(settings.name.clone()));
        Self {
            scope,
            settings,
            available,
            catalog,
            state: RwLock::new(LoadState::default()),
            load_lock: Mutex::new(()),
        }
    }

    /// Open the site in `site_dir`, discovering modules under each of
    /// `module_roots` and the site's own `modules/` directory.
    pub fn open(
        site_dir: &Path,
        module_roots: &[PathBuf],
        catalog: Arc<ServiceCatalog>,
    ) -> ShellResult<Self> {
        let settings = ShellSettings::from_dir(site_dir)?;
        let mut roots = vec![site_dir.join("modules")];
        roots.extend(module_roots.iter().cloned());
        let available = manifest::discover(&roots)?;
        info!(
            shell = %settings.name,
            modules = available.len(),
            "opened site"
        );
        Ok(Self::new(settings, available, catalog))
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn settings(&self) -> &ShellSettings {
        &self.settings
    }

    pub fn is_active(&self) -> bool {
        self.settings.active
    }

    pub fn is_loaded(&self) -> bool {
        self.state.read().expect("shell lock poisoned").loaded
    }

    /// The error that stopped this shell from loading, if any.
    pub fn load_failure(&self) -> Option<String> {
        self.state.read().expect("shell lock poisoned").failure.clone()
    }

    /// Every module found for this shell, loaded or not.
    pub fn available_modules(&self) -> Vec<&ModuleManifest> {
        self.available.values().collect()
    }

    /// Modules that contributed services, in dependency order with themes last.
    pub fn modules(&self) -> Vec<String> {
        self.state.read().expect("shell lock poisoned").modules.clone()
    }

    /// Manifest of a loaded module.
    pub fn module_manifest(&self, name: &str) -> Option<ModuleManifest> {
        self.state
            .read()
            .expect("shell lock poisoned")
            .manifests
            .get(name)
            .cloned()
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Load modules and register services, then initialize the shell scope
    /// and emit `shell-loaded`.
    ///
    /// Only the first call does any work; later calls return `Ok(false)`.
    /// Concurrent callers wait until the first load, `shell-loaded`
    /// handlers included, has finished. A failed load is final: the first
    /// call returns the cause and every later call returns
    /// [`ShellError::LoadFailed`] without touching the shell scope again.
    pub async fn load(&self) -> ShellResult<bool> {
        if self.is_loaded() {
            return Ok(false);
        }
        let _guard = self.load_lock.lock().await;
        {
            let state = self.state.read().expect("shell lock poisoned");
            if state.loaded {
                return Ok(false);
            }
            if let Some(message) = &state.failure {
                return Err(ShellError::LoadFailed {
                    shell: self.name().to_string(),
                    message: message.clone(),
                });
            }
        }

        match self.load_and_announce().await {
            Ok(()) => {
                self.state.write().expect("shell lock poisoned").loaded = true;
                info!(shell = self.name(), modules = ?self.modules(), "shell loaded");
                Ok(true)
            }
            Err(e) => {
                self.state.write().expect("shell lock poisoned").failure = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn load_and_announce(&self) -> ShellResult<()> {
        self.load_modules()?;
        self.scope.initialize();
        self.scope
            .emit(ScopeEvent::ShellLoaded, EventPayload::Scope(self.scope.clone()))
            .await?;
        Ok(())
    }

    fn load_modules(&self) -> ShellResult<()> {
        let mut state = self.state.write().expect("shell lock poisoned");
        register_builtins(&self.scope);

        let mut order: Vec<&ModuleManifest> = self.available.values().collect();
        order.sort_by_key(|m| (m.priority, m.theme));
        let mut stack = Vec::new();
        for module in order {
            self.load_module(&mut state, &module.name, &mut stack)?;
        }

        self.register_site_services(&state)
    }

    /// Load `name` and, before each of its services, that service's
    /// dependencies. `stack` holds the modules currently loading.
    fn load_module(
        &self,
        state: &mut LoadState,
        name: &str,
        stack: &mut Vec<String>,
    ) -> ShellResult<()> {
        if state.manifests.contains_key(name) {
            return Ok(());
        }
        if stack.iter().any(|loading| loading == name) {
            let mut chain = stack.clone();
            chain.push(name.to_string());
            return Err(ShellError::DependencyCycle { chain });
        }
        let manifest = self
            .available
            .get(name)
            .ok_or_else(|| ShellError::UnknownModule {
                module: name.to_string(),
                required_by: stack.last().cloned().unwrap_or_else(|| self.name().to_string()),
            })?;

        stack.push(name.to_string());
        let mut contributed = manifest.theme;
        for (contract, entries) in &manifest.services {
            for entry in entries {
                if let Some(feature) = &entry.feature {
                    if !self.settings.is_feature_enabled(feature) {
                        debug!(module = name, service = %entry.path, feature, "feature disabled");
                        continue;
                    }
                }
                let key = ServiceCatalog::key(name, &entry.path);
                if state.registered.contains(&key) {
                    continue;
                }
                for dependency in &entry.dependencies {
                    self.load_module(state, dependency, stack)?;
                }
                let descriptor = self.catalog.build(manifest, entry).ok_or_else(|| {
                    ShellError::MissingService {
                        module: name.to_string(),
                        path: entry.path.clone(),
                    }
                })?;
                self.scope.register(contract, descriptor);
                state.registered.insert(key);
                contributed = true;
            }
        }
        stack.pop();

        state.manifests.insert(name.to_string(), manifest.clone());
        if contributed {
            state.modules.push(name.to_string());
        }
        debug!(module = name, contributed, "loaded module");
        Ok(())
    }

    /// Loaded modules that override one another, strongest first: the last
    /// loaded (themes) come first. The site itself overrides all of them.
    fn overriding_modules<'a>(&self, state: &'a LoadState) -> Vec<&'a ModuleManifest> {
        state
            .modules
            .iter()
            .rev()
            .filter_map(|name| state.manifests.get(name))
            .collect()
    }

    /// Register services that depend on the loaded module set: the site's
    /// content store, template resolution, placement files and the
    /// catch-all content route.
    fn register_site_services(&self, state: &LoadState) -> ShellResult<()> {
        let root = &self.settings.root_path;
        let modules = self.overriding_modules(state);

        let mut views = vec![root.join("views")];
        views.extend(modules.iter().map(|m| m.views_dir()));
        self.scope.register(
            TEMPLATE_RESOLVER.name(),
            ServiceDescriptor::value::<dyn TemplateResolver>(Arc::new(
                ModuleTemplateResolver::new(views),
            ))
            .with_name("module-template-resolver"),
        );

        let mut placement_files = vec![root.join("placement.json")];
        placement_files.extend(modules.iter().map(|m| m.placement_file()));
        for path in placement_files {
            if !path.is_file() {
                continue;
            }
            let config = PlacementConfig::from_file(&path).map_err(|source| {
                ShellError::Placement {
                    path: path.clone(),
                    source,
                }
            })?;
            let strategy = RulePlacementStrategy::from_config(&config).map_err(|source| {
                ShellError::Placement {
                    path: path.clone(),
                    source,
                }
            })?;
            self.scope.register(
                PLACEMENT_STRATEGY.name(),
                ServiceDescriptor::value::<dyn PlacementStrategy>(Arc::new(strategy))
                    .with_name(path.display().to_string()),
            );
        }

        let content_dir = self.settings.root_path.join("content");
        if content_dir.is_dir() {
            let store = JsonDirContentStore::new(content_dir)
                .with_site_dir(self.settings.root_path.clone());
            self.scope.register(
                CONTENT_STORE.name(),
                ServiceDescriptor::value::<dyn ContentStore>(Arc::new(store))
                    .with_name("site-content"),
            );
        }

        self.scope.register(
            ROUTE_HANDLER.name(),
            ServiceDescriptor::value::<dyn RouteHandler>(Arc::new(ContentRouteHandler::default()))
                .with_name("content-route"),
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Create and initialize a request scope for `request`.
    pub fn request_scope(&self, request: &Request) -> Scope {
        let mut seed = request.seed();
        seed.insert(
            "request_id".into(),
            Value::String(Uuid::now_v7().to_string()),
        );
        let scope = self.scope.make_sub_scope(REQUEST_SCOPE, seed);
        scope.initialize();
        scope
    }

    /// Emit `event` to shell subscribers, then to request subscribers.
    async fn emit_request_event(
        &self,
        scope: &Scope,
        event: ScopeEvent,
        payload: EventPayload,
    ) -> ShellResult<()> {
        self.scope.emit(event.clone(), payload.clone()).await?;
        scope.emit(event, payload).await?;
        Ok(())
    }

    /// Run one request through the shell.
    ///
    /// The request scope is created, `start-request` is emitted, the
    /// `route-handler` chain runs until one claims the request, then
    /// `fetch-content` and `render-page` are emitted and the page is
    /// rendered. Any failure emits `render-error` and answers 500; an
    /// unclaimed request answers 404. `end-request` is always emitted and
    /// the request scope is always torn down.
    pub async fn handle_request(&self, request: Request) -> Response {
        if !self.is_active() {
            return Response::unavailable();
        }
        if let Err(e) = self.load().await {
            error!(shell = self.name(), error = %e, "shell failed to load");
            return Response::error();
        }

        let scope = self.request_scope(&request);
        let request_id = scope
            .value("request_id")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        debug!(shell = self.name(), %request_id, path = %request.path, "start request");

        let response = match self.run_request(&scope, request).await {
            Ok(response) => response,
            Err(e) => {
                error!(shell = self.name(), %request_id, error = %e, "request failed");
                let payload = EventPayload::Error {
                    scope: scope.clone(),
                    message: e.to_string(),
                };
                if let Err(e) = self
                    .emit_request_event(&scope, ScopeEvent::RenderError, payload)
                    .await
                {
                    warn!(%request_id, error = %e, "render-error handler failed");
                }
                Response::error()
            }
        };

        if let Err(e) = self
            .emit_request_event(&scope, ScopeEvent::EndRequest, EventPayload::Scope(scope.clone()))
            .await
        {
            warn!(%request_id, error = %e, "end-request handler failed");
        }
        scope.tear_down();
        debug!(%request_id, status = response.status, "end request");
        response
    }

    async fn run_request(&self, scope: &Scope, request: Request) -> ShellResult<Response> {
        let payload = EventPayload::Scope(scope.clone());
        self.emit_request_event(scope, ScopeEvent::StartRequest, payload.clone())
            .await?;

        let mut context = RequestContext::new(scope.clone(), request);
        let mut claimed = false;
        for handler in scope.get_services(&ROUTE_HANDLER) {
            if handler.handle(&mut context).await? {
                claimed = true;
                break;
            }
        }
        if !claimed {
            return Ok(Response::not_found());
        }
        if let Some(response) = context.response.take() {
            return Ok(response);
        }

        self.emit_request_event(scope, ScopeEvent::FetchContent, payload.clone())
            .await?;
        self.emit_request_event(scope, ScopeEvent::RenderPage, payload)
            .await?;
        let html = render_page(scope).await?;
        Ok(Response::html(html))
    }
}

/// Services every shell starts with. Registered before any module, so a
/// module's registration for the same contract takes precedence.
fn register_builtins(scope: &Scope) {
    scope.register(STORAGE_MANAGER.name(), ContentManager::descriptor());
    scope.register(PAGE.name(), Page::descriptor());
    scope.register(RESOURCE_REGISTRY.name(), ResourceRegistry::descriptor());
    scope.register(PAGE_RENDERER.name(), PageRenderer::descriptor());
    scope.register(
        SHAPE_HANDLER.name(),
        ServiceDescriptor::value::<dyn ShapeHandler>(Arc::new(ShapeItemPromiseHandler))
            .with_name("shape-item-promise"),
    );
    scope.register(
        SHAPE_HANDLER.name(),
        ServiceDescriptor::value::<dyn ShapeHandler>(Arc::new(ZoneHandler)).with_name("zone"),
    );
    scope.register(
        CONTENT_HANDLER.name(),
        ServiceDescriptor::value::<dyn ContentHandler>(Arc::new(PartShapeHandler))
            .with_name("parts"),
    );
    scope.register(
        RENDERING_STRATEGY.name(),
        ServiceDescriptor::singleton::<dyn RenderingStrategy, _>(|_, _| {
            Arc::new(TemplateRenderingStrategy::new())
        })
        .with_name("template-rendering"),
    );
    scope.register(
        VIEW_ENGINE.name(),
        ServiceDescriptor::value::<dyn ViewEngine>(Arc::new(CodeViewEngine::with_defaults()))
            .with_name("code"),
    );
    scope.register(
        VIEW_ENGINE.name(),
        ServiceDescriptor::value::<dyn ViewEngine>(Arc::new(RawViewEngine)).with_name("html"),
    );
    scope.register(
        LOCALIZER.name(),
        ServiceDescriptor::value::<dyn Localizer>(Arc::new(IdentityLocalizer)),
    );
}
