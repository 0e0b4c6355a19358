use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::event::{EventHandler, ScopeEvent};
use crate::scope::Scope;

/// A type-erased service instance. The concrete value is always an `Arc<T>`
/// for the contract's `T`, boxed once more so unsized trait objects survive
/// the trip through `Any`.
pub type Instance = Arc<dyn Any + Send + Sync>;

type Factory = Arc<dyn Fn(&Scope, &Value) -> Instance + Send + Sync>;

/// One-time hook run when the owning scope initializes the descriptor.
pub type InitHook = Arc<dyn Fn(&Scope) + Send + Sync>;

static NEXT_DESCRIPTOR_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a registered descriptor.
///
/// Singleton instances are cached under this key rather than under the
/// descriptor's position in its contract list, so registering more services
/// later never shifts an existing singleton onto another descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorId(u64);

impl DescriptorId {
    fn next() -> Self {
        Self(NEXT_DESCRIPTOR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "svc#{}", self.0)
    }
}

/// How a descriptor produces instances.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifetime {
    /// A new instance on every resolution.
    Constructible,
    /// One instance per owning scope.
    ScopeSingleton,
    /// A fixed value handed out as-is.
    Static,
}

enum Provider {
    Factory(Factory),
    Value(Instance),
}

/// A registration in a [`Scope`]: how to produce a service plus the metadata
/// that gates and wires it.
pub struct ServiceDescriptor {
    id: DescriptorId,
    lifetime: Lifetime,
    provider: Provider,
    type_name: &'static str,
    name: Option<String>,
    feature: Option<String>,
    scope: Option<String>,
    dependencies: Vec<String>,
    init: Option<InitHook>,
    handlers: Vec<(ScopeEvent, EventHandler)>,
}

impl ServiceDescriptor {
    fn with_provider<T: ?Sized + 'static>(lifetime: Lifetime, provider: Provider) -> Self {
        Self {
            id: DescriptorId::next(),
            lifetime,
            provider,
            type_name: std::any::type_name::<T>(),
            name: None,
            feature: None,
            scope: None,
            dependencies: Vec::new(),
            init: None,
            handlers: Vec::new(),
        }
    }

    /// A descriptor that builds a fresh instance on every resolution.
    pub fn constructible<T, F>(build: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Scope, &Value) -> Arc<T> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |scope: &Scope, options: &Value| -> Instance {
            Arc::new(build(scope, options))
        });
        Self::with_provider::<T>(Lifetime::Constructible, Provider::Factory(factory))
    }

    /// A descriptor whose instance is built once per owning scope.
    pub fn singleton<T, F>(build: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Scope, &Value) -> Arc<T> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |scope: &Scope, options: &Value| -> Instance {
            Arc::new(build(scope, options))
        });
        Self::with_provider::<T>(Lifetime::ScopeSingleton, Provider::Factory(factory))
    }

    /// A descriptor that always resolves to `value`.
    pub fn value<T>(value: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Self::with_provider::<T>(Lifetime::Static, Provider::Value(Arc::new(value)))
    }

    /// Label used in logs (usually the module-relative service path).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Feature that must be enabled for the service to load.
    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = Some(feature.into());
        self
    }

    /// Name of the scope level that owns this service's singleton and wiring.
    pub fn in_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Modules that must be loaded before this service is registered.
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn on_init<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Scope) + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(hook));
        self
    }

    /// Declare a handler subscribed when the owning scope initializes.
    pub fn on(mut self, event: ScopeEvent, handler: EventHandler) -> Self {
        self.handlers.push((event, handler));
        self
    }

    pub fn id(&self) -> DescriptorId {
        self.id
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn feature(&self) -> Option<&str> {
        self.feature.as_deref()
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Type name of the contract this descriptor resolves to.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn init_hook(&self) -> Option<&InitHook> {
        self.init.as_ref()
    }

    pub(crate) fn handlers(&self) -> &[(ScopeEvent, EventHandler)] {
        &self.handlers
    }

    /// `true` when the descriptor may be initialized on a scope named `scope_name`.
    pub(crate) fn is_owned_by(&self, scope_name: &str) -> bool {
        self.scope.as_deref().map_or(true, |s| s == scope_name)
    }

    pub(crate) fn produce(&self, scope: &Scope, options: &Value) -> Instance {
        match &self.provider {
            Provider::Factory(factory) => factory(scope, options),
            Provider::Value(value) => Arc::clone(value),
        }
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("id", &self.id)
            .field("lifetime", &self.lifetime)
            .field("type_name", &self.type_name)
            .field("name", &self.name)
            .field("feature", &self.feature)
            .field("scope", &self.scope)
            .field("dependencies", &self.dependencies)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Recover the typed service from an erased instance.
pub(crate) fn downcast<T: ?Sized + Send + Sync + 'static>(instance: &Instance) -> Option<Arc<T>> {
    instance.downcast_ref::<Arc<T>>().cloned()
}
