use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::contract::Contract;
use crate::descriptor::{downcast, DescriptorId, Instance, Lifetime, ServiceDescriptor};
use crate::error::ScopeResult;
use crate::event::{EventBus, EventHandler, EventPayload, ScopeEvent, SubscriptionId};
use crate::lifecycle::BoxFuture;

struct ScopeInner {
    name: String,
    parent: Option<Weak<ScopeInner>>,
    services: RwLock<HashMap<String, Vec<Arc<ServiceDescriptor>>>>,
    instances: RwLock<HashMap<DescriptorId, Instance>>,
    values: RwLock<Map<String, Value>>,
    wired: RwLock<HashSet<DescriptorId>>,
    events: EventBus,
    initialized: AtomicBool,
}

/// A dependency-injection container with its own registry, singleton cache
/// and event bus, optionally chained to a parent scope.
///
/// `Scope` is a cheap handle; clones share the same container. A child scope
/// falls back to its parent for any contract it has no local registration
/// for, but keeps its own singleton cache. The parent is held weakly: a
/// child never keeps its parent alive.
///
/// # Resolution rules
///
/// - [`require`](Self::require) resolves the **last** descriptor registered
///   for a contract.
/// - [`get_services`](Self::get_services) resolves **every** descriptor, in
///   registration order.
/// - A missing contract yields `None` / an empty list, never an error.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

/// A non-owning handle to a [`Scope`].
#[derive(Clone)]
pub struct WeakScope {
    inner: Weak<ScopeInner>,
}

impl WeakScope {
    pub fn upgrade(&self) -> Option<Scope> {
        self.inner.upgrade().map(|inner| Scope { inner })
    }
}

impl Scope {
    /// Create a root scope.
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), None, Map::new())
    }

    fn build(name: String, parent: Option<Weak<ScopeInner>>, values: Map<String, Value>) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                name,
                parent,
                services: RwLock::new(HashMap::new()),
                instances: RwLock::new(HashMap::new()),
                values: RwLock::new(values),
                wired: RwLock::new(HashSet::new()),
                events: EventBus::new(),
                initialized: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn parent(&self) -> Option<Scope> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Scope { inner })
    }

    pub fn downgrade(&self) -> WeakScope {
        WeakScope {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// `true` when both handles point at the same container.
    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    /// This scope followed by its live ancestors, nearest first.
    fn chain(&self) -> Vec<Scope> {
        let mut chain = vec![self.clone()];
        let mut current = self.parent();
        while let Some(scope) = current {
            current = scope.parent();
            chain.push(scope);
        }
        chain
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Append `descriptor` to the list for `contract`.
    ///
    /// If this scope is already initialized, the descriptor's init hook and
    /// event handlers are wired immediately, unless it declares a different
    /// owning scope.
    pub fn register(&self, contract: &str, descriptor: ServiceDescriptor) -> DescriptorId {
        let id = descriptor.id();
        let descriptor = Arc::new(descriptor);
        self.inner
            .services
            .write()
            .expect("scope lock poisoned")
            .entry(contract.to_string())
            .or_default()
            .push(Arc::clone(&descriptor));
        debug!(
            scope = self.name(),
            contract,
            service = descriptor.name().unwrap_or(descriptor.type_name()),
            "registered service"
        );

        if self.is_initialized() && descriptor.is_owned_by(self.name()) {
            self.wire(&descriptor);
        }
        id
    }

    /// `true` if this scope or an ancestor has a registration for `contract`.
    pub fn has_service(&self, contract: &str) -> bool {
        !self.descriptors(contract).is_empty()
    }

    /// Contract names registered locally on this scope.
    pub fn contracts(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .services
            .read()
            .expect("scope lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Descriptors for `contract`: the local list if non-empty, otherwise
    /// the nearest ancestor's.
    pub fn descriptors(&self, contract: &str) -> Vec<Arc<ServiceDescriptor>> {
        for scope in self.chain() {
            let services = scope.inner.services.read().expect("scope lock poisoned");
            if let Some(list) = services.get(contract) {
                if !list.is_empty() {
                    return list.clone();
                }
            }
        }
        Vec::new()
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    /// Resolve the most recently registered service for `contract`.
    pub fn require<T>(&self, contract: &Contract<T>) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.require_with(contract, &Value::Null)
    }

    /// Like [`require`](Self::require), passing `options` to constructible factories.
    pub fn require_with<T>(&self, contract: &Contract<T>, options: &Value) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let descriptor = self.descriptors(contract.name()).pop()?;
        self.resolve(contract, &descriptor, options)
    }

    /// Resolve every service registered for `contract`, in registration order.
    pub fn get_services<T>(&self, contract: &Contract<T>) -> Vec<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get_services_with(contract, &Value::Null)
    }

    pub fn get_services_with<T>(&self, contract: &Contract<T>, options: &Value) -> Vec<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.descriptors(contract.name())
            .iter()
            .filter_map(|descriptor| self.resolve(contract, descriptor, options))
            .collect()
    }

    fn resolve<T>(
        &self,
        contract: &Contract<T>,
        descriptor: &Arc<ServiceDescriptor>,
        options: &Value,
    ) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let instance = match descriptor.lifetime() {
            Lifetime::Static | Lifetime::Constructible => descriptor.produce(self, options),
            Lifetime::ScopeSingleton => {
                let Some(owner) = self.owning_scope(descriptor) else {
                    debug!(
                        scope = self.name(),
                        %contract,
                        owner = descriptor.scope().unwrap_or("-"),
                        "no owning scope in chain for singleton"
                    );
                    return None;
                };
                owner.singleton(descriptor, options)
            }
        };

        let typed = downcast::<T>(&instance);
        if typed.is_none() {
            warn!(
                %contract,
                expected = std::any::type_name::<T>(),
                registered = descriptor.type_name(),
                "service type does not match contract"
            );
        }
        typed
    }

    /// The scope that caches `descriptor`'s singleton: the nearest scope
    /// named after its declared owner, or the scope it is registered on.
    fn owning_scope(&self, descriptor: &Arc<ServiceDescriptor>) -> Option<Scope> {
        let chain = self.chain();
        match descriptor.scope() {
            Some(owner) => chain.into_iter().find(|s| s.name() == owner),
            None => chain.into_iter().find(|s| s.registers(descriptor)),
        }
    }

    fn registers(&self, descriptor: &Arc<ServiceDescriptor>) -> bool {
        self.inner
            .services
            .read()
            .expect("scope lock poisoned")
            .values()
            .flatten()
            .any(|d| Arc::ptr_eq(d, descriptor))
    }

    fn singleton(&self, descriptor: &ServiceDescriptor, options: &Value) -> Instance {
        let id = descriptor.id();
        if let Some(existing) = self
            .inner
            .instances
            .read()
            .expect("scope lock poisoned")
            .get(&id)
        {
            return Arc::clone(existing);
        }

        // Build outside the lock: factories routinely resolve other services
        // from this same scope.
        let built = descriptor.produce(self, options);
        let mut instances = self.inner.instances.write().expect("scope lock poisoned");
        Arc::clone(instances.entry(id).or_insert(built))
    }

    /// Number of singleton instances cached on this scope.
    pub fn instance_count(&self) -> usize {
        self.inner
            .instances
            .read()
            .expect("scope lock poisoned")
            .len()
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Call `invoke` on every service registered for `contract`, one at a
    /// time, in registration order. Stops at the first error.
    pub async fn call_service<T, C, E, F>(
        &self,
        contract: &Contract<T>,
        context: &mut C,
        invoke: F,
    ) -> Result<(), E>
    where
        T: ?Sized + Send + Sync + 'static,
        C: Send,
        F: for<'b> Fn(Arc<T>, &'b mut C) -> BoxFuture<'b, Result<(), E>>,
    {
        for service in self.get_services(contract) {
            invoke(service, &mut *context).await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sub-scopes and lifetime
    // -----------------------------------------------------------------------

    /// Create a child scope seeded with `values`.
    pub fn make_sub_scope(&self, name: impl Into<String>, values: Map<String, Value>) -> Scope {
        Self::build(name.into(), Some(Arc::downgrade(&self.inner)), values)
    }

    /// Create a child scope with `values` and local `services`.
    pub fn make_sub_scope_with<I>(
        &self,
        name: impl Into<String>,
        values: Map<String, Value>,
        services: I,
    ) -> Scope
    where
        I: IntoIterator<Item = (String, ServiceDescriptor)>,
    {
        let child = self.make_sub_scope(name, values);
        for (contract, descriptor) in services {
            child.register(&contract, descriptor);
        }
        child
    }

    /// Run init hooks and subscribe declared event handlers for every
    /// descriptor this scope owns.
    ///
    /// Owned descriptors are the local ones with no declared scope or a
    /// scope matching this scope's name, plus ancestor descriptors that
    /// explicitly name this scope. Each descriptor is wired at most once.
    pub fn initialize(&self) {
        self.inner.initialized.store(true, Ordering::Release);

        let mut owned = Vec::new();
        for (depth, scope) in self.chain().into_iter().enumerate() {
            let services = scope.inner.services.read().expect("scope lock poisoned");
            for descriptor in services.values().flatten() {
                let named_here = descriptor.scope() == Some(self.name());
                if named_here || (depth == 0 && descriptor.scope().is_none()) {
                    owned.push(Arc::clone(descriptor));
                }
            }
        }
        owned.sort_by_key(|d| d.id());

        debug!(scope = self.name(), descriptors = owned.len(), "initializing scope");
        for descriptor in &owned {
            self.wire(descriptor);
        }
    }

    fn wire(&self, descriptor: &ServiceDescriptor) {
        let first = self
            .inner
            .wired
            .write()
            .expect("scope lock poisoned")
            .insert(descriptor.id());
        if !first {
            return;
        }
        if let Some(init) = descriptor.init_hook() {
            init(self);
        }
        for (event, handler) in descriptor.handlers() {
            self.inner.events.subscribe(event.clone(), Arc::clone(handler));
        }
    }

    /// Release every registration, cached instance and subscription.
    ///
    /// Request scopes are torn down at the end of each request so that all
    /// per-request instances are dropped.
    pub fn tear_down(&self) {
        let released = {
            let mut instances = self.inner.instances.write().expect("scope lock poisoned");
            let n = instances.len();
            instances.clear();
            n
        };
        self.inner
            .services
            .write()
            .expect("scope lock poisoned")
            .clear();
        self.inner.wired.write().expect("scope lock poisoned").clear();
        self.inner.values.write().expect("scope lock poisoned").clear();
        self.inner.events.clear();
        self.inner.initialized.store(false, Ordering::Release);
        debug!(scope = self.name(), released, "scope torn down");
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn on(&self, event: ScopeEvent, handler: EventHandler) -> SubscriptionId {
        self.inner.events.subscribe(event, handler)
    }

    /// Emit `event` on this scope's bus. Returns the number of handlers run.
    pub async fn emit(&self, event: ScopeEvent, payload: EventPayload) -> ScopeResult<usize> {
        self.inner.events.emit(self, event, payload).await
    }

    // -----------------------------------------------------------------------
    // Seed values
    // -----------------------------------------------------------------------

    /// Read a seed value, falling back to ancestors.
    pub fn value(&self, key: &str) -> Option<Value> {
        self.chain().into_iter().find_map(|scope| {
            scope
                .inner
                .values
                .read()
                .expect("scope lock poisoned")
                .get(key)
                .cloned()
        })
    }

    pub fn set_value(&self, key: impl Into<String>, value: Value) {
        self.inner
            .values
            .write()
            .expect("scope lock poisoned")
            .insert(key.into(), value);
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let contracts = self
            .inner
            .services
            .read()
            .expect("scope lock poisoned")
            .len();
        f.debug_struct("Scope")
            .field("name", &self.inner.name)
            .field("parent", &self.parent().map(|p| p.name().to_string()))
            .field("contracts", &contracts)
            .field("instances", &self.instance_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::handler;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    trait Named: Send + Sync {
        fn name(&self) -> String;
    }

    struct Fixed(String);

    impl Named for Fixed {
        fn name(&self) -> String {
            self.0.clone()
        }
    }

    const NAMED: Contract<dyn Named> = Contract::new("named");

    fn fixed(label: &str) -> Arc<dyn Named> {
        Arc::new(Fixed(label.to_string()))
    }

    fn constructible(label: &'static str) -> ServiceDescriptor {
        ServiceDescriptor::constructible::<dyn Named, _>(move |_, _| fixed(label))
    }

    // -----------------------------------------------------------------------
    // require / get_services
    // -----------------------------------------------------------------------

    #[test]
    fn require_returns_last_registered() {
        let scope = Scope::new("shell");
        scope.register("named", constructible("first"));
        scope.register("named", constructible("override"));
        assert_eq!(scope.require(&NAMED).unwrap().name(), "override");
    }

    #[test]
    fn get_services_preserves_registration_order() {
        let scope = Scope::new("shell");
        for label in ["a", "b", "c"] {
            scope.register("named", constructible(label));
        }
        let names: Vec<String> = scope.get_services(&NAMED).iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        let last = scope.get_services(&NAMED).pop().unwrap();
        assert_eq!(scope.require(&NAMED).unwrap().name(), last.name());
    }

    #[test]
    fn missing_contract_is_none_and_empty() {
        let scope = Scope::new("shell");
        assert!(scope.require(&NAMED).is_none());
        assert!(scope.get_services(&NAMED).is_empty());
        assert!(!scope.has_service("named"));
    }

    #[test]
    fn static_descriptor_returns_the_same_value() {
        let scope = Scope::new("shell");
        let value = fixed("static");
        scope.register("named", ServiceDescriptor::value(Arc::clone(&value)));
        let resolved = scope.require(&NAMED).unwrap();
        assert!(Arc::ptr_eq(&resolved, &value));
    }

    #[test]
    fn constructible_builds_a_new_instance_each_time() {
        let scope = Scope::new("shell");
        scope.register("named", constructible("x"));
        let a = scope.require(&NAMED).unwrap();
        let b = scope.require(&NAMED).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn constructible_receives_options() {
        let scope = Scope::new("shell");
        scope.register(
            "named",
            ServiceDescriptor::constructible::<dyn Named, _>(|_, options| {
                fixed(options["label"].as_str().unwrap_or("none"))
            }),
        );
        let svc = scope.require_with(&NAMED, &json!({ "label": "configured" })).unwrap();
        assert_eq!(svc.name(), "configured");
        assert_eq!(scope.require(&NAMED).unwrap().name(), "none");
    }

    #[test]
    fn wrong_type_resolves_to_none() {
        let scope = Scope::new("shell");
        scope.register("named", ServiceDescriptor::value(Arc::new(42u32)));
        assert!(scope.require(&NAMED).is_none());
    }

    // -----------------------------------------------------------------------
    // Singletons
    // -----------------------------------------------------------------------

    fn counting_singleton(counter: &Arc<AtomicUsize>) -> ServiceDescriptor {
        let counter = Arc::clone(counter);
        ServiceDescriptor::singleton::<dyn Named, _>(move |scope, _| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            fixed(&format!("{}-{n}", scope.name()))
        })
    }

    #[test]
    fn singleton_is_cached_per_scope() {
        let counter = Arc::new(AtomicUsize::new(0));
        let scope = Scope::new("shell");
        scope.register("named", counting_singleton(&counter));
        let a = scope.require(&NAMED).unwrap();
        let b = scope.require(&NAMED).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(scope.instance_count(), 1);
    }

    #[test]
    fn singletons_of_distinct_shells_differ() {
        let counter = Arc::new(AtomicUsize::new(0));
        let one = Scope::new("shell");
        let two = Scope::new("shell");
        let shared = counting_singleton(&counter);
        let other = counting_singleton(&counter);
        one.register("named", shared);
        two.register("named", other);
        let a = one.require(&NAMED).unwrap();
        let b = two.require(&NAMED).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn unscoped_singleton_lives_on_the_registering_scope() {
        let counter = Arc::new(AtomicUsize::new(0));
        let shell = Scope::new("shell");
        shell.register("named", counting_singleton(&counter));
        let request = shell.make_sub_scope("request", Map::new());

        let from_request = request.require(&NAMED).unwrap();
        let from_shell = shell.require(&NAMED).unwrap();
        assert!(Arc::ptr_eq(&from_request, &from_shell));
        assert_eq!(from_shell.name(), "shell-0");
        assert_eq!(request.instance_count(), 0);
    }

    #[test]
    fn request_scoped_singleton_is_cached_on_the_request() {
        let counter = Arc::new(AtomicUsize::new(0));
        let shell = Scope::new("shell");
        shell.register("named", counting_singleton(&counter).in_scope("request"));

        // Not resolvable outside a request.
        assert!(shell.require(&NAMED).is_none());

        let first = shell.make_sub_scope("request", Map::new());
        let a1 = first.require(&NAMED).unwrap();
        let a2 = first.require(&NAMED).unwrap();
        assert!(Arc::ptr_eq(&a1, &a2));
        first.tear_down();

        let second = shell.make_sub_scope("request", Map::new());
        let b = second.require(&NAMED).unwrap();
        assert!(!Arc::ptr_eq(&a1, &b));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn singleton_key_survives_later_registrations() {
        let counter = Arc::new(AtomicUsize::new(0));
        let scope = Scope::new("shell");
        scope.register("named", counting_singleton(&counter));
        let before = scope.get_services(&NAMED);
        scope.register("named", counting_singleton(&counter));
        let after = scope.get_services(&NAMED);
        assert!(Arc::ptr_eq(&before[0], &after[0]));
        assert!(!Arc::ptr_eq(&after[0], &after[1]));
    }

    // -----------------------------------------------------------------------
    // Sub-scopes
    // -----------------------------------------------------------------------

    #[test]
    fn sub_scope_falls_back_to_parent() {
        let shell = Scope::new("shell");
        shell.register("named", constructible("from-shell"));
        let request = shell.make_sub_scope("request", Map::new());
        assert_eq!(request.require(&NAMED).unwrap().name(), "from-shell");
        assert!(request.parent().unwrap().ptr_eq(&shell));
    }

    #[test]
    fn local_registration_shadows_parent_list() {
        let shell = Scope::new("shell");
        shell.register("named", constructible("a"));
        shell.register("named", constructible("b"));
        let request = shell.make_sub_scope_with(
            "request",
            Map::new(),
            vec![("named".to_string(), constructible("local"))],
        );
        let names: Vec<String> = request.get_services(&NAMED).iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["local"]);
    }

    #[test]
    fn seed_values_fall_back_to_parent() {
        let shell = Scope::new("shell");
        shell.set_value("site", json!("demo"));
        let mut seed = Map::new();
        seed.insert("path".into(), json!("/about"));
        let request = shell.make_sub_scope("request", seed);
        assert_eq!(request.value("path"), Some(json!("/about")));
        assert_eq!(request.value("site"), Some(json!("demo")));
        assert_eq!(shell.value("path"), None);
    }

    #[test]
    fn parent_is_not_kept_alive_by_child() {
        let shell = Scope::new("shell");
        let request = shell.make_sub_scope("request", Map::new());
        let weak = shell.downgrade();
        drop(shell);
        assert!(weak.upgrade().is_none());
        assert!(request.parent().is_none());
    }

    // -----------------------------------------------------------------------
    // Initialization and events
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn initialize_runs_init_hooks_and_subscribes_handlers() {
        let scope = Scope::new("shell");
        let inits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let counter = Arc::clone(&inits);
        let log = Arc::clone(&seen);
        scope.register(
            "named",
            constructible("x")
                .on_init(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .on(
                    ScopeEvent::StartRequest,
                    handler(move |scope, payload| {
                        let log = Arc::clone(&log);
                        async move {
                            let target = payload.scope().map(|s| s.name().to_string());
                            log.lock().unwrap().push((scope.name().to_string(), target));
                            Ok(())
                        }
                    }),
                ),
        );

        scope.initialize();
        scope.initialize();
        assert_eq!(inits.load(Ordering::SeqCst), 1);

        let request = scope.make_sub_scope("request", Map::new());
        let ran = scope
            .emit(ScopeEvent::StartRequest, EventPayload::Scope(request))
            .await
            .unwrap();
        assert_eq!(ran, 1);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("shell".to_string(), Some("request".to_string()))]
        );
    }

    #[test]
    fn register_after_initialize_wires_immediately() {
        let scope = Scope::new("shell");
        scope.initialize();
        let inits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&inits);
        scope.register(
            "named",
            constructible("late").on_init(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(inits.load(Ordering::SeqCst), 1);

        let counter = Arc::clone(&inits);
        scope.register(
            "named",
            constructible("elsewhere")
                .in_scope("request")
                .on_init(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
        );
        assert_eq!(inits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn request_scope_wires_descriptors_that_name_it() {
        let shell = Scope::new("shell");
        let inits = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&inits);
        shell.register(
            "named",
            constructible("per-request")
                .in_scope("request")
                .on_init(move |scope| log.lock().unwrap().push(scope.name().to_string())),
        );
        shell.initialize();
        assert!(inits.lock().unwrap().is_empty());

        let request = shell.make_sub_scope("request", Map::new());
        request.initialize();
        assert_eq!(*inits.lock().unwrap(), vec!["request"]);
    }

    #[tokio::test]
    async fn call_service_is_sequential_and_stops_on_error() {
        let scope = Scope::new("shell");
        for label in ["one", "stop", "three"] {
            scope.register("named", constructible(label));
        }

        let mut seen: Vec<String> = Vec::new();
        let result = scope
            .call_service(&NAMED, &mut seen, |svc, seen| {
                Box::pin(async move {
                    tokio::task::yield_now().await;
                    if svc.name() == "stop" {
                        return Err(format!("{} refused", svc.name()));
                    }
                    seen.push(svc.name());
                    Ok(())
                })
            })
            .await;
        assert_eq!(result.unwrap_err(), "stop refused");
        assert_eq!(seen, vec!["one"]);
    }

    #[test]
    fn tear_down_releases_everything() {
        let counter = Arc::new(AtomicUsize::new(0));
        let scope = Scope::new("request");
        scope.register("named", counting_singleton(&counter));
        scope.set_value("k", json!(1));
        scope.on(
            ScopeEvent::EndRequest,
            handler(|_, _| async { Ok(()) }),
        );
        scope.initialize();
        let _ = scope.require(&NAMED);
        assert_eq!(scope.instance_count(), 1);

        scope.tear_down();
        assert_eq!(scope.instance_count(), 0);
        assert!(scope.require(&NAMED).is_none());
        assert!(scope.value("k").is_none());
        assert_eq!(scope.events().handler_count(&ScopeEvent::EndRequest), 0);
        assert!(!scope.is_initialized());
    }
}
