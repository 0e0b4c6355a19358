use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use indexmap::IndexMap;
use tessera_scope::{handler, BoxError, Scope, ScopeEvent, ServiceDescriptor};
use tessera_types::ContentItem;
use tracing::{debug, warn};

use crate::error::ContentResult;
use crate::traits::{ItemCallback, StorageManager, CONTENT_STORE, STORAGE_MANAGER};

/// Name of the scope level that owns the content manager.
pub const REQUEST_SCOPE: &str = "request";

#[derive(Default)]
struct FetchState {
    items: HashMap<String, Arc<ContentItem>>,
    /// Ids wanted but not yet resolved, with their callbacks in registration order.
    pending: IndexMap<String, Vec<ItemCallback>>,
}

/// Per-request content coordinator.
///
/// Ids promised with [`promise_to_get`](StorageManager::promise_to_get) are
/// collected in a pending set and deduplicated; one
/// [`fetch_content`](StorageManager::fetch_content) call then resolves them
/// through the `content-store` chain. Every callback registered for an id
/// fires exactly once, in registration order, and the id leaves the pending
/// set atomically with its insertion into the item map.
#[derive(Default)]
pub struct ContentManager {
    state: Mutex<FetchState>,
}

impl ContentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptor registering a content manager per request scope, answering
    /// `fetch-content` events on that scope.
    pub fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor::singleton::<dyn StorageManager, _>(|_, _| Arc::new(Self::new()))
            .with_name("content-manager")
            .in_scope(REQUEST_SCOPE)
            .on(
                ScopeEvent::FetchContent,
                handler(|scope: Scope, _payload| async move {
                    if let Some(manager) = scope.require(&STORAGE_MANAGER) {
                        manager.fetch_content(&scope).await?;
                    }
                    Ok::<(), BoxError>(())
                }),
            )
    }

    /// Ids still waiting for a store, in the order they were first promised.
    pub fn pending_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("content lock poisoned")
            .pending
            .keys()
            .cloned()
            .collect()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.state
            .lock()
            .expect("content lock poisoned")
            .pending
            .contains_key(id)
    }

    /// Record a fetched item. Returns `true` if the id was pending.
    ///
    /// Callbacks run after the lock is released, so they may promise more ids.
    pub fn resolve(&self, item: Arc<ContentItem>) -> bool {
        let callbacks = {
            let mut state = self.state.lock().expect("content lock poisoned");
            let callbacks = state.pending.shift_remove(&item.id);
            state.items.insert(item.id.clone(), Arc::clone(&item));
            callbacks
        };
        match callbacks {
            Some(callbacks) => {
                for callback in &callbacks {
                    callback(&item);
                }
                true
            }
            None => false,
        }
    }

    /// Remove ids of `requested` that are still pending after every store
    /// ran. Their callbacks never fire. Ids promised during the fetch stay.
    fn drop_unresolved(&self, requested: &[String]) -> Vec<String> {
        let mut state = self.state.lock().expect("content lock poisoned");
        requested
            .iter()
            .filter(|id| state.pending.shift_remove(id.as_str()).is_some())
            .cloned()
            .collect()
    }

    /// Fire callbacks for pending ids whose items are already known.
    fn resolve_available(&self) {
        let ready: Vec<(Arc<ContentItem>, Vec<ItemCallback>)> = {
            let mut state = self.state.lock().expect("content lock poisoned");
            let ids: Vec<String> = state
                .pending
                .keys()
                .filter(|id| state.items.contains_key(*id))
                .cloned()
                .collect();
            ids.into_iter()
                .filter_map(|id| {
                    let callbacks = state.pending.shift_remove(&id)?;
                    let item = Arc::clone(state.items.get(&id)?);
                    Some((item, callbacks))
                })
                .collect()
        };
        for (item, callbacks) in ready {
            for callback in &callbacks {
                callback(&item);
            }
        }
    }
}

#[async_trait]
impl StorageManager for ContentManager {
    fn promise_to_get(&self, ids: &[&str], callback: Option<ItemCallback>) {
        let mut state = self.state.lock().expect("content lock poisoned");
        for id in ids {
            let callbacks = state.pending.entry(id.to_string()).or_default();
            if let Some(callback) = &callback {
                callbacks.push(Arc::clone(callback));
            }
        }
    }

    async fn fetch_content(&self, scope: &Scope) -> ContentResult<()> {
        self.resolve_available();
        let requested = self.pending_ids();
        if requested.is_empty() {
            return Ok(());
        }

        let mut context = FetchContext {
            scope,
            manager: self,
        };
        scope
            .call_service(&CONTENT_STORE, &mut context, |store, context| {
                Box::pin(async move {
                    if context.pending_ids().is_empty() {
                        return Ok(());
                    }
                    let pending = context.pending_ids().len();
                    debug!(store = store.name(), pending, "loading items");
                    store.load_items(context).await
                })
            })
            .await?;

        let unresolved = self.drop_unresolved(&requested);
        if !unresolved.is_empty() {
            warn!(scope = scope.name(), ids = ?unresolved, "content not found");
        }
        Ok(())
    }

    fn get_available_item(&self, id: &str) -> Option<Arc<ContentItem>> {
        self.state
            .lock()
            .expect("content lock poisoned")
            .items
            .get(id)
            .cloned()
    }
}

/// What a content store sees while loading: the request scope and the
/// pending set it resolves against.
pub struct FetchContext<'a> {
    scope: &'a Scope,
    manager: &'a ContentManager,
}

impl<'a> FetchContext<'a> {
    pub fn new(scope: &'a Scope, manager: &'a ContentManager) -> Self {
        Self { scope, manager }
    }

    pub fn scope(&self) -> &Scope {
        self.scope
    }

    pub fn pending_ids(&self) -> Vec<String> {
        self.manager.pending_ids()
    }

    /// Hand over a found item. See [`ContentManager::resolve`].
    pub fn resolve(&self, item: Arc<ContentItem>) -> bool {
        self.manager.resolve(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContentError;
    use crate::json_dir::JsonDirContentStore;
    use crate::memory::InMemoryContentStore;
    use crate::traits::ContentStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder(log: &Arc<Mutex<Vec<String>>>, label: &'static str) -> ItemCallback {
        let log = Arc::clone(log);
        Arc::new(move |item: &Arc<ContentItem>| {
            log.lock().unwrap().push(format!("{label}:{}", item.id));
        })
    }

    fn scope_with_store(store: InMemoryContentStore) -> Scope {
        let scope = Scope::new(REQUEST_SCOPE);
        scope.register(
            CONTENT_STORE.name(),
            ServiceDescriptor::value::<dyn ContentStore>(Arc::new(store)),
        );
        scope
    }

    /// Fails every load and counts attempts.
    struct Broken(AtomicUsize);

    #[async_trait]
    impl ContentStore for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn load_items(&self, _context: &FetchContext<'_>) -> ContentResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(ContentError::Store {
                store: "broken".into(),
                message: "disk on fire".into(),
            })
        }
    }

    /// Records the pending ids it was offered and resolves none.
    #[derive(Default)]
    struct Counting {
        seen: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl ContentStore for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn load_items(&self, context: &FetchContext<'_>) -> ContentResult<()> {
            self.seen.lock().unwrap().push(context.pending_ids());
            Ok(())
        }
    }

    #[tokio::test]
    async fn callbacks_for_one_id_fire_once_in_order() {
        let store = InMemoryContentStore::new();
        store.insert(ContentItem::new("x", "page"));
        let scope = scope_with_store(store);
        let manager = ContentManager::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        manager.promise_to_get(&["x"], Some(recorder(&log, "cb1")));
        manager.promise_to_get(&["x"], Some(recorder(&log, "cb2")));
        assert_eq!(manager.pending_ids(), vec!["x"]);

        manager.fetch_content(&scope).await.unwrap();
        manager.fetch_content(&scope).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["cb1:x", "cb2:x"]);
        assert!(manager.pending_ids().is_empty());
        assert_eq!(manager.get_available_item("x").unwrap().type_name(), "page");
    }

    #[tokio::test]
    async fn one_callback_for_many_ids_fires_per_id() {
        let store = InMemoryContentStore::new();
        store.insert(ContentItem::new("/a", "page"));
        store.insert(ContentItem::new("/b", "page"));
        let scope = scope_with_store(store);
        let manager = ContentManager::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        manager.promise_to_get(&["/a", "/b"], Some(recorder(&log, "cb")));
        manager.fetch_content(&scope).await.unwrap();

        let mut seen = log.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["cb:/a", "cb:/b"]);
    }

    #[tokio::test]
    async fn already_fetched_ids_resolve_without_stores() {
        let manager = ContentManager::new();
        manager.resolve(Arc::new(ContentItem::new("/cached", "page")));
        let log = Arc::new(Mutex::new(Vec::new()));
        manager.promise_to_get(&["/cached"], Some(recorder(&log, "late")));

        // No stores registered at all.
        manager.fetch_content(&Scope::new(REQUEST_SCOPE)).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["late:/cached"]);
    }

    #[tokio::test]
    async fn missing_ids_are_not_an_error() {
        let scope = scope_with_store(InMemoryContentStore::new());
        let manager = ContentManager::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        manager.promise_to_get(&["/nowhere"], Some(recorder(&log, "cb")));

        manager.fetch_content(&scope).await.unwrap();
        assert!(log.lock().unwrap().is_empty());
        assert!(manager.pending_ids().is_empty());
        assert!(manager.get_available_item("/nowhere").is_none());
    }

    #[tokio::test]
    async fn unresolved_ids_are_not_offered_to_stores_again() {
        let scope = Scope::new(REQUEST_SCOPE);
        let counting = Arc::new(Counting::default());
        scope.register(
            CONTENT_STORE.name(),
            ServiceDescriptor::value::<dyn ContentStore>(counting.clone()),
        );
        let manager = ContentManager::new();

        manager.promise_to_get(&["/nowhere"], None);
        manager.fetch_content(&scope).await.unwrap();
        manager.promise_to_get(&["/later"], None);
        manager.fetch_content(&scope).await.unwrap();

        assert_eq!(
            *counting.seen.lock().unwrap(),
            vec![vec!["/nowhere".to_string()], vec!["/later".to_string()]]
        );
    }

    #[tokio::test]
    async fn invalid_ids_do_not_block_later_fetches() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("good.json"),
            r#"{"meta": {"type": "page"}}"#,
        )
        .unwrap();
        let scope = Scope::new(REQUEST_SCOPE);
        scope.register(
            CONTENT_STORE.name(),
            ServiceDescriptor::value::<dyn ContentStore>(Arc::new(JsonDirContentStore::new(
                dir.path(),
            ))),
        );
        let manager = ContentManager::new();

        manager.promise_to_get(&["/a/../b"], None);
        manager.fetch_content(&scope).await.unwrap();
        assert!(manager.pending_ids().is_empty());

        manager.promise_to_get(&["/good"], None);
        manager.fetch_content(&scope).await.unwrap();
        assert!(manager.get_available_item("/good").is_some());
        assert!(manager.get_available_item("/a/../b").is_none());
    }

    #[tokio::test]
    async fn ids_promised_while_fetching_stay_pending() {
        let store = InMemoryContentStore::new();
        store.insert(ContentItem::new("/a", "page"));
        let scope = scope_with_store(store);
        let manager = Arc::new(ContentManager::new());

        let inner = Arc::clone(&manager);
        let follow: ItemCallback = Arc::new(move |_item: &Arc<ContentItem>| {
            inner.promise_to_get(&["/b"], None);
        });
        manager.promise_to_get(&["/a"], Some(follow));
        manager.fetch_content(&scope).await.unwrap();

        assert!(manager.get_available_item("/a").is_some());
        assert_eq!(manager.pending_ids(), vec!["/b"]);
    }

    #[tokio::test]
    async fn failed_ids_stay_pending_for_retry() {
        let scope = Scope::new(REQUEST_SCOPE);
        let broken = Arc::new(Broken(AtomicUsize::new(0)));
        scope.register(
            CONTENT_STORE.name(),
            ServiceDescriptor::value::<dyn ContentStore>(broken.clone()),
        );
        let manager = ContentManager::new();
        manager.promise_to_get(&["/a"], None);

        assert!(manager.fetch_content(&scope).await.is_err());
        assert_eq!(manager.pending_ids(), vec!["/a"]);

        let store = InMemoryContentStore::new();
        store.insert(ContentItem::new("/a", "page"));
        let retry = scope_with_store(store);
        manager.fetch_content(&retry).await.unwrap();
        assert!(manager.pending_ids().is_empty());
        assert_eq!(broken.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stores_run_in_order_and_stop_when_done() {
        let first = InMemoryContentStore::new();
        first.insert(ContentItem::new("/a", "page"));
        let scope = scope_with_store(first);
        let broken = Arc::new(Broken(AtomicUsize::new(0)));
        scope.register(
            CONTENT_STORE.name(),
            ServiceDescriptor::value::<dyn ContentStore>(broken.clone()),
        );

        let manager = ContentManager::new();
        manager.promise_to_get(&["/a"], None);
        manager.fetch_content(&scope).await.unwrap();
        // Everything resolved by the first store, so the broken one is skipped.
        assert_eq!(broken.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn descriptor_answers_fetch_content_on_request_scope() {
        let shell = Scope::new("shell");
        shell.register(STORAGE_MANAGER.name(), ContentManager::descriptor());
        let store = InMemoryContentStore::new();
        store.insert(ContentItem::new("/foo", "page"));
        shell.register(
            CONTENT_STORE.name(),
            ServiceDescriptor::value::<dyn ContentStore>(Arc::new(store)),
        );
        shell.initialize();
        assert!(shell.require(&STORAGE_MANAGER).is_none());

        let request = shell.make_sub_scope(REQUEST_SCOPE, Default::default());
        request.initialize();
        let manager = request.require(&STORAGE_MANAGER).unwrap();
        manager.promise_to_get(&["/foo"], None);

        let ran = request
            .emit(ScopeEvent::FetchContent, tessera_scope::EventPayload::Empty)
            .await
            .unwrap();
        assert_eq!(ran, 1);
        assert!(manager.get_available_item("/foo").is_some());
    }
}
