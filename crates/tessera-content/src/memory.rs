use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use regex::Regex;
use tessera_scope::Scope;
use tessera_types::ContentItem;

use crate::error::ContentResult;
use crate::manager::FetchContext;
use crate::traits::{ContentEnumerator, ContentStore, ItemEnumerator};

/// In-memory content store keyed by item id.
///
/// Intended for tests and embedding. Items are shared as `Arc`s, so a
/// resolved item is the same allocation the store holds.
pub struct InMemoryContentStore {
    items: RwLock<BTreeMap<String, Arc<ContentItem>>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
        }
    }

    /// Build a store holding `items`.
    pub fn with_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = ContentItem>,
    {
        let store = Self::new();
        for item in items {
            store.insert(item);
        }
        store
    }

    /// Insert or replace an item.
    pub fn insert(&self, item: ContentItem) -> Arc<ContentItem> {
        let item = Arc::new(item);
        self.items
            .write()
            .expect("lock poisoned")
            .insert(item.id.clone(), Arc::clone(&item));
        item
    }

    pub fn remove(&self, id: &str) -> Option<Arc<ContentItem>> {
        self.items.write().expect("lock poisoned").remove(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<ContentItem>> {
        self.items.read().expect("lock poisoned").get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.items.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().expect("lock poisoned").is_empty()
    }
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load_items(&self, context: &FetchContext<'_>) -> ContentResult<()> {
        for id in context.pending_ids() {
            if let Some(item) = self.get(&id) {
                context.resolve(item);
            }
        }
        Ok(())
    }
}

/// Enumerates a snapshot of items taken when the enumerator was created.
pub struct SnapshotEnumerator {
    items: VecDeque<Arc<ContentItem>>,
}

impl SnapshotEnumerator {
    pub fn new<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Arc<ContentItem>>,
    {
        Self {
            items: items.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ItemEnumerator for SnapshotEnumerator {
    async fn next_item(&mut self) -> ContentResult<Option<Arc<ContentItem>>> {
        Ok(self.items.pop_front())
    }
}

#[async_trait]
impl ContentEnumerator for InMemoryContentStore {
    async fn item_enumerator(
        &self,
        _scope: &Scope,
        id_filter: Option<&Regex>,
    ) -> ContentResult<Box<dyn ItemEnumerator>> {
        let items: Vec<Arc<ContentItem>> = self
            .items
            .read()
            .expect("lock poisoned")
            .values()
            .filter(|item| id_filter.map_or(true, |re| re.is_match(&item.id)))
            .cloned()
            .collect();
        Ok(Box::new(SnapshotEnumerator::new(items)))
    }
}
