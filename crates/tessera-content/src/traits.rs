use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tessera_scope::{Contract, Scope};
use tessera_types::ContentItem;

use crate::error::ContentResult;
use crate::manager::FetchContext;

/// Services that resolve pending content ids from some backing medium.
pub const CONTENT_STORE: Contract<dyn ContentStore> = Contract::new("content-store");

/// Services that can list the items they hold.
pub const CONTENT_ENUMERATOR: Contract<dyn ContentEnumerator> =
    Contract::new("content-enumerator");

/// The request's content coordinator.
pub const STORAGE_MANAGER: Contract<dyn StorageManager> = Contract::new("storage-manager");

/// Callback fired with a fetched item. Registered per id; fired exactly once.
pub type ItemCallback = Arc<dyn Fn(&Arc<ContentItem>) + Send + Sync>;

/// A content store in the `content-store` chain.
///
/// Implementations must:
/// - only resolve ids returned by [`FetchContext::pending_ids`];
/// - hand every item they find to [`FetchContext::resolve`], which moves the
///   id out of the pending set and fires its callbacks;
/// - leave ids they do not hold untouched so later stores can try them.
///
/// Not finding an id is not an error.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn load_items(&self, context: &FetchContext<'_>) -> ContentResult<()>;
}

/// A pull-based, finite sequence of content items.
#[async_trait]
pub trait ItemEnumerator: Send {
    /// The next item, or `None` once the sequence is exhausted.
    async fn next_item(&mut self) -> ContentResult<Option<Arc<ContentItem>>>;
}

/// A store that can enumerate what it holds.
///
/// Each call returns a fresh enumerator starting from the beginning.
#[async_trait]
pub trait ContentEnumerator: Send + Sync {
    async fn item_enumerator(
        &self,
        scope: &Scope,
        id_filter: Option<&Regex>,
    ) -> ContentResult<Box<dyn ItemEnumerator>>;
}

/// Request-level content coordination: promise ids, then fetch them all at once.
#[async_trait]
pub trait StorageManager: Send + Sync {
    /// Mark `ids` as wanted, attaching `callback` to each one.
    fn promise_to_get(&self, ids: &[&str], callback: Option<ItemCallback>);

    /// Resolve every pending id through the `content-store` chain of `scope`.
    async fn fetch_content(&self, scope: &Scope) -> ContentResult<()>;

    /// An item already fetched during this request.
    fn get_available_item(&self, id: &str) -> Option<Arc<ContentItem>>;
}
