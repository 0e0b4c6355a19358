//! Content fetch coordination for Tessera.
//!
//! During routing, handlers *promise* the content ids a page needs. Once
//! routing is done the request's [`ContentManager`] fetches every pending id
//! in one pass through the `content-store` service chain, deduplicating
//! concurrent requests for the same id and firing each registered callback
//! exactly once.
//!
//! # Collaborators
//!
//! - [`ContentStore`] -- resolves pending ids (`content-store` contract)
//! - [`ContentEnumerator`] -- lists items lazily (`content-enumerator`)
//! - [`StorageManager`] -- the request-level coordinator (`storage-manager`)
//!
//! Two stores ship with the crate: [`InMemoryContentStore`] and
//! [`JsonDirContentStore`].

pub mod error;
pub mod json_dir;
pub mod manager;
pub mod memory;
pub mod traits;

pub use error::{ContentError, ContentResult};
pub use json_dir::JsonDirContentStore;
pub use manager::{ContentManager, FetchContext, REQUEST_SCOPE};
pub use memory::{InMemoryContentStore, SnapshotEnumerator};
pub use traits::{
    ContentEnumerator, ContentStore, ItemCallback, ItemEnumerator, StorageManager,
    CONTENT_ENUMERATOR, CONTENT_STORE, STORAGE_MANAGER,
};
