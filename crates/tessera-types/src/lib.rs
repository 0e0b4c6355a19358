//! Foundation types for Tessera.
//!
//! Content items are the unit of data fetched from content stores and turned
//! into shapes for rendering. Every other Tessera crate that touches content
//! depends on `tessera-types`.
//!
//! # Key Types
//!
//! - [`ContentItem`] -- an id, a typed meta block and named parts
//! - [`ContentPart`] -- a primitive value or a `{src, text, meta}` object
//! - [`ContentId`] -- hierarchical id, optionally prefixed with `root:`

pub mod error;
pub mod id;
pub mod item;

pub use error::TypeError;
pub use id::ContentId;
pub use item::{ContentItem, ContentPart, ItemMeta, PartMeta, PartObject};
