//! Shape tree for Tessera.
//!
//! A [`ShapeRef`] is a renderable node with persistent `meta` and
//! request-scoped `temp` state. Shapes hang off zones, which are created on
//! demand by [`place`] and keep their items sorted by [`Order`].

pub mod error;
pub mod order;
pub mod place;
pub mod shape;

pub use error::{ShapeError, ShapeResult};
pub use order::{Order, OrderToken};
pub use place::{detach, ensure_zone, place, place_segments, NO_PLACE};
pub use shape::{PlacementHint, Shape, ShapeMeta, ShapeRef, ShapeTemp, WeakShapeRef, ZONE};
