//! Ordered placement of shapes into a zone tree.

use tracing::debug;

use crate::error::{ShapeError, ShapeResult};
use crate::order::Order;
use crate::shape::ShapeRef;

/// Path value meaning "do not place".
pub const NO_PLACE: &str = "-";

/// Place `shape` under `root` at the `/`-separated `path` with `order`.
///
/// Missing zones along the path are created. `path == "-"` leaves the shape
/// unplaced and returns `Ok(None)`; otherwise the terminal zone is returned.
pub fn place(
    root: &ShapeRef,
    path: &str,
    shape: &ShapeRef,
    order: &str,
) -> ShapeResult<Option<ShapeRef>> {
    if path.trim() == NO_PLACE {
        return Ok(None);
    }
    let segments: Vec<&str> = path
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    place_segments(root, &segments, shape, Order::parse(order)).map(Some)
}

/// Place `shape` along pre-split `segments`. An empty list targets `root`.
pub fn place_segments(
    root: &ShapeRef,
    segments: &[&str],
    shape: &ShapeRef,
    order: Order,
) -> ShapeResult<ShapeRef> {
    let zone = ensure_zone(root, segments);

    if zone.ptr_eq(shape) || zone.ancestors().iter().any(|a| a.ptr_eq(shape)) {
        return Err(ShapeError::Cycle(shape.type_name()));
    }

    detach(shape);
    {
        let mut placed = shape.write();
        placed.meta.order = order;
        placed.temp.parent = Some(zone.downgrade());
    }

    let order = shape.order();
    let siblings: Vec<_> = zone.items().iter().map(ShapeRef::order).collect();
    let index = order.insertion_index(siblings.iter());
    zone.write().temp.items.insert(index, shape.clone());
    let zone_name = zone.name();
    debug!(
        zone = zone_name.as_deref().unwrap_or("<root>"),
        shape = %shape_label(shape),
        %order,
        index,
        "placed shape"
    );
    Ok(zone)
}

/// Walk `segments` from `root`, creating any missing zones.
pub fn ensure_zone(root: &ShapeRef, segments: &[&str]) -> ShapeRef {
    let mut current = root.clone();
    for segment in segments {
        let existing = current.child_zone(segment);
        current = match existing {
            Some(zone) => zone,
            None => {
                let zone = ShapeRef::zone(*segment);
                zone.write().temp.parent = Some(current.downgrade());
                current
                    .write()
                    .temp
                    .zones
                    .insert(segment.to_string(), zone.clone());
                zone
            }
        };
    }
    current
}

/// Remove `shape` from its current parent's item list, if any.
pub fn detach(shape: &ShapeRef) {
    let Some(parent) = shape.parent() else {
        return;
    };
    parent.write().temp.items.retain(|s| !s.ptr_eq(shape));
    shape.write().temp.parent = None;
}

fn shape_label(shape: &ShapeRef) -> String {
    let s = shape.read();
    match (&s.meta.name, &s.meta.id) {
        (Some(name), _) => format!("{}:{}", s.meta.type_name, name),
        (None, Some(id)) => format!("{}:{}", s.meta.type_name, id),
        (None, None) => s.meta.type_name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labelled(label: &str) -> ShapeRef {
        let shape = ShapeRef::of_type("widget");
        shape.write().meta.name = Some(label.to_string());
        shape
    }

    fn item_orders(zone: &ShapeRef) -> Vec<String> {
        zone.items().iter().map(|s| s.order().to_string()).collect()
    }

    #[test]
    fn three_level_path_creates_each_zone_once() {
        let root = ShapeRef::of_type("layout");
        let zone = place(&root, "a/b/c", &labelled("x"), "1").unwrap().unwrap();
        assert_eq!(zone.name().as_deref(), Some("c"));
        assert!(zone.is_zone());

        let a = root.child_zone("a").unwrap();
        let b = a.child_zone("b").unwrap();
        let c = b.child_zone("c").unwrap();
        assert!(c.ptr_eq(&zone));
        assert!(c.parent().unwrap().ptr_eq(&b));
        assert!(b.parent().unwrap().ptr_eq(&a));
        assert!(a.parent().unwrap().ptr_eq(&root));

        place(&root, "a/b/c", &labelled("y"), "2").unwrap();
        place(&root, "a/b", &labelled("z"), "").unwrap();
        assert_eq!(root.zones().len(), 1);
        assert_eq!(a.zones().len(), 1);
        assert_eq!(b.zones().len(), 1);
        assert_eq!(c.items().len(), 2);
        assert_eq!(b.items().len(), 1);
    }

    #[test]
    fn reuses_existing_zone() {
        let root = ShapeRef::of_type("layout");
        let main = ensure_zone(&root, &["main"]);
        let zone = place(&root, "/main/", &labelled("x"), "").unwrap().unwrap();
        assert!(zone.ptr_eq(&main));
    }

    #[test]
    fn dash_path_does_not_place() {
        let root = ShapeRef::of_type("layout");
        let shape = labelled("x");
        assert!(place(&root, "-", &shape, "1").unwrap().is_none());
        assert!(root.zones().is_empty());
        assert!(shape.parent().is_none());
    }

    #[test]
    fn dotted_orders_land_sorted() {
        let root = ShapeRef::of_type("layout");
        for order in ["2.1", "2.0", "1"] {
            place(&root, "main", &labelled(order), order).unwrap();
        }
        let main = root.child_zone("main").unwrap();
        assert_eq!(item_orders(&main), vec!["1", "2.0", "2.1"]);
    }

    #[test]
    fn empty_path_places_into_root() {
        let root = ShapeRef::of_type("content");
        let shape = labelled("x");
        let zone = place(&root, "", &shape, "").unwrap().unwrap();
        assert!(zone.ptr_eq(&root));
        assert_eq!(root.items().len(), 1);
        assert!(shape.parent().unwrap().ptr_eq(&root));
    }

    #[test]
    fn placing_into_itself_is_a_cycle() {
        let root = ShapeRef::of_type("layout");
        let zone = ensure_zone(&root, &["a", "b"]);
        let a = root.child_zone("a").unwrap();
        let err = place_segments(&a, &["b"], &a, Order::default());
        assert!(matches!(err, Err(ShapeError::Cycle(_))));
        let err = place_segments(&zone, &[], &zone, Order::default());
        assert!(matches!(err, Err(ShapeError::Cycle(_))));
    }

    #[test]
    fn replacing_moves_the_shape() {
        let root = ShapeRef::of_type("layout");
        let shape = labelled("x");
        place(&root, "header", &shape, "1").unwrap();
        place(&root, "footer", &shape, "2").unwrap();
        assert!(root.child_zone("header").unwrap().items().is_empty());
        let footer = root.child_zone("footer").unwrap();
        assert_eq!(item_orders(&footer), vec!["2"]);
        assert!(shape.parent().unwrap().ptr_eq(&footer));
    }
}
