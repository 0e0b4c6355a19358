use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tessera_types::ContentItem;

use crate::order::Order;

/// Type name given to auto-created zone shapes.
pub const ZONE: &str = "zone";

/// Inline self-placement declared on a shape: either `"path:order"` or an
/// explicit `{ path, order }` object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlacementHint {
    Spec(String),
    Target {
        path: String,
        #[serde(default)]
        order: String,
    },
}

impl PlacementHint {
    /// Split the hint into `(path, order)`.
    pub fn target(&self) -> (String, String) {
        match self {
            Self::Spec(spec) => match spec.split_once(':') {
                Some((path, order)) => (path.to_string(), order.to_string()),
                None => (spec.clone(), String::new()),
            },
            Self::Target { path, order } => (path.clone(), order.clone()),
        }
    }
}

/// Persistent description of a shape.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapeMeta {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Template names to try before the type name, most specific first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternates: Vec<String>,
    #[serde(default, skip_serializing_if = "Order::is_empty")]
    pub order: Order,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<PlacementHint>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ShapeMeta {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Self::default()
        }
    }
}

/// Request-scoped working state of a shape. Never serialized.
#[derive(Default)]
pub struct ShapeTemp {
    pub parent: Option<WeakShapeRef>,
    pub items: Vec<ShapeRef>,
    pub zones: IndexMap<String, ShapeRef>,
    pub display_type: Option<String>,
    /// The content item this shape renders, once fetched.
    pub item: Option<Arc<ContentItem>>,
    /// Pre-rendered output; when set, rendering emits it verbatim.
    pub html: Option<String>,
    pub extra: Map<String, Value>,
}

/// A renderable node: persistent `meta` plus ephemeral `temp`.
#[derive(Default)]
pub struct Shape {
    pub meta: ShapeMeta,
    pub temp: ShapeTemp,
}

/// Shared handle to a [`Shape`] in a tree.
///
/// Guards returned by [`read`](Self::read) and [`write`](Self::write) must
/// not be held across an `.await`.
#[derive(Clone)]
pub struct ShapeRef {
    inner: Arc<RwLock<Shape>>,
}

/// Non-owning handle used for parent back-references.
#[derive(Clone)]
pub struct WeakShapeRef {
    inner: Weak<RwLock<Shape>>,
}

impl WeakShapeRef {
    pub fn upgrade(&self) -> Option<ShapeRef> {
        self.inner.upgrade().map(|inner| ShapeRef { inner })
    }
}

impl ShapeRef {
    pub fn new(meta: ShapeMeta) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Shape {
                meta,
                temp: ShapeTemp::default(),
            })),
        }
    }

    pub fn of_type(type_name: impl Into<String>) -> Self {
        Self::new(ShapeMeta::new(type_name))
    }

    /// A zone shape named `name`.
    pub fn zone(name: impl Into<String>) -> Self {
        let mut meta = ShapeMeta::new(ZONE);
        meta.name = Some(name.into());
        Self::new(meta)
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Shape> {
        self.inner.read().expect("shape lock poisoned")
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Shape> {
        self.inner.write().expect("shape lock poisoned")
    }

    pub fn downgrade(&self) -> WeakShapeRef {
        WeakShapeRef {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &ShapeRef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // -- meta ---------------------------------------------------------------

    pub fn type_name(&self) -> String {
        self.read().meta.type_name.clone()
    }

    pub fn is_zone(&self) -> bool {
        self.read().meta.type_name == ZONE
    }

    pub fn name(&self) -> Option<String> {
        self.read().meta.name.clone()
    }

    pub fn id(&self) -> Option<String> {
        self.read().meta.id.clone()
    }

    pub fn alternates(&self) -> Vec<String> {
        self.read().meta.alternates.clone()
    }

    /// Append an alternate template name unless already present.
    pub fn add_alternate(&self, alternate: impl Into<String>) {
        let alternate = alternate.into();
        let mut shape = self.write();
        if !shape.meta.alternates.contains(&alternate) {
            shape.meta.alternates.push(alternate);
        }
    }

    pub fn order(&self) -> Order {
        self.read().meta.order.clone()
    }

    pub fn placement(&self) -> Option<PlacementHint> {
        self.read().meta.placement.clone()
    }

    pub fn meta(&self) -> ShapeMeta {
        self.read().meta.clone()
    }

    // -- temp ---------------------------------------------------------------

    pub fn parent(&self) -> Option<ShapeRef> {
        self.read().temp.parent.as_ref().and_then(WeakShapeRef::upgrade)
    }

    pub fn items(&self) -> Vec<ShapeRef> {
        self.read().temp.items.clone()
    }

    pub fn zones(&self) -> Vec<(String, ShapeRef)> {
        self.read()
            .temp
            .zones
            .iter()
            .map(|(name, zone)| (name.clone(), zone.clone()))
            .collect()
    }

    pub fn child_zone(&self, name: &str) -> Option<ShapeRef> {
        self.read().temp.zones.get(name).cloned()
    }

    pub fn display_type(&self) -> Option<String> {
        self.read().temp.display_type.clone()
    }

    pub fn set_display_type(&self, display_type: impl Into<String>) {
        self.write().temp.display_type = Some(display_type.into());
    }

    pub fn item(&self) -> Option<Arc<ContentItem>> {
        self.read().temp.item.clone()
    }

    pub fn html(&self) -> Option<String> {
        self.read().temp.html.clone()
    }

    pub fn set_html(&self, html: impl Into<String>) {
        self.write().temp.html = Some(html.into());
    }

    pub fn temp_value(&self, key: &str) -> Option<Value> {
        self.read().temp.extra.get(key).cloned()
    }

    pub fn set_temp_value(&self, key: impl Into<String>, value: Value) {
        self.write().temp.extra.insert(key.into(), value);
    }

    /// Shapes from this one up to the tree root, nearest first.
    pub fn ancestors(&self) -> Vec<ShapeRef> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(shape) = current {
            current = shape.parent();
            out.push(shape);
        }
        out
    }

    /// All descendants depth-first: each item subtree in order, then each
    /// zone subtree in enumeration order.
    pub fn descendants(&self) -> Vec<ShapeRef> {
        let mut out = Vec::new();
        let mut stack: Vec<ShapeRef> = self.children().into_iter().rev().collect();
        while let Some(shape) = stack.pop() {
            stack.extend(shape.children().into_iter().rev());
            out.push(shape);
        }
        out
    }

    /// Direct children: items in order, then zones.
    pub fn children(&self) -> Vec<ShapeRef> {
        let shape = self.read();
        shape
            .temp
            .items
            .iter()
            .cloned()
            .chain(shape.temp.zones.values().cloned())
            .collect()
    }

    // -- lookups ------------------------------------------------------------

    /// The shape's meta as JSON, including `displayType`.
    pub fn meta_json(&self) -> Value {
        let shape = self.read();
        let mut value = serde_json::to_value(&shape.meta).unwrap_or(Value::Null);
        if let (Value::Object(map), Some(display_type)) = (&mut value, &shape.temp.display_type) {
            map.insert("displayType".into(), Value::String(display_type.clone()));
        }
        value
    }

    /// Look up a dotted path (`"meta.name"`, `"meta.tags.0"`, `"item.meta.type"`)
    /// against `{ meta, item }`.
    pub fn lookup(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.').filter(|s| !s.is_empty());
        let root = match segments.next()? {
            "meta" => self.meta_json(),
            "item" => serde_json::to_value(self.item()?.as_ref()).ok()?,
            _ => return None,
        };
        segments.try_fold(root, |value, segment| match value {
            Value::Object(mut map) => map.remove(segment),
            Value::Array(mut list) => {
                let index: usize = segment.parse().ok()?;
                (index < list.len()).then(|| list.swap_remove(index))
            }
            _ => None,
        })
    }
}

impl fmt::Debug for ShapeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = self.read();
        f.debug_struct("Shape")
            .field("type", &shape.meta.type_name)
            .field("name", &shape.meta.name)
            .field("order", &shape.meta.order.to_string())
            .field("items", &shape.temp.items.len())
            .field("zones", &shape.temp.zones.keys().collect::<Vec<_>>())
            .finish()
    }
}
