use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TypeError;

/// The `meta` block of a content item.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemMeta {
    /// Content type name (`page`, `blog-post`, ...).
    #[serde(rename = "type", default)]
    pub type_name: String,
    /// Any further metadata (title overrides, tags, placement hints).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Metadata attached to an object part.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PartMeta {
    /// Shape type to render this part with, overriding the part name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A structured part: inline `text`, an external `src`, or both.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PartObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<PartMeta>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A named part of a content item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentPart {
    Object(PartObject),
    Primitive(Value),
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Object(PartObject {
            text: Some(text.into()),
            ..PartObject::default()
        })
    }

    /// Shape type declared in the part's `meta.shape`, if any.
    pub fn shape_type(&self) -> Option<&str> {
        match self {
            Self::Object(obj) => obj.meta.as_ref().and_then(|m| m.shape.as_deref()),
            Self::Primitive(_) => None,
        }
    }

    /// The part as a JSON value.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl From<Value> for ContentPart {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(_) => serde_json::from_value::<PartObject>(value.clone())
                .map(Self::Object)
                .unwrap_or(Self::Primitive(value)),
            other => Self::Primitive(other),
        }
    }
}

/// A unit of content: an id, a typed meta block and named parts.
///
/// Items are treated as immutable once fetched; stores may cache and share
/// them across requests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    #[serde(default)]
    pub meta: ItemMeta,
    #[serde(flatten)]
    pub parts: IndexMap<String, ContentPart>,
}

impl ContentItem {
    pub fn new(id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            meta: ItemMeta {
                type_name: type_name.into(),
                extra: Map::new(),
            },
            parts: IndexMap::new(),
        }
    }

    pub fn with_part(mut self, name: impl Into<String>, part: impl Into<ContentPart>) -> Self {
        self.parts.insert(name.into(), part.into());
        self
    }

    pub fn type_name(&self) -> &str {
        &self.meta.type_name
    }

    pub fn part(&self, name: &str) -> Option<&ContentPart> {
        self.parts.get(name)
    }

    /// Parse an item from JSON text, requiring a non-empty id and type.
    pub fn from_json(text: &str) -> Result<Self, TypeError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Build an item from a JSON value, requiring a non-empty id and type.
    pub fn from_value(value: Value) -> Result<Self, TypeError> {
        let item: ContentItem = serde_json::from_value(value)?;
        if item.id.trim().is_empty() {
            return Err(TypeError::InvalidId(item.id));
        }
        if item.meta.type_name.is_empty() {
            return Err(TypeError::MissingType);
        }
        Ok(item)
    }
}
