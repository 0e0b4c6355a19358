use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tessera_shape::PlacementHint;

use crate::error::{PlacementError, PlacementResult};

/// Declarative placement configuration, usually a module's `placement.json`.
///
/// ```json
/// {
///   "matches": [
///     { "type": "^title$", "displayType": "^main$", "path": "header", "order": "1" },
///     { "meta": { "meta.tags.0": "^featured$" }, "path": "main/top", "order": "before" }
///   ],
///   "types": { "body": "main:5", "hero": { "path": "top", "order": "1" } }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlacementConfig {
    /// Regex rules, tried in order.
    #[serde(default)]
    pub matches: Vec<MatchRuleConfig>,
    /// Shape type name to target.
    #[serde(default)]
    pub types: IndexMap<String, PlacementHint>,
}

/// One declarative match rule. Every pattern given must match; a rule with
/// no patterns matches any shape.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRuleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Dotted lookup path (`meta.x.y`, `item.meta.type`) to pattern.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub meta: IndexMap<String, String>,
    pub path: String,
    #[serde(default)]
    pub order: String,
}

impl PlacementConfig {
    pub fn from_json_str(text: &str) -> PlacementResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> PlacementResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| PlacementError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Append `other`'s rules after this config's; `other`'s type entries win.
    pub fn merge(&mut self, other: PlacementConfig) {
        self.matches.extend(other.matches);
        self.types.extend(other.types);
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty() && self.types.is_empty()
    }
}
