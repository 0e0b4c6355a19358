use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

const ROOT_PREFIX: &str = "root:";

/// A hierarchical content identifier.
///
/// Ids are `/`-separated paths such as `/blog/hello`. A `root:` prefix marks
/// items addressed from the site root instead of the content area
/// (`root:/about`). Parsing normalizes the path: a leading `/` is added,
/// trailing `/` removed, and empty segments collapsed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentId {
    root: bool,
    path: String,
}

impl ContentId {
    pub fn parse(raw: &str) -> Result<Self, TypeError> {
        let trimmed = raw.trim();
        let (root, rest) = match trimmed.strip_prefix(ROOT_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        if trimmed.is_empty() || rest.split('/').any(|s| s == "..") {
            return Err(TypeError::InvalidId(raw.to_string()));
        }
        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        Ok(Self {
            root,
            path: format!("/{}", segments.join("/")),
        })
    }

    /// `true` for `root:` ids.
    pub fn is_root(&self) -> bool {
        self.root
    }

    /// The normalized path without the `root:` prefix.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|s| !s.is_empty())
    }

    /// The id one level up, or `None` at the top.
    pub fn parent(&self) -> Option<ContentId> {
        if self.path == "/" {
            return None;
        }
        let cut = self.path.rfind('/').unwrap_or(0);
        let parent = if cut == 0 { "/" } else { &self.path[..cut] };
        Some(Self {
            root: self.root,
            path: parent.to_string(),
        })
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.root {
            f.write_str(ROOT_PREFIX)?;
        }
        f.write_str(&self.path)
    }
}

impl TryFrom<String> for ContentId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContentId> for String {
    fn from(id: ContentId) -> Self {
        id.to_string()
    }
}
