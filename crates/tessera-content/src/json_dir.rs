use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tessera_scope::Scope;
use tessera_types::{ContentId, ContentItem};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{ContentError, ContentResult};
use crate::manager::FetchContext;
use crate::traits::{ContentEnumerator, ContentStore, ItemEnumerator};

const EXTENSION: &str = "json";
const INDEX: &str = "index";

/// Content store reading one JSON document per item from a directory.
///
/// The id `/blog/hello` maps to `blog/hello.json`, falling back to
/// `blog/hello/index.json`. Ids with a `root:` prefix are looked up under the
/// site root instead of the content directory. Items always carry the
/// requested id, whatever `id` the document declares. Ids that cannot name a
/// file, such as ones with a `..` segment, are never found.
#[derive(Clone, Debug)]
pub struct JsonDirContentStore {
    content_dir: PathBuf,
    site_dir: PathBuf,
}

impl JsonDirContentStore {
    pub fn new(content_dir: impl Into<PathBuf>) -> Self {
        let content_dir = content_dir.into();
        Self {
            site_dir: content_dir.clone(),
            content_dir,
        }
    }

    /// Directory that `root:` ids resolve against.
    pub fn with_site_dir(mut self, site_dir: impl Into<PathBuf>) -> Self {
        self.site_dir = site_dir.into();
        self
    }

    pub fn content_dir(&self) -> &Path {
        &self.content_dir
    }

    /// Candidate files for `id`, most specific first.
    fn candidates(&self, id: &ContentId) -> Vec<PathBuf> {
        let base = if id.is_root() {
            &self.site_dir
        } else {
            &self.content_dir
        };
        let dir = id.segments().fold(base.clone(), |dir, s| dir.join(s));
        let mut out = Vec::with_capacity(2);
        if id.segments().next().is_some() {
            out.push(dir.with_extension(EXTENSION));
        }
        out.push(dir.join(INDEX).with_extension(EXTENSION));
        out
    }

    /// Load the item for `raw_id`, or `None` if no file holds it.
    pub async fn load(&self, raw_id: &str) -> ContentResult<Option<ContentItem>> {
        let id = ContentId::parse(raw_id)?;
        for path in self.candidates(&id) {
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => return read_item(&path, &text, raw_id).map(Some),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(source) => return Err(ContentError::Io { path, source }),
            }
        }
        Ok(None)
    }

    /// Ids of every document under the content directory, sorted.
    fn all_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = WalkDir::new(&self.content_dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == EXTENSION))
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(&self.content_dir).ok()?;
                let mut segments: Vec<String> = relative
                    .with_extension("")
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                if segments.last().is_some_and(|s| s == INDEX) {
                    segments.pop();
                }
                Some(format!("/{}", segments.join("/")))
            })
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

fn read_item(path: &Path, text: &str, id: &str) -> ContentResult<ContentItem> {
    let parse = |source| ContentError::Parse {
        path: path.to_path_buf(),
        source,
    };
    let mut value: Value =
        serde_json::from_str(text).map_err(|e| parse(tessera_types::TypeError::from(e)))?;
    if let Value::Object(map) = &mut value {
        map.insert("id".into(), Value::String(id.to_string()));
    }
    ContentItem::from_value(value).map_err(parse)
}

#[async_trait]
impl ContentStore for JsonDirContentStore {
    fn name(&self) -> &str {
        "json-dir"
    }

    /// Loads every pending id it can. A failing id does not stop the rest;
    /// the first failure is returned once all ids were tried.
    async fn load_items(&self, context: &FetchContext<'_>) -> ContentResult<()> {
        let mut first_error = None;
        for id in context.pending_ids() {
            if ContentId::parse(&id).is_err() {
                debug!(%id, "not a valid content id");
                continue;
            }
            match self.load(&id).await {
                Ok(Some(item)) => {
                    debug!(%id, dir = %self.content_dir.display(), "loaded item");
                    context.resolve(Arc::new(item));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(%id, error = %e, "failed to load item");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Loads each document lazily as the enumerator is advanced.
struct JsonDirEnumerator {
    store: JsonDirContentStore,
    ids: VecDeque<String>,
}

#[async_trait]
impl ItemEnumerator for JsonDirEnumerator {
    async fn next_item(&mut self) -> ContentResult<Option<Arc<ContentItem>>> {
        while let Some(id) = self.ids.pop_front() {
            if let Some(item) = self.store.load(&id).await? {
                return Ok(Some(Arc::new(item)));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl ContentEnumerator for JsonDirContentStore {
    async fn item_enumerator(
        &self,
        _scope: &Scope,
        id_filter: Option<&Regex>,
    ) -> ContentResult<Box<dyn ItemEnumerator>> {
        let ids = self
            .all_ids()
            .into_iter()
            .filter(|id| id_filter.map_or(true, |re| re.is_match(id)))
            .collect();
        Ok(Box::new(JsonDirEnumerator {
            store: self.clone(),
            ids,
        }))
    }
}
