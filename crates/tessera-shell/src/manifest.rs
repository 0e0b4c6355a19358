use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{ShellError, ShellResult};

/// File name of a module manifest.
pub const MANIFEST_FILE: &str = "module.toml";

/// One service a module contributes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceEntry {
    /// Module-relative service path, the catalog key together with the
    /// module name.
    pub path: String,
    /// Feature that must be enabled for the service to register.
    pub feature: Option<String>,
    /// Modules to load before this service registers.
    pub dependencies: Vec<String>,
    /// Scope level that owns the service's singleton, e.g. `request`.
    pub scope: Option<String>,
}

impl ServiceEntry {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// A module's `module.toml`.
///
/// ```toml
/// name = "blog"
/// priority = 10
///
/// [[services.route-handler]]
/// path = "routes/archive"
/// feature = "blog"
/// dependencies = ["core"]
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleManifest {
    pub name: String,
    /// Directory the manifest was read from.
    #[serde(skip)]
    pub path: PathBuf,
    /// Contract name to the services registered under it, in order.
    pub services: IndexMap<String, Vec<ServiceEntry>>,
    pub theme: bool,
    pub priority: i64,
}

impl ModuleManifest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_service(mut self, contract: impl Into<String>, entry: ServiceEntry) -> Self {
        self.services.entry(contract.into()).or_default().push(entry);
        self
    }

    pub fn as_theme(mut self) -> Self {
        self.theme = true;
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Parse a manifest for the module in `dir`. A missing `name` becomes
    /// the directory name.
    pub fn from_toml_str(text: &str, dir: &Path) -> ShellResult<Self> {
        let mut manifest: Self = toml::from_str(text).map_err(|e| ShellError::Manifest {
            path: dir.join(MANIFEST_FILE),
            message: e.to_string(),
        })?;
        if manifest.name.is_empty() {
            manifest.name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        manifest.path = dir.to_path_buf();
        Ok(manifest)
    }

    pub fn load(dir: &Path) -> ShellResult<Self> {
        let path = dir.join(MANIFEST_FILE);
        let text = std::fs::read_to_string(&path).map_err(|source| ShellError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_toml_str(&text, dir)
    }

    /// The module's `views/` directory.
    pub fn views_dir(&self) -> PathBuf {
        self.path.join("views")
    }

    /// The module's placement file.
    pub fn placement_file(&self) -> PathBuf {
        self.path.join("placement.json")
    }

    /// Total number of service entries.
    pub fn service_count(&self) -> usize {
        self.services.values().map(Vec::len).sum()
    }
}

/// Find the `module.toml` of every module directory up to two levels below
/// each root.
///
/// Roots are searched in order and the first module with a given name wins.
/// Missing roots are skipped.
pub fn discover(roots: &[PathBuf]) -> ShellResult<IndexMap<String, ModuleManifest>> {
    let mut modules = IndexMap::new();
    for root in roots {
        if !root.is_dir() {
            continue;
        }
        let entries = WalkDir::new(root)
            .min_depth(1)
            .max_depth(3)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file() && entry.file_name() == MANIFEST_FILE);
        for entry in entries {
            let Some(dir) = entry.path().parent() else {
                continue;
            };
            let manifest = ModuleManifest::load(dir)?;
            debug!(module = %manifest.name, path = %dir.display(), "discovered module");
            modules.entry(manifest.name.clone()).or_insert(manifest);
        }
    }
    Ok(modules)
}
