use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::catalog::ServiceCatalog;
use crate::error::ShellResult;
use crate::settings::{ShellSettings, ANY_HOST};
use crate::shell::Shell;

/// The tenants a host serves.
///
/// Shells are matched against the request's host and port. An exact host
/// beats the `*` wildcard and an exact port beats a shell bound to any
/// port; among equal matches the first registered shell wins. Inactive
/// shells never match.
#[derive(Default)]
pub struct ShellRegistry {
    shells: RwLock<Vec<Arc<Shell>>>,
}

impl ShellRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `shell`, replacing a registered shell of the same name.
    pub fn register(&self, shell: Arc<Shell>) {
        let mut shells = self.shells.write().expect("registry lock poisoned");
        match shells.iter().position(|s| s.name() == shell.name()) {
            Some(index) => shells[index] = shell,
            None => shells.push(shell),
        }
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<Shell>> {
        let mut shells = self.shells.write().expect("registry lock poisoned");
        let index = shells.iter().position(|s| s.name() == name)?;
        Some(shells.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<Arc<Shell>> {
        self.shells
            .read()
            .expect("registry lock poisoned")
            .iter()
            .find(|s| s.name() == name)
            .cloned()
    }

    pub fn shells(&self) -> Vec<Arc<Shell>> {
        self.shells.read().expect("registry lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.shells.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The shell serving `host` on `port`.
    pub fn resolve(&self, host: Option<&str>, port: Option<u16>) -> Option<Arc<Shell>> {
        let shells = self.shells.read().expect("registry lock poisoned");
        let mut best: Option<(u8, &Arc<Shell>)> = None;
        for shell in shells.iter().filter(|s| s.is_active()) {
            let Some(rank) = match_rank(shell.settings(), host, port) else {
                continue;
            };
            if best.map_or(true, |(top, _)| rank > top) {
                best = Some((rank, shell));
            }
        }
        best.map(|(_, shell)| Arc::clone(shell))
    }

    /// Load every active shell. A shell that fails to load is logged and
    /// left unloaded; the first error is returned after all were tried.
    pub async fn load_all(&self) -> ShellResult<usize> {
        let mut loaded = 0;
        let mut first_error = None;
        for shell in self.shells().into_iter().filter(|s| s.is_active()) {
            match shell.load().await {
                Ok(_) => loaded += 1,
                Err(e) => {
                    warn!(shell = shell.name(), error = %e, "shell failed to load");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(loaded),
        }
    }

    /// Open every site under `sites_root`: each immediate subdirectory that
    /// holds a settings file becomes a shell.
    pub fn discover(
        sites_root: &Path,
        module_roots: &[PathBuf],
        catalog: Arc<ServiceCatalog>,
    ) -> ShellResult<Self> {
        let registry = Self::new();
        let sites = WalkDir::new(sites_root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_dir())
            .filter(|entry| ShellSettings::file_in(entry.path()).is_some());
        for site in sites {
            let shell = Shell::open(site.path(), module_roots, Arc::clone(&catalog))?;
            registry.register(Arc::new(shell));
        }
        info!(root = %sites_root.display(), shells = registry.len(), "discovered sites");
        Ok(registry)
    }
}

/// How well `settings` match a request; `None` when they don't.
/// Host specificity weighs more than port specificity.
fn match_rank(settings: &ShellSettings, host: Option<&str>, port: Option<u16>) -> Option<u8> {
    let host_rank = settings
        .hosts()
        .into_iter()
        .filter_map(|bound| {
            if bound == ANY_HOST {
                Some(0)
            } else if host.is_some_and(|h| h.eq_ignore_ascii_case(bound)) {
                Some(2)
            } else {
                None
            }
        })
        .max()?;
    let port_rank = match (settings.port, port) {
        (None, _) => 0,
        (Some(bound), Some(port)) if bound == port => 1,
        _ => return None,
    };
    Some(host_rank + port_rank)
}
