use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tessera_scope::ServiceDescriptor;

use crate::manifest::{ModuleManifest, ServiceEntry};

/// Builds the descriptor for one manifest service entry.
pub type ServiceFactory =
    Arc<dyn Fn(&ModuleManifest, &ServiceEntry) -> ServiceDescriptor + Send + Sync>;

/// Startup-time registry of service implementations.
///
/// Manifests name services by module-relative path; the catalog maps the
/// key `"<module>/<path>"` to the factory that builds the service, so every
/// implementation a site can load is linked into the binary and registered
/// here before any shell loads.
#[derive(Clone, Default)]
pub struct ServiceCatalog {
    factories: HashMap<String, ServiceFactory>,
}

impl ServiceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog key for a module's service path.
    pub fn key(module: &str, path: &str) -> String {
        format!("{module}/{path}")
    }

    /// Register a factory under `key`, replacing any earlier one.
    pub fn register<F>(&mut self, key: impl Into<String>, factory: F)
    where
        F: Fn(&ModuleManifest, &ServiceEntry) -> ServiceDescriptor + Send + Sync + 'static,
    {
        self.factories.insert(key.into(), Arc::new(factory));
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<F>(mut self, key: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ModuleManifest, &ServiceEntry) -> ServiceDescriptor + Send + Sync + 'static,
    {
        self.register(key, factory);
        self
    }

    pub fn get(&self, key: &str) -> Option<ServiceFactory> {
        self.factories.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Build the descriptor for `entry`, applying the manifest's feature,
    /// owning scope and dependencies.
    pub fn build(&self, module: &ModuleManifest, entry: &ServiceEntry) -> Option<ServiceDescriptor> {
        let key = Self::key(&module.name, &entry.path);
        let factory = self.factories.get(&key)?;
        let mut descriptor = factory(module, entry).with_dependencies(entry.dependencies.clone());
        if descriptor.name().is_none() {
            descriptor = descriptor.with_name(key);
        }
        if let Some(feature) = &entry.feature {
            descriptor = descriptor.with_feature(feature.clone());
        }
        if let Some(scope) = &entry.scope {
            descriptor = descriptor.in_scope(scope.clone());
        }
        Some(descriptor)
    }
}

impl fmt::Debug for ServiceCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCatalog")
            .field("services", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_scope::{Contract, Lifetime};

    const LABEL: Contract<String> = Contract::new("label");

    #[test]
    fn build_applies_manifest_entry() {
        let catalog = ServiceCatalog::new().with("blog/label", |module, entry| {
            ServiceDescriptor::value(Arc::new(format!("{}:{}", module.name, entry.path)))
        });
        let module = ModuleManifest::new("blog");
        let mut entry = ServiceEntry::new("label");
        entry.feature = Some("f1".into());
        entry.scope = Some("request".into());
        entry.dependencies = vec!["core".into()];

        let descriptor = catalog.build(&module, &entry).unwrap();
        assert_eq!(descriptor.name(), Some("blog/label"));
        assert_eq!(descriptor.feature(), Some("f1"));
        assert_eq!(descriptor.scope(), Some("request"));
        assert_eq!(descriptor.dependencies(), ["core".to_string()]);
        assert_eq!(descriptor.lifetime(), Lifetime::Static);

        let scope = tessera_scope::Scope::new("shell");
        scope.register(LABEL.name(), descriptor);
        assert_eq!(scope.require(&LABEL).unwrap().as_str(), "blog:label");
    }

    #[test]
    fn unknown_keys_build_nothing() {
        let catalog = ServiceCatalog::new();
        assert!(catalog.is_empty());
        assert!(catalog
            .build(&ModuleManifest::new("blog"), &ServiceEntry::new("nope"))
            .is_none());
    }
}
