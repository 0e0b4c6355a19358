use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use indexmap::IndexMap;
use tessera_scope::{Contract, ServiceDescriptor};

use crate::error::RenderResult;
use crate::page::PageContext;

/// The request's resource list.
pub const RESOURCE_REGISTRY: Contract<ResourceRegistry> = Contract::new("resource-registry");

/// Services that add meta tags, style sheets and scripts before rendering.
pub const RESOURCE_REGISTRAR: Contract<dyn ResourceRegistrar> =
    Contract::new("resource-registrar");

#[async_trait]
pub trait ResourceRegistrar: Send + Sync {
    async fn register_resources(&self, context: &mut PageContext) -> RenderResult<()>;
}

/// Kinds of page resources a layout can emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Meta,
    Style,
    Script,
}

#[derive(Default)]
struct Resources {
    meta: Vec<IndexMap<String, String>>,
    styles: Vec<String>,
    scripts: Vec<String>,
}

/// Request-scoped collection of `<meta>`, style sheet and script resources.
///
/// Style sheets and scripts are deduplicated by URL and kept in
/// registration order.
#[derive(Default)]
pub struct ResourceRegistry {
    inner: Mutex<Resources>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptor for a per-request registry.
    pub fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor::singleton::<ResourceRegistry, _>(|_, _| Arc::new(Self::new()))
            .with_name("resource-registry")
            .in_scope("request")
    }

    pub fn add_meta<I, K, V>(&self, attributes: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let attributes = attributes
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.inner
            .lock()
            .expect("resource lock poisoned")
            .meta
            .push(attributes);
    }

    pub fn add_style(&self, url: impl Into<String>) {
        let url = url.into();
        let mut inner = self.inner.lock().expect("resource lock poisoned");
        if !inner.styles.contains(&url) {
            inner.styles.push(url);
        }
    }

    pub fn add_script(&self, url: impl Into<String>) {
        let url = url.into();
        let mut inner = self.inner.lock().expect("resource lock poisoned");
        if !inner.scripts.contains(&url) {
            inner.scripts.push(url);
        }
    }

    pub fn styles(&self) -> Vec<String> {
        self.inner.lock().expect("resource lock poisoned").styles.clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.inner.lock().expect("resource lock poisoned").scripts.clone()
    }

    /// HTML for every resource of `kind`, one tag per line.
    pub fn render(&self, kind: ResourceKind) -> String {
        let inner = self.inner.lock().expect("resource lock poisoned");
        let mut out = String::new();
        match kind {
            ResourceKind::Meta => {
                for attributes in &inner.meta {
                    out.push_str("<meta");
                    for (name, value) in attributes {
                        out.push_str(&format!(" {name}=\"{}\"", encode(value)));
                    }
                    out.push_str(">\n");
                }
            }
            ResourceKind::Style => {
                for url in &inner.styles {
                    out.push_str(&format!(
                        "<link rel=\"stylesheet\" href=\"{}\">\n",
                        encode(url)
                    ));
                }
            }
            ResourceKind::Script => {
                for url in &inner.scripts {
                    out.push_str(&format!("<script src=\"{}\"></script>\n", encode(url)));
                }
            }
        }
        out
    }
}

/// HTML-escape `text`.
pub fn encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
