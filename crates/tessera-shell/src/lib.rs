//! Tenant shells for Tessera.
//!
//! A [`Shell`] is one site: its [`ShellSettings`], the modules discovered
//! for it and a long-lived [`Scope`](tessera_scope::Scope) that every
//! request scope hangs off. Loading a shell walks module manifests in
//! dependency order (themes last), builds each declared service from the
//! [`ServiceCatalog`] and registers it on the shell scope.
//!
//! [`Shell::handle_request`] runs the request lifecycle: `start-request`,
//! the `route-handler` chain, `fetch-content`, `render-page`, then
//! `end-request` and teardown. A [`ShellRegistry`] picks the shell for a
//! host and port.

pub mod catalog;
pub mod error;
pub mod localize;
pub mod manifest;
pub mod registry;
pub mod request;
pub mod settings;
pub mod shell;

pub use catalog::{ServiceCatalog, ServiceFactory};
pub use error::{ShellError, ShellResult};
pub use localize::{localize, substitute, IdentityLocalizer, Localizer, LOCALIZER};
pub use manifest::{discover, ModuleManifest, ServiceEntry, MANIFEST_FILE};
pub use registry::ShellRegistry;
pub use request::{
    ContentRouteHandler, Request, RequestContext, Response, RouteHandler, ROUTE_HANDLER,
};
pub use settings::{HostBinding, ShellSettings, TlsConfig, ANY_HOST};
pub use shell::{Shell, REQUEST_SCOPE, SHELL_SCOPE};
