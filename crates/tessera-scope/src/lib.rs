//! Scoped dependency injection for Tessera.
//!
//! Every tenant ("shell") and every request gets its own [`Scope`]: a
//! container of service registrations, a singleton cache and an event bus.
//! Request scopes chain to their shell, so per-request code transparently
//! reaches shell-level services while keeping its own per-request instances.
//!
//! # Building blocks
//!
//! - [`Contract`] -- typed registry key (`Contract<dyn ContentStore>`)
//! - [`ServiceDescriptor`] -- how to produce a service: constructible,
//!   scope singleton, or static value
//! - [`Scope`] -- registration, resolution, sub-scopes, initialization
//! - [`Lifecycle`] -- a reusable sequential async pipeline of contract
//!   fan-outs and plain steps
//! - [`EventBus`] -- ordered, typed publish/subscribe per scope
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use tessera_scope::{Contract, Scope, ServiceDescriptor};
//!
//! pub trait Clock: Send + Sync {
//!     fn now(&self) -> u64;
//! }
//! struct Fixed;
//! impl Clock for Fixed {
//!     fn now(&self) -> u64 { 42 }
//! }
//! const CLOCK: Contract<dyn Clock> = Contract::new("clock");
//!
//! let shell = Scope::new("shell");
//! shell.register(CLOCK.name(), ServiceDescriptor::singleton::<dyn Clock, _>(|_, _| Arc::new(Fixed)));
//! let request = shell.make_sub_scope("request", Default::default());
//! assert_eq!(request.require(&CLOCK).unwrap().now(), 42);
//! ```

pub mod contract;
pub mod descriptor;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod scope;

pub use contract::Contract;
pub use descriptor::{DescriptorId, InitHook, Instance, Lifetime, ServiceDescriptor};
pub use error::{ScopeError, ScopeResult};
pub use event::{
    handler, BoxError, EventBus, EventHandler, EventPayload, HandlerResult, ScopeEvent,
    SubscriptionId,
};
pub use lifecycle::{BoxFuture, Lifecycle};
pub use scope::{Scope, WeakScope};
