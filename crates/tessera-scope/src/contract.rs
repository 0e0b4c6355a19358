use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// The typed name of a service contract.
///
/// A contract ties a registry key (`"content-store"`) to the trait object
/// type that implementations resolve to (`dyn ContentStore`). Contracts are
/// plain constants, so crates declare them next to the trait:
///
/// ```rust
/// use tessera_scope::Contract;
///
/// pub trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// pub const GREETER: Contract<dyn Greeter> = Contract::new("greeter");
/// assert_eq!(GREETER.name(), "greeter");
/// ```
pub struct Contract<T: ?Sized> {
    name: &'static str,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized> Contract<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: ?Sized> Clone for Contract<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for Contract<T> {}

impl<T: ?Sized> fmt::Debug for Contract<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Contract").field(&self.name).finish()
    }
}

impl<T: ?Sized> fmt::Display for Contract<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
