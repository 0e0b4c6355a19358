use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::contract::Contract;
use crate::scope::Scope;

/// A boxed, sendable future borrowing for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ---------------------------------------------------------------------------
// Step trait
// ---------------------------------------------------------------------------

/// A single stage of a [`Lifecycle`].
trait LifecycleStep<C, E>: Send + Sync {
    fn run<'a>(&'a self, scope: &'a Scope, context: &'a mut C) -> BoxFuture<'a, Result<(), E>>;
}

/// Invokes a method on every service registered for a contract, in order.
struct ServiceStep<T: ?Sized, F> {
    contract: Contract<T>,
    invoke: F,
}

impl<T, C, E, F> LifecycleStep<C, E> for ServiceStep<T, F>
where
    T: ?Sized + Send + Sync + 'static,
    C: Send,
    E: Send,
    F: for<'b> Fn(Arc<T>, &'b mut C) -> BoxFuture<'b, Result<(), E>> + Send + Sync,
{
    fn run<'a>(&'a self, scope: &'a Scope, context: &'a mut C) -> BoxFuture<'a, Result<(), E>> {
        Box::pin(async move {
            for service in scope.get_services(&self.contract) {
                (self.invoke)(service, &mut *context).await?;
            }
            Ok(())
        })
    }
}

/// A plain function stage.
struct FnStep<F>(F);

impl<C, E, F> LifecycleStep<C, E> for FnStep<F>
where
    F: for<'b> Fn(&'b Scope, &'b mut C) -> BoxFuture<'b, Result<(), E>> + Send + Sync,
{
    fn run<'a>(&'a self, scope: &'a Scope, context: &'a mut C) -> BoxFuture<'a, Result<(), E>> {
        (self.0)(scope, context)
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// A reusable sequential pipeline over a shared context.
///
/// Steps are either contract fan-outs ("call this method on every service
/// registered as `placement-strategy`") or plain async functions. Running
/// the lifecycle executes the steps strictly in order, each one fully
/// completing before the next begins, and stops at the first error.
///
/// ```rust
/// use std::convert::Infallible;
/// use tessera_scope::Lifecycle;
///
/// let pipeline = Lifecycle::<Vec<&'static str>, Infallible>::new()
///     .step("one", |_scope, log| Box::pin(async move { log.push("one"); Ok(()) }))
///     .step("two", |_scope, log| Box::pin(async move { log.push("two"); Ok(()) }));
/// assert_eq!(pipeline.labels(), vec!["one", "two"]);
/// ```
pub struct Lifecycle<C, E> {
    steps: Vec<(String, Box<dyn LifecycleStep<C, E>>)>,
}

impl<C, E> Lifecycle<C, E>
where
    C: Send + 'static,
    E: Send + 'static,
{
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Append a step that calls `invoke` on every service for `contract`.
    pub fn service<T, F>(mut self, contract: Contract<T>, invoke: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: for<'b> Fn(Arc<T>, &'b mut C) -> BoxFuture<'b, Result<(), E>> + Send + Sync + 'static,
    {
        self.steps.push((
            contract.name().to_string(),
            Box::new(ServiceStep { contract, invoke }),
        ));
        self
    }

    /// Append a plain function step.
    pub fn step<F>(mut self, label: impl Into<String>, f: F) -> Self
    where
        F: for<'b> Fn(&'b Scope, &'b mut C) -> BoxFuture<'b, Result<(), E>>
            + Send
            + Sync
            + 'static,
    {
        self.steps.push((label.into(), Box::new(FnStep(f))));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step labels in execution order.
    pub fn labels(&self) -> Vec<&str> {
        self.steps.iter().map(|(label, _)| label.as_str()).collect()
    }

    /// Run every step in order against `context`.
    pub async fn run(&self, scope: &Scope, context: &mut C) -> Result<(), E> {
        for (label, step) in &self.steps {
            debug!(scope = scope.name(), step = %label, "lifecycle step");
            step.run(scope, &mut *context).await?;
        }
        Ok(())
    }
}

impl<C, E> Default for Lifecycle<C, E>
where
    C: Send + 'static,
    E: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
