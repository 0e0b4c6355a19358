use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::error::{ScopeError, ScopeResult};
use crate::lifecycle::BoxFuture;
use crate::scope::Scope;

/// Boxed error returned by event handlers from any crate.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of a single event handler.
pub type HandlerResult = Result<(), BoxError>;

/// A subscribed event handler. Receives the scope it was subscribed on and
/// the emitted payload.
pub type EventHandler =
    Arc<dyn Fn(Scope, EventPayload) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// The kinds of events a scope can emit.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ScopeEvent {
    /// A shell finished loading its modules.
    ShellLoaded,
    /// A request scope was created; attach per-request state.
    StartRequest,
    /// Resolve the content promised while routing.
    FetchContent,
    /// Build and render the page shape tree.
    RenderPage,
    /// Routing, fetching or rendering failed.
    RenderError,
    /// The request is about to be torn down.
    EndRequest,
    /// Application-defined event.
    Custom(String),
}

impl fmt::Display for ScopeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShellLoaded => f.write_str("shell-loaded"),
            Self::StartRequest => f.write_str("start-request"),
            Self::FetchContent => f.write_str("fetch-content"),
            Self::RenderPage => f.write_str("render-page"),
            Self::RenderError => f.write_str("render-error"),
            Self::EndRequest => f.write_str("end-request"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// Data carried by an emitted event.
#[derive(Clone, Debug)]
pub enum EventPayload {
    Empty,
    /// The scope the event concerns, typically a request scope.
    Scope(Scope),
    /// A failure observed while handling the request in `scope`.
    Error { scope: Scope, message: String },
}

impl EventPayload {
    pub fn scope(&self) -> Option<&Scope> {
        match self {
            Self::Empty => None,
            Self::Scope(scope) | Self::Error { scope, .. } => Some(scope),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    event: ScopeEvent,
    handler: EventHandler,
}

/// Ordered publish/subscribe bus owned by a scope.
///
/// Handlers for an event run one after another in subscription order. The
/// first failing handler stops the emission and its error is returned.
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self, event: ScopeEvent, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions
            .write()
            .expect("event bus lock poisoned")
            .push(Subscription { id, event, handler });
        id
    }

    /// Remove a subscription. Returns `true` if it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscriptions.write().expect("event bus lock poisoned");
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() < before
    }

    /// Number of handlers subscribed to `event`.
    pub fn handler_count(&self, event: &ScopeEvent) -> usize {
        self.subscriptions
            .read()
            .expect("event bus lock poisoned")
            .iter()
            .filter(|s| s.event == *event)
            .count()
    }

    pub fn clear(&self) {
        self.subscriptions
            .write()
            .expect("event bus lock poisoned")
            .clear();
    }

    /// Run every handler for `event` in order and return how many ran.
    ///
    /// The handler list is snapshotted before the first handler runs, so
    /// handlers may subscribe or unsubscribe without deadlocking.
    pub async fn emit(
        &self,
        scope: &Scope,
        event: ScopeEvent,
        payload: EventPayload,
    ) -> ScopeResult<usize> {
        let handlers: Vec<EventHandler> = self
            .subscriptions
            .read()
            .expect("event bus lock poisoned")
            .iter()
            .filter(|s| s.event == event)
            .map(|s| Arc::clone(&s.handler))
            .collect();

        debug!(scope = scope.name(), %event, handlers = handlers.len(), "emitting event");
        for handler in &handlers {
            handler(scope.clone(), payload.clone())
                .await
                .map_err(|source| ScopeError::Handler {
                    event: event.to_string(),
                    source,
                })?;
        }
        Ok(handlers.len())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self
            .subscriptions
            .read()
            .expect("event bus lock poisoned")
            .len();
        f.debug_struct("EventBus")
            .field("subscriptions", &count)
            .finish()
    }
}

/// Wrap an async closure as an [`EventHandler`].
pub fn handler<F, Fut>(f: F) -> EventHandler
where
    F: Fn(Scope, EventPayload) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(
        move |scope: Scope, payload: EventPayload| -> BoxFuture<'static, HandlerResult> {
            Box::pin(f(scope, payload))
        },
    )
}
