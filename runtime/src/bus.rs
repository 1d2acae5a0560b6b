//! Per-request publish/subscribe.
//!
//! Every request owns one [`EventBus`]; there is no process-wide registry.
//! Subscribers come in two flavours:
//!
//! - **Handlers** registered with [`EventBus::on`] / [`EventBus::on_any`] run
//!   synchronously inside `emit`. A `change:*` handler therefore runs before
//!   the new value is stored and can compare `prev` against `next` while the
//!   handle still reports the old state.
//! - **Receivers** from [`EventBus::subscribe`] get a copy of every event over
//!   a `tokio::sync::broadcast` channel, for async observers.
//!
//! The [`Observable`] trait attaches the subscription API to any type that
//! exposes a bus, which is how [`RequestHandle`](crate::RequestHandle) gets
//! `on`, `on_done`, `on_fail` and friends.

use hookline_core::{AdapterError, EventKind, RequestEvent, StateSnapshot};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

type Handler<P, R> = Arc<dyn Fn(&RequestEvent<P, R>) + Send + Sync>;

/// Event bus owned by a single request.
pub struct EventBus<P, R> {
    handlers: RwLock<HashMap<EventKind, Vec<Handler<P, R>>>>,
    wildcard: RwLock<Vec<Handler<P, R>>>,
    sender: broadcast::Sender<RequestEvent<P, R>>,
}

impl<P, R> EventBus<P, R>
where
    P: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    /// Create a bus whose broadcast channel buffers `capacity` events.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            handlers: RwLock::new(HashMap::new()),
            wildcard: RwLock::new(Vec::new()),
            sender,
        }
    }

    /// Register a handler for one kind of event.
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&RequestEvent<P, R>) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Register a handler for every event.
    pub fn on_any<F>(&self, handler: F)
    where
        F: Fn(&RequestEvent<P, R>) + Send + Sync + 'static,
    {
        self.wildcard
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(handler));
    }

    /// Receive every event emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RequestEvent<P, R>> {
        self.sender.subscribe()
    }

    /// Number of handlers registered for `kind`, wildcard handlers excluded.
    #[must_use]
    pub fn handler_count(&self, kind: &EventKind) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .map_or(0, Vec::len)
    }

    /// Deliver `event` to matching handlers, wildcard handlers, then receivers.
    ///
    /// Handlers are collected before any of them runs, so a handler may
    /// register further handlers without deadlocking; those only see later
    /// events.
    pub fn emit(&self, event: RequestEvent<P, R>) {
        let kind = event.kind();
        let mut targets: Vec<Handler<P, R>> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .unwrap_or_default();
        targets.extend(
            self.wildcard
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .cloned(),
        );

        tracing::trace!(event = %kind, handlers = targets.len(), "Emitting event");
        for handler in &targets {
            handler(&event);
        }

        // No receivers is not an error: nobody subscribed.
        let _ = self.sender.send(event);
    }
}

impl<P, R> fmt::Debug for EventBus<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("receivers", &self.sender.receiver_count())
            .finish_non_exhaustive()
    }
}

/// Attaches the subscription API to anything that owns an [`EventBus`].
pub trait Observable<P, R>
where
    P: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    /// The bus to subscribe on.
    fn events(&self) -> &EventBus<P, R>;

    /// Subscribe to one kind of event.
    fn on<F>(&self, kind: EventKind, handler: F) -> &Self
    where
        F: Fn(&RequestEvent<P, R>) + Send + Sync + 'static,
    {
        self.events().on(kind, handler);
        self
    }

    /// Subscribe to every event.
    fn on_any<F>(&self, handler: F) -> &Self
    where
        F: Fn(&RequestEvent<P, R>) + Send + Sync + 'static,
    {
        self.events().on_any(handler);
        self
    }

    /// Run `handler` with the result and snapshot when the done chain finishes.
    fn on_done<F>(&self, handler: F) -> &Self
    where
        F: Fn(Option<&R>, &StateSnapshot<P, R>) + Send + Sync + 'static,
    {
        self.on(EventKind::Done, move |event| {
            if let RequestEvent::Done { result, snapshot } = event {
                handler(result.as_ref(), snapshot);
            }
        })
    }

    /// Run `handler` with the result and snapshot when the fail chain finishes.
    fn on_fail<F>(&self, handler: F) -> &Self
    where
        F: Fn(Option<&R>, &StateSnapshot<P, R>) + Send + Sync + 'static,
    {
        self.on(EventKind::Fail, move |event| {
            if let RequestEvent::Fail { result, snapshot } = event {
                handler(result.as_ref(), snapshot);
            }
        })
    }

    /// Run `handler` after either terminal chain finishes.
    fn on_finish<F>(&self, handler: F) -> &Self
    where
        F: Fn(Option<&R>, &StateSnapshot<P, R>) + Send + Sync + 'static,
    {
        self.on(EventKind::Finish, move |event| {
            if let RequestEvent::Finish { result, snapshot } = event {
                handler(result.as_ref(), snapshot);
            }
        })
    }

    /// Run `handler` when the request is cancelled.
    fn on_cancel<F>(&self, handler: F) -> &Self
    where
        F: Fn(&StateSnapshot<P, R>) + Send + Sync + 'static,
    {
        self.on(EventKind::Cancel, move |event| {
            if let RequestEvent::Cancel { snapshot } = event {
                handler(snapshot);
            }
        })
    }

    /// Run `handler` when the adapter faults.
    fn on_error<F>(&self, handler: F) -> &Self
    where
        F: Fn(&AdapterError) + Send + Sync + 'static,
    {
        self.on(EventKind::Error, move |event| {
            if let RequestEvent::Error(error) = event {
                handler(error);
            }
        })
    }
}
