//! The adapter contract.
//!
//! An adapter performs the actual unit of work of a request (a network call,
//! a database query, a computation). The engine only consumes it: it calls
//! [`Adapter::call`] once per pass through the `before` chain and routes the
//! settlement into the `done` or `fail` chain.
//!
//! # Settling
//!
//! `call` must invoke exactly one of [`AdapterContext::resolve`] or
//! [`AdapterContext::reject`]. The first call wins. The returned future is
//! spawned on its own task and is only watched for faults: if it resolves to
//! an error (or panics) before the request was settled, the request faults and
//! its completion returns that error. A fault after settlement is logged and
//! ignored.
//!
//! # Example
//!
//! ```ignore
//! struct Echo;
//!
//! impl Adapter for Echo {
//!     type Payload = String;
//!     type Output = String;
//!
//!     fn call(&self, ctx: AdapterContext<String, String>) -> AdapterFuture {
//!         Box::pin(async move {
//!             let body = ctx.payload().clone();
//!             ctx.resolve(body);
//!             Ok(())
//!         })
//!     }
//! }
//! ```

use crate::bus::EventBus;
use crate::hook::Settler;
use futures::future::BoxFuture;
use hookline_core::{AdapterError, Meta, RequestEvent, Route, Step};
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};

/// Future returned by [`Adapter::call`].
pub type AdapterFuture = BoxFuture<'static, Result<(), AdapterError>>;

/// A shared, type-erased adapter.
pub type SharedAdapter<P, R> = Arc<dyn Adapter<Payload = P, Output = R>>;

/// A transport (or any other unit of work) plugged into the engine.
pub trait Adapter: Send + Sync + 'static {
    /// The request payload type.
    type Payload: Clone + fmt::Debug + Send + Sync + 'static;

    /// The result type, used for both resolved and rejected outcomes.
    type Output: Clone + fmt::Debug + Send + Sync + 'static;

    /// Perform the unit of work and settle `ctx`.
    fn call(&self, ctx: AdapterContext<Self::Payload, Self::Output>) -> AdapterFuture;

    /// Initial `result` of a freshly issued request.
    fn create_state(&self) -> Option<Self::Output> {
        None
    }

    /// Transform the payload right before [`Adapter::call`] sees it.
    fn convert(&self, payload: Self::Payload) -> Self::Payload {
        payload
    }

    /// Combine a previous result with an incoming one.
    ///
    /// Part of the contract for callers that accumulate results across
    /// requests. The engine itself never calls it.
    fn merge(&self, current: Option<Self::Output>, incoming: Self::Output) -> Self::Output {
        let _ = current;
        incoming
    }
}

type CancelCallback = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Holds the most recently registered adapter cancellation callback.
#[derive(Default)]
pub(crate) struct CancelSlot(Mutex<Option<CancelCallback>>);

impl CancelSlot {
    fn register(&self, callback: CancelCallback) {
        let replaced = self
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(callback);
        if replaced.is_some() {
            tracing::trace!("Replaced previously registered cancel callback");
        }
    }

    pub(crate) fn take(&self) -> Option<CancelCallback> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// Capabilities handed to [`Adapter::call`].
pub struct AdapterContext<P, R> {
    meta: Arc<Meta>,
    payload: P,
    result: Option<R>,
    settler: Settler<R, P, R>,
    events: Arc<EventBus<P, R>>,
    cancel: Arc<CancelSlot>,
}

impl<P, R> Clone for AdapterContext<P, R>
where
    P: Clone,
    R: Clone,
{
    fn clone(&self) -> Self {
        Self {
            meta: Arc::clone(&self.meta),
            payload: self.payload.clone(),
            result: self.result.clone(),
            settler: self.settler.clone(),
            events: Arc::clone(&self.events),
            cancel: Arc::clone(&self.cancel),
        }
    }
}

impl<P: fmt::Debug, R: fmt::Debug> fmt::Debug for AdapterContext<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterContext")
            .field("meta", &self.meta)
            .field("payload", &self.payload)
            .field("result", &self.result)
            .field("settled", &self.settler.is_settled())
            .finish_non_exhaustive()
    }
}

impl<P, R> AdapterContext<P, R>
where
    P: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    pub(crate) const fn new(
        meta: Arc<Meta>,
        payload: P,
        result: Option<R>,
        settler: Settler<R, P, R>,
        events: Arc<EventBus<P, R>>,
        cancel: Arc<CancelSlot>,
    ) -> Self {
        Self {
            meta,
            payload,
            result,
            settler,
            events,
            cancel,
        }
    }

    /// Request metadata.
    #[must_use]
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// The payload, already passed through [`Adapter::convert`].
    #[must_use]
    pub const fn payload(&self) -> &P {
        &self.payload
    }

    /// The request's result at the time of the call.
    #[must_use]
    pub const fn result(&self) -> Option<&R> {
        self.result.as_ref()
    }

    /// True once `resolve` or `reject` has been called.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.settler.is_settled()
    }

    /// Settle the request successfully; continues in the `done` chain.
    ///
    /// Returns `false` if the request was already settled or is no longer
    /// running (for example after a cancel).
    pub fn resolve(&self, result: R) -> bool {
        self.settler.settle(Step::Next(result))
    }

    /// Settle the request as failed; continues in the `fail` chain.
    ///
    /// Returns `false` if the request was already settled or is no longer
    /// running.
    pub fn reject(&self, result: R) -> bool {
        self.settler.settle(Step::Redirect(Route::Fail(result)))
    }

    /// Emit an adapter-defined event on the request's bus.
    pub fn emit(&self, name: impl Into<Cow<'static, str>>, data: serde_json::Value) {
        self.events.emit(RequestEvent::Custom {
            name: name.into(),
            data,
        });
    }

    /// Register the callback run when the request is cancelled.
    ///
    /// Only the most recently registered callback is kept; it runs at most
    /// once.
    pub fn set_cancel_callback<F, Fut>(&self, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel
            .register(Box::new(move || -> BoxFuture<'static, ()> { Box::pin(callback()) }));
    }
}

/// Adapter built from a closure.
///
/// Created by [`adapter_fn`].
pub struct FnAdapter<F, P, R> {
    call: F,
    initial: Option<R>,
    _types: PhantomData<fn() -> P>,
}

/// Build an adapter from a closure.
///
/// # Example
///
/// ```ignore
/// let adapter = adapter_fn(|ctx: AdapterContext<u32, String>| async move {
///     ctx.resolve(format!("got {}", ctx.payload()));
///     Ok(())
/// });
/// ```
pub fn adapter_fn<F, Fut, P, R>(call: F) -> FnAdapter<F, P, R>
where
    F: Fn(AdapterContext<P, R>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), AdapterError>> + Send + 'static,
{
    FnAdapter {
        call,
        initial: None,
        _types: PhantomData,
    }
}

impl<F, P, R> FnAdapter<F, P, R> {
    /// Set the value returned from [`Adapter::create_state`].
    #[must_use]
    pub fn with_initial_state(mut self, initial: R) -> Self {
        self.initial = Some(initial);
        self
    }
}

impl<F, Fut, P, R> Adapter for FnAdapter<F, P, R>
where
    F: Fn(AdapterContext<P, R>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), AdapterError>> + Send + 'static,
    P: Clone + fmt::Debug + Send + Sync + 'static,
    R: Clone + fmt::Debug + Send + Sync + 'static,
{
    type Payload = P;
    type Output = R;

    fn call(&self, ctx: AdapterContext<P, R>) -> AdapterFuture {
        Box::pin((self.call)(ctx))
    }

    fn create_state(&self) -> Option<R> {
        self.initial.clone()
    }
}
