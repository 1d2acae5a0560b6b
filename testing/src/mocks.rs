//! Mock adapters for driving requests in tests.
//!
//! - [`ScriptedAdapter`] plays back one [`Outcome`] per call
//! - [`ManualAdapter`] hands every [`AdapterContext`] to the test, which
//!   settles it whenever it likes

use hookline_core::AdapterError;
use hookline_runtime::{Adapter, AdapterContext, AdapterFuture};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

/// What a [`ScriptedAdapter`] does on one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<R> {
    /// Resolve with the value.
    Resolve(R),
    /// Reject with the value.
    Reject(R),
    /// Resolve with the value after a delay.
    ResolveAfter(Duration, R),
    /// Return an error without settling.
    Fault(String),
    /// Panic without settling.
    Panic(String),
    /// Never settle. Registers a cancel callback that is counted by
    /// [`ScriptedAdapter::cancellations`].
    Hang,
}

/// Adapter that plays back a script of outcomes.
///
/// Once the script is exhausted every further call uses the fallback
/// outcome. Every payload the adapter sees is recorded.
///
/// # Example
///
/// ```
/// use hookline_testing::mocks::{Outcome, ScriptedAdapter};
///
/// // Fail once, then succeed
/// let adapter: ScriptedAdapter<u32, &str> =
///     ScriptedAdapter::new(vec![Outcome::Reject("busy")], Outcome::Resolve("ok"));
/// assert_eq!(adapter.calls(), 0);
/// ```
pub struct ScriptedAdapter<P, R> {
    script: Arc<Mutex<VecDeque<Outcome<R>>>>,
    fallback: Outcome<R>,
    initial: Option<R>,
    payloads: Arc<Mutex<Vec<P>>>,
    cancellations: Arc<AtomicUsize>,
}

impl<P, R: Clone> Clone for ScriptedAdapter<P, R> {
    fn clone(&self) -> Self {
        Self {
            script: Arc::clone(&self.script),
            fallback: self.fallback.clone(),
            initial: self.initial.clone(),
            payloads: Arc::clone(&self.payloads),
            cancellations: Arc::clone(&self.cancellations),
        }
    }
}

impl<P, R: fmt::Debug> fmt::Debug for ScriptedAdapter<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedAdapter")
            .field("fallback", &self.fallback)
            .field("calls", &self.payloads.lock().map_or(0, |p| p.len()))
            .finish_non_exhaustive()
    }
}

impl<P, R> ScriptedAdapter<P, R>
where
    P: Clone,
    R: Clone,
{
    /// Play back `script`, then `fallback` forever.
    #[must_use]
    pub fn new(script: Vec<Outcome<R>>, fallback: Outcome<R>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            fallback,
            initial: None,
            payloads: Arc::new(Mutex::new(Vec::new())),
            cancellations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always resolve with `result`.
    #[must_use]
    pub fn resolving(result: R) -> Self {
        Self::new(Vec::new(), Outcome::Resolve(result))
    }

    /// Always reject with `result`.
    #[must_use]
    pub fn rejecting(result: R) -> Self {
        Self::new(Vec::new(), Outcome::Reject(result))
    }

    /// Report `initial` from [`Adapter::create_state`].
    #[must_use]
    pub fn with_initial_state(mut self, initial: R) -> Self {
        self.initial = Some(initial);
        self
    }

    /// Number of calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Every payload the adapter was called with, in order.
    #[must_use]
    pub fn payloads(&self) -> Vec<P> {
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of cancel callbacks that ran.
    #[must_use]
    pub fn cancellations(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> Outcome<R> {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl<P, R> Adapter for ScriptedAdapter<P, R>
where
    P: Clone + fmt::Debug + Send + Sync + 'static,
    R: Clone + fmt::Debug + Send + Sync + 'static,
{
    type Payload = P;
    type Output = R;

    #[allow(clippy::panic)] // Outcome::Panic exists to exercise the fault path
    fn call(&self, ctx: AdapterContext<P, R>) -> AdapterFuture {
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ctx.payload().clone());
        let outcome = self.next_outcome();
        if matches!(outcome, Outcome::Hang) {
            let cancellations = Arc::clone(&self.cancellations);
            ctx.set_cancel_callback(move || async move {
                cancellations.fetch_add(1, Ordering::SeqCst);
            });
        }

        Box::pin(async move {
            match outcome {
                Outcome::Resolve(result) => {
                    ctx.resolve(result);
                }
                Outcome::Reject(result) => {
                    ctx.reject(result);
                }
                Outcome::ResolveAfter(delay, result) => {
                    tokio::time::sleep(delay).await;
                    ctx.resolve(result);
                }
                Outcome::Fault(reason) => return Err(AdapterError::failed(reason)),
                Outcome::Panic(message) => panic!("{message}"),
                Outcome::Hang => {
                    let _held = ctx;
                    std::future::pending::<()>().await;
                }
            }
            Ok(())
        })
    }

    fn create_state(&self) -> Option<R> {
        self.initial.clone()
    }
}

/// Adapter whose calls are settled by the test.
///
/// # Example
///
/// ```ignore
/// let (adapter, mut calls) = ManualAdapter::<u32, String>::new();
/// let handle = create(adapter).issue(RawRequest::new().payload(1))?;
///
/// let ctx = calls.recv().await.unwrap();
/// ctx.resolve("done".to_string());
/// ```
pub struct ManualAdapter<P, R> {
    calls: mpsc::UnboundedSender<AdapterContext<P, R>>,
}

impl<P, R> fmt::Debug for ManualAdapter<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualAdapter").finish_non_exhaustive()
    }
}

impl<P, R> ManualAdapter<P, R> {
    /// Create the adapter and the receiver its calls arrive on.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AdapterContext<P, R>>) {
        let (calls, receiver) = mpsc::unbounded_channel();
        (Self { calls }, receiver)
    }
}

impl<P, R> Adapter for ManualAdapter<P, R>
where
    P: Clone + fmt::Debug + Send + Sync + 'static,
    R: Clone + fmt::Debug + Send + Sync + 'static,
{
    type Payload = P;
    type Output = R;

    fn call(&self, ctx: AdapterContext<P, R>) -> AdapterFuture {
        let delivered = self.calls.send(ctx).is_ok();
        Box::pin(async move {
            if delivered {
                Ok(())
            } else {
                Err(AdapterError::failed("manual adapter receiver dropped"))
            }
        })
    }
}
