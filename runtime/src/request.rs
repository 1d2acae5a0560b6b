//! The request controller.
//!
//! A [`RequestHandle`] owns one request: its state record, its event bus, its
//! three hook chains and the driver task that runs them. The driver is a
//! single dispatcher loop over [`Route`]s:
//!
//! ```text
//! Route::Before(payload) ── before chain ──► adapter ──► Route::Done / Route::Fail
//! Route::Done(result)    ── done chain   ──► SUCCESS   (or Route::Fail on demote)
//! Route::Fail(result)    ── fail chain   ──► FAILED    (or Route::Done / Route::Before)
//! ```
//!
//! Every state change goes through [`RequestState::apply`] under one
//! transition lock: change events are emitted, the new state is stored, then
//! lifecycle events are emitted. Events of one request are therefore totally
//! ordered.
//!
//! # Cancellation
//!
//! [`RequestHandle::cancel`] stops the driver, runs the adapter's most recent
//! cancel callback and forces the CANCELLED state. Anything that settles
//! afterwards (a late `resolve`, a hook finishing) is ignored: the driver is
//! gone and the state machine rejects non-cancel transitions once the request
//! is no longer pending.

use crate::adapter::{AdapterContext, CancelSlot, SharedAdapter};
use crate::bus::{EventBus, Observable};
use crate::chain::{ChainOutcome, HookChain};
use crate::config::ClientConfig;
use crate::descriptor::RequestDescriptor;
use crate::error::panic_message;
use crate::hook::{BeforeContext, DoneContext, FailContext, Settler};
use crate::metrics::RequestMetrics;
use futures::{FutureExt, Stream};
use futures::future::BoxFuture;
use hookline_core::{
    AdapterError, ChainId, EventKind, Meta, RequestEvent, RequestState, RequestStatus, Route,
    StateSnapshot, Step, Transition,
};
use std::fmt;
use std::future::IntoFuture;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;
use tokio::sync::{broadcast, watch};
use tokio::task::{JoinError, JoinHandle};

/// What a request's completion resolves to.
///
/// `Ok` for every terminal state (SUCCESS, FAILED, CANCELLED); `Err` only
/// when the adapter faulted or a hook panicked.
pub type Completion<P, R> = Result<StateSnapshot<P, R>, AdapterError>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn join_outcome(joined: Result<Result<(), AdapterError>, JoinError>) -> Result<(), AdapterError> {
    match joined {
        Ok(outcome) => outcome,
        Err(error) if error.is_panic() => {
            Err(AdapterError::Panicked(panic_message(&*error.into_panic())))
        }
        Err(error) => Err(AdapterError::failed(error.to_string())),
    }
}

fn adapter_route<P, R>(step: Step<R, P, R>) -> Route<P, R> {
    match step {
        Step::Next(result) => Route::Done(result),
        Step::Redirect(route) => route,
    }
}

enum Wake<P, R> {
    Settled(Option<Step<R, P, R>>),
    Finished(Result<(), AdapterError>),
}

struct Shared<P, R> {
    id: u64,
    adapter: SharedAdapter<P, R>,
    meta: Arc<Meta>,
    before: HookChain<BeforeContext<P, R>>,
    done: HookChain<DoneContext<P, R>>,
    fail: HookChain<FailContext<P, R>>,
    state: RwLock<RequestState<P, R>>,
    transition: Mutex<()>,
    events: Arc<EventBus<P, R>>,
    cancel: Arc<CancelSlot>,
    completion: watch::Sender<Option<Completion<P, R>>>,
    initial: Mutex<Option<P>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    created_at: Instant,
}

impl<P, R> Shared<P, R>
where
    P: Clone + fmt::Debug + Send + Sync + 'static,
    R: Clone + fmt::Debug + Send + Sync + 'static,
{
    fn state(&self) -> RequestState<P, R> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_cancelled(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .flags()
            .cancelled
    }

    /// Apply `transition`, emitting its events around the state write.
    ///
    /// Returns the new snapshot, or `None` if the transition was rejected.
    fn commit(&self, transition: Transition<P, R>) -> Option<StateSnapshot<P, R>> {
        let _serialized = lock(&self.transition);

        let applied = self.state().apply(transition)?;
        for event in applied.changes {
            self.events.emit(event);
        }

        let snapshot = applied.next.snapshot();
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = applied.next;

        for event in applied.lifecycle {
            self.events.emit(event);
        }
        Some(snapshot)
    }

    /// Resolve the completion. The first outcome wins.
    fn complete(&self, outcome: Completion<P, R>) -> bool {
        self.completion.send_if_modified(move |slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        })
    }

    #[tracing::instrument(skip_all, name = "request", fields(request = self.id))]
    async fn drive(self: Arc<Self>, payload: P) {
        match self.dispatch(payload).await {
            Ok(Some(snapshot)) => {
                let status = snapshot.status();
                tracing::debug!(?status, "Request finished");
                if self.complete(Ok(snapshot)) {
                    RequestMetrics::record_outcome(status, self.created_at.elapsed());
                }
            }
            Ok(None) => {
                tracing::debug!("Request stopped after cancellation");
            }
            Err(fault) => {
                tracing::error!(error = %fault, "Request faulted");
                RequestMetrics::record_fault();
                {
                    let _serialized = lock(&self.transition);
                    self.events.emit(RequestEvent::Error(fault.clone()));
                }
                self.complete(Err(fault));
            }
        }
    }

    /// The dispatcher: runs chains until one of them finishes the request.
    async fn dispatch(&self, payload: P) -> Result<Option<StateSnapshot<P, R>>, AdapterError> {
        let mut route = Route::Before(payload);

        loop {
            if self.is_cancelled() {
                return Ok(None);
            }
            tracing::debug!(chain = %route.chain(), "Entering chain");

            route = match route {
                Route::Before(payload) => match self.run_before(payload).await {
                    ChainOutcome::Completed(payload) => {
                        if self.is_cancelled() {
                            return Ok(None);
                        }
                        let settled = self.call_adapter(payload).await?;
                        self.enter(settled)
                    }
                    ChainOutcome::Redirected(next) => self.enter(next),
                    ChainOutcome::Faulted(fault) => return Err(fault),
                },
                Route::Done(result) => match self.run_done(result).await {
                    ChainOutcome::Completed(_) => {
                        return Ok(self.commit(Transition::Settle { success: true }));
                    }
                    ChainOutcome::Redirected(next) => self.enter(next),
                    ChainOutcome::Faulted(fault) => return Err(fault),
                },
                Route::Fail(result) => match self.run_fail(result).await {
                    ChainOutcome::Completed(_) => {
                        return Ok(self.commit(Transition::Settle { success: false }));
                    }
                    ChainOutcome::Redirected(next) => self.enter(next),
                    ChainOutcome::Faulted(fault) => return Err(fault),
                },
            };
        }
    }

    /// Commit the value a route starts from.
    fn enter(&self, route: Route<P, R>) -> Route<P, R> {
        match &route {
            Route::Before(payload) => {
                RequestMetrics::record_retry();
                self.commit(Transition::Payload(payload.clone()));
            }
            Route::Done(result) | Route::Fail(result) => {
                self.commit(Transition::Result(result.clone()));
            }
        }
        route
    }

    async fn run_before(&self, payload: P) -> ChainOutcome<P, P, R> {
        self.before
            .run(
                payload,
                |payload, settler| BeforeContext::new(Arc::clone(&self.meta), payload, settler),
                |payload| {
                    self.commit(Transition::Payload(payload.clone()));
                },
            )
            .await
    }

    async fn run_done(&self, result: R) -> ChainOutcome<R, P, R> {
        let payload = self.state().payload().clone();
        self.done
            .run(
                result,
                |result, settler| {
                    DoneContext::new(Arc::clone(&self.meta), payload.clone(), result, settler)
                },
                |result| {
                    self.commit(Transition::Result(result.clone()));
                },
            )
            .await
    }

    async fn run_fail(&self, result: R) -> ChainOutcome<R, P, R> {
        let payload = self.state().payload().clone();
        self.fail
            .run(
                result,
                |result, settler| {
                    FailContext::new(Arc::clone(&self.meta), payload.clone(), result, settler)
                },
                |result| {
                    self.commit(Transition::Result(result.clone()));
                },
            )
            .await
    }

    /// The terminal step of the before chain.
    async fn call_adapter(&self, payload: P) -> Result<Route<P, R>, AdapterError> {
        let (settler, mut settled) = Settler::new(ChainId::Before, self.before.len());
        let ctx = AdapterContext::new(
            Arc::clone(&self.meta),
            self.adapter.convert(payload),
            self.state().result().cloned(),
            settler,
            Arc::clone(&self.events),
            Arc::clone(&self.cancel),
        );

        tracing::debug!("Calling adapter");
        let work = std::panic::catch_unwind(AssertUnwindSafe(|| self.adapter.call(ctx)))
            .map_err(|panic| AdapterError::Panicked(panic_message(&*panic)))?;
        let mut call = tokio::spawn(work);
        let mut call_finished = false;

        loop {
            let wake = tokio::select! {
                biased;
                step = &mut settled => Wake::Settled(step.ok()),
                joined = &mut call, if !call_finished => Wake::Finished(join_outcome(joined)),
            };

            match wake {
                Wake::Settled(Some(step)) => return Ok(adapter_route(step)),
                Wake::Settled(None) => {
                    if !call_finished {
                        join_outcome(call.await)?;
                    }
                    tracing::warn!("Adapter dropped its context without settling; request stalled");
                    return std::future::pending().await;
                }
                Wake::Finished(Ok(())) => call_finished = true,
                Wake::Finished(Err(fault)) => {
                    return match settled.try_recv() {
                        Ok(step) => {
                            tracing::debug!(
                                error = %fault,
                                "Adapter failed after settling; ignoring"
                            );
                            Ok(adapter_route(step))
                        }
                        Err(_) => Err(fault),
                    };
                }
            }
        }
    }
}

/// Handle to one issued request.
///
/// Cloning the handle is cheap; every clone observes and controls the same
/// request. Awaiting the handle (or [`RequestHandle::completion`]) yields the
/// final snapshot.
///
/// # Example
///
/// ```ignore
/// let handle = client.issue(RawRequest::new().payload(query))?;
///
/// handle
///     .on_done(|result, _| tracing::info!(?result, "done"))
///     .on_fail(|result, _| tracing::warn!(?result, "failed"));
///
/// let snapshot = handle.await?;
/// assert!(!snapshot.pending);
/// ```
pub struct RequestHandle<P, R> {
    shared: Arc<Shared<P, R>>,
}

impl<P, R> Clone for RequestHandle<P, R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P, R> RequestHandle<P, R>
where
    P: Clone + fmt::Debug + Send + Sync + 'static,
    R: Clone + fmt::Debug + Send + Sync + 'static,
{
    pub(crate) fn new(
        id: u64,
        default_adapter: &SharedAdapter<P, R>,
        descriptor: RequestDescriptor<P, R>,
        config: &ClientConfig,
    ) -> Self {
        let RequestDescriptor {
            meta,
            payload,
            hooks,
            adapter,
        } = descriptor;
        let adapter = adapter.unwrap_or_else(|| Arc::clone(default_adapter));
        let state = RequestState::new(payload.clone(), adapter.create_state(), meta.clone());
        let (completion, _) = watch::channel(None);

        Self {
            shared: Arc::new(Shared {
                id,
                adapter,
                meta: Arc::new(meta),
                before: HookChain::new(ChainId::Before, hooks.before),
                done: HookChain::new(ChainId::Done, hooks.done),
                fail: HookChain::new(ChainId::Fail, hooks.fail),
                state: RwLock::new(state),
                transition: Mutex::new(()),
                events: Arc::new(EventBus::new(config.broadcast_capacity)),
                cancel: Arc::new(CancelSlot::default()),
                completion,
                initial: Mutex::new(Some(payload)),
                driver: Mutex::new(None),
                started: AtomicBool::new(false),
                created_at: Instant::now(),
            }),
        }
    }

    /// Identifier of this request, unique per client.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Start running the request on the current tokio runtime.
    ///
    /// Idempotent. [`Client::issue`](crate::Client::issue) calls this for
    /// you; use [`Client::prepare`](crate::Client::prepare) plus `start` to
    /// subscribe before anything can be emitted.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn start(&self) -> &Self {
        if self.shared.started.swap(true, Ordering::AcqRel) {
            return self;
        }

        // Spawning under the driver lock means a concurrent `cancel` either
        // finds the driver to abort or takes the payload so nothing spawns.
        let mut driver = lock(&self.shared.driver);
        let payload = lock(&self.shared.initial).take();
        if let Some(payload) = payload {
            RequestMetrics::record_issued();
            tracing::debug!(request = self.shared.id, "Starting request");
            *driver = Some(tokio::spawn(Arc::clone(&self.shared).drive(payload)));
        }
        drop(driver);
        self
    }

    /// True once [`RequestHandle::start`] has been called.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::Acquire)
    }

    /// A copy of the current state record.
    #[must_use]
    pub fn state(&self) -> RequestState<P, R> {
        self.shared.state()
    }

    /// An immutable snapshot of the observable fields.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot<P, R> {
        self.shared.state().snapshot()
    }

    /// The collapsed lifecycle status.
    #[must_use]
    pub fn status(&self) -> RequestStatus {
        self.shared.state().status()
    }

    /// True once the done chain finished.
    #[must_use]
    pub fn success(&self) -> bool {
        self.shared.state().flags().success
    }

    /// True until the request reaches a terminal state.
    #[must_use]
    pub fn pending(&self) -> bool {
        self.shared.state().flags().pending
    }

    /// True once the request was cancelled.
    #[must_use]
    pub fn cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// The last committed payload.
    #[must_use]
    pub fn payload(&self) -> P {
        self.shared.state().payload().clone()
    }

    /// The last committed result.
    #[must_use]
    pub fn result(&self) -> Option<R> {
        self.shared.state().result().cloned()
    }

    /// Request metadata.
    #[must_use]
    pub fn meta(&self) -> Meta {
        self.shared.meta.as_ref().clone()
    }

    /// Receive every event emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RequestEvent<P, R>> {
        self.shared.events.subscribe()
    }

    /// Stream of events emitted from now on.
    ///
    /// The stream ends after a `finish`, `cancel` or `error` event.
    pub fn event_stream(&self) -> impl Stream<Item = RequestEvent<P, R>> + Send + 'static {
        let mut receiver = self.subscribe();
        async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        let last = matches!(
                            event.kind(),
                            EventKind::Finish | EventKind::Cancel | EventKind::Error
                        );
                        yield event;
                        if last {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event stream lagged behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    /// Cancel the request.
    ///
    /// Stops the driver, runs the adapter's most recently registered cancel
    /// callback, then forces `{success: false, pending: false, cancelled: true}`
    /// and emits `cancel`. Whether the adapter's work actually stops is up to
    /// the adapter. A callback that panics is logged; the request is
    /// cancelled regardless. Cancelling an already cancelled request does
    /// nothing.
    #[tracing::instrument(skip_all, name = "cancel", fields(request = self.shared.id))]
    pub async fn cancel(&self) {
        let driver = {
            let mut driver = lock(&self.shared.driver);
            lock(&self.shared.initial).take();
            driver.take()
        };
        if let Some(driver) = driver {
            driver.abort();
            // Once the driver is dropped, late settlements find no receiver.
            let _ = driver.await;
        }

        let callback = self.shared.cancel.take();
        if let Some(callback) = callback {
            tracing::debug!("Running adapter cancel callback");
            let teardown = AssertUnwindSafe(async move { callback().await }).catch_unwind();
            if let Err(panic) = teardown.await {
                tracing::error!(message = %panic_message(&*panic), "Cancel callback panicked");
            }
        }

        match self.shared.commit(Transition::Cancel) {
            Some(snapshot) => {
                if self.shared.complete(Ok(snapshot)) {
                    RequestMetrics::record_outcome(
                        RequestStatus::Cancelled,
                        self.shared.created_at.elapsed(),
                    );
                }
            }
            None => tracing::debug!("Request was already cancelled"),
        }
    }

    /// The completion, if the request already has one.
    #[must_use]
    pub fn try_completion(&self) -> Option<Completion<P, R>> {
        self.shared.completion.borrow().clone()
    }

    /// Wait for the request to reach a terminal state.
    ///
    /// # Errors
    ///
    /// Returns the [`AdapterError`] if the adapter faulted or a hook
    /// panicked. FAILED and CANCELLED are not errors; inspect the snapshot.
    pub async fn completion(&self) -> Completion<P, R> {
        let mut receiver = self.shared.completion.subscribe();
        loop {
            let current = receiver.borrow_and_update().clone();
            if let Some(outcome) = current {
                return outcome;
            }
            if receiver.changed().await.is_err() {
                // The sender lives in `self.shared`, which we hold.
                return std::future::pending().await;
            }
        }
    }
}

impl<P, R> Observable<P, R> for RequestHandle<P, R>
where
    P: Clone + fmt::Debug + Send + Sync + 'static,
    R: Clone + fmt::Debug + Send + Sync + 'static,
{
    fn events(&self) -> &EventBus<P, R> {
        &self.shared.events
    }
}

impl<P, R> IntoFuture for RequestHandle<P, R>
where
    P: Clone + fmt::Debug + Send + Sync + 'static,
    R: Clone + fmt::Debug + Send + Sync + 'static,
{
    type Output = Completion<P, R>;
    type IntoFuture = BoxFuture<'static, Completion<P, R>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.completion().await })
    }
}

impl<P, R> fmt::Debug for RequestHandle<P, R>
where
    P: Clone + fmt::Debug + Send + Sync + 'static,
    R: Clone + fmt::Debug + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("id", &self.shared.id)
            .field("state", &self.shared.state())
            .finish_non_exhaustive()
    }
}
