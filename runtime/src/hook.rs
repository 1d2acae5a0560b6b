//! Hooks, their contexts and the one-shot step settlement.
//!
//! A hook is a plain function of a context. It makes progress by invoking one
//! of the flow-control capabilities the context exposes:
//!
//! | Chain | Capabilities |
//! |-------|--------------|
//! | `before` | [`BeforeContext::next`] |
//! | `done` | [`DoneContext::next`], [`DoneContext::fail`] |
//! | `fail` | [`FailContext::next`], [`FailContext::done`], [`FailContext::retry`] |
//!
//! Contexts are cheap to clone and may be moved into spawned tasks, so a hook
//! can settle its step long after it returned. The first capability invoked
//! wins; later invocations are logged, counted, and return `false`.
//!
//! A hook that drops its context without settling stalls the chain. This is
//! reported at `warn` level but not otherwise enforced; cancelling the request
//! still completes its handle.
//!
//! # Example
//!
//! ```ignore
//! use hookline_runtime::{BeforeHook, FailHook, Hook};
//!
//! // Synchronous: continue immediately with a rewritten payload
//! let add_auth: BeforeHook<Request, Response> = Hook::new(|ctx| {
//!     let mut request = ctx.payload().clone();
//!     request.headers.push(("authorization".into(), token()));
//!     ctx.next(request);
//! });
//!
//! // Asynchronous: the future runs on its own task
//! let retry_once: FailHook<Request, Response> = Hook::spawn(|ctx| async move {
//!     tokio::time::sleep(Duration::from_millis(50)).await;
//!     let payload = ctx.payload().clone();
//!     ctx.retry(payload);
//! });
//! ```

use crate::metrics::HookMetrics;
use hookline_core::{ChainId, Meta, Route, Step};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;

/// One-shot settlement of a single chain step.
///
/// Every hook invocation (and the adapter call, which is the terminal step of
/// the `before` chain) gets a fresh settler. Clones share the same slot.
pub struct Settler<T, P, R> {
    slot: Arc<Mutex<Option<oneshot::Sender<Step<T, P, R>>>>>,
    chain: ChainId,
    index: usize,
}

impl<T, P, R> Settler<T, P, R> {
    pub(crate) fn new(chain: ChainId, index: usize) -> (Self, oneshot::Receiver<Step<T, P, R>>) {
        let (sender, receiver) = oneshot::channel();
        let settler = Self {
            slot: Arc::new(Mutex::new(Some(sender))),
            chain,
            index,
        };
        (settler, receiver)
    }

    /// The chain this step belongs to.
    #[must_use]
    pub const fn chain(&self) -> ChainId {
        self.chain
    }

    /// Position of this step in its chain.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// True once the step has been settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Settle the step.
    ///
    /// Returns `true` if this call settled the step and the request was still
    /// listening. A second settlement is a protocol violation: it is logged,
    /// counted and otherwise ignored.
    pub fn settle(&self, step: Step<T, P, R>) -> bool {
        let sender = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match sender {
            Some(sender) => {
                let delivered = sender.send(step).is_ok();
                if !delivered {
                    tracing::debug!(
                        chain = %self.chain,
                        step = self.index,
                        "Step settled after the request stopped listening"
                    );
                }
                delivered
            }
            None => {
                tracing::warn!(
                    chain = %self.chain,
                    step = self.index,
                    "Step settled more than once; keeping the first settlement"
                );
                HookMetrics::record_protocol_violation(self.chain);
                false
            }
        }
    }
}

impl<T, P, R> Clone for Settler<T, P, R> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            chain: self.chain,
            index: self.index,
        }
    }
}

impl<T, P, R> fmt::Debug for Settler<T, P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settler")
            .field("chain", &self.chain)
            .field("index", &self.index)
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// A middleware function bound to one chain.
pub struct Hook<C>(Arc<dyn Fn(C) + Send + Sync>);

impl<C: Send + 'static> Hook<C> {
    /// Wrap a synchronous hook.
    ///
    /// The hook may settle its step immediately or move the context elsewhere
    /// and settle it later.
    pub fn new<F>(hook: F) -> Self
    where
        F: Fn(C) + Send + Sync + 'static,
    {
        Self(Arc::new(hook))
    }

    /// Wrap an asynchronous hook.
    ///
    /// Each invocation spawns the returned future on the current tokio
    /// runtime. The chain waits for the step to be settled, not for the
    /// future to finish.
    pub fn spawn<F, Fut>(hook: F) -> Self
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::new(move |ctx| {
            tokio::spawn(hook(ctx));
        })
    }
}

impl<C> Hook<C> {
    pub(crate) fn call(&self, ctx: C) {
        (self.0)(ctx);
    }
}

impl<C> Clone for Hook<C> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<C> fmt::Debug for Hook<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Hook(<fn>)")
    }
}

/// Hook of the `before` chain.
pub type BeforeHook<P, R> = Hook<BeforeContext<P, R>>;

/// Hook of the `done` chain.
pub type DoneHook<P, R> = Hook<DoneContext<P, R>>;

/// Hook of the `fail` chain.
pub type FailHook<P, R> = Hook<FailContext<P, R>>;

/// Context handed to `before` hooks.
#[derive(Clone, Debug)]
pub struct BeforeContext<P, R> {
    meta: Arc<Meta>,
    payload: P,
    settler: Settler<P, P, R>,
}

impl<P, R> BeforeContext<P, R> {
    pub(crate) const fn new(meta: Arc<Meta>, payload: P, settler: Settler<P, P, R>) -> Self {
        Self {
            meta,
            payload,
            settler,
        }
    }

    /// Request metadata.
    #[must_use]
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// The payload as left by the previous hook.
    #[must_use]
    pub const fn payload(&self) -> &P {
        &self.payload
    }

    /// Continue with the next hook (or the adapter call) using `payload`.
    pub fn next(&self, payload: P) -> bool {
        self.settler.settle(Step::Next(payload))
    }
}

/// Context handed to `done` hooks.
#[derive(Clone, Debug)]
pub struct DoneContext<P, R> {
    meta: Arc<Meta>,
    payload: P,
    result: R,
    settler: Settler<R, P, R>,
}

impl<P, R> DoneContext<P, R> {
    pub(crate) const fn new(
        meta: Arc<Meta>,
        payload: P,
        result: R,
        settler: Settler<R, P, R>,
    ) -> Self {
        Self {
            meta,
            payload,
            result,
            settler,
        }
    }

    /// Request metadata.
    #[must_use]
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// The payload the adapter was called with.
    #[must_use]
    pub const fn payload(&self) -> &P {
        &self.payload
    }

    /// The result as left by the adapter or the previous hook.
    #[must_use]
    pub const fn result(&self) -> &R {
        &self.result
    }

    /// Continue with the next `done` hook using `result`.
    pub fn next(&self, result: R) -> bool {
        self.settler.settle(Step::Next(result))
    }

    /// Demote the outcome: continue in the `fail` chain with `result`.
    pub fn fail(&self, result: R) -> bool {
        self.settler.settle(Step::Redirect(Route::Fail(result)))
    }
}

/// Context handed to `fail` hooks.
#[derive(Clone, Debug)]
pub struct FailContext<P, R> {
    meta: Arc<Meta>,
    payload: P,
    result: R,
    settler: Settler<R, P, R>,
}

impl<P, R> FailContext<P, R> {
    pub(crate) const fn new(
        meta: Arc<Meta>,
        payload: P,
        result: R,
        settler: Settler<R, P, R>,
    ) -> Self {
        Self {
            meta,
            payload,
            result,
            settler,
        }
    }

    /// Request metadata.
    #[must_use]
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// The payload the adapter was called with.
    #[must_use]
    pub const fn payload(&self) -> &P {
        &self.payload
    }

    /// The failure result as left by the adapter or the previous hook.
    #[must_use]
    pub const fn result(&self) -> &R {
        &self.result
    }

    /// Continue with the next `fail` hook using `result`.
    pub fn next(&self, result: R) -> bool {
        self.settler.settle(Step::Next(result))
    }

    /// Promote the outcome: continue in the `done` chain with `result`.
    pub fn done(&self, result: R) -> bool {
        self.settler.settle(Step::Redirect(Route::Done(result)))
    }

    /// Re-enter the `before` chain (and eventually the adapter) with `payload`.
    pub fn retry(&self, payload: P) -> bool {
        self.settler.settle(Step::Redirect(Route::Before(payload)))
    }
}
