//! Sequential hook chain executor.
//!
//! A [`HookChain`] walks an ordered list of hooks. Each hook receives a fresh
//! context built around a one-shot [`Settler`]; the executor then waits until
//! that step is settled:
//!
//! - [`Step::Next`] commits the value through `update` and moves to the next hook
//! - [`Step::Redirect`] abandons the chain and hands the route back to the caller
//!
//! Running past the last hook yields once to the scheduler and completes the
//! chain with the last value. A hook that panics while it is being invoked
//! ends the chain with [`ChainOutcome::Faulted`]. The executor never looks at
//! other chains: the controller's dispatcher decides what a redirect means.

use crate::error::panic_message;
use crate::hook::{Hook, Settler};
use crate::metrics::HookMetrics;
use hookline_core::{AdapterError, ChainId, Route, Step};
use std::panic::AssertUnwindSafe;

/// How a chain run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome<T, P, R> {
    /// Every hook continued; carries the final value.
    Completed(T),
    /// A hook redirected to another chain.
    Redirected(Route<P, R>),
    /// A hook panicked when invoked.
    Faulted(AdapterError),
}

/// An ordered list of hooks for one chain.
#[derive(Debug)]
pub struct HookChain<C> {
    id: ChainId,
    hooks: Vec<Hook<C>>,
}

impl<C> Clone for HookChain<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            hooks: self.hooks.clone(),
        }
    }
}

impl<C> HookChain<C> {
    /// Create a chain from its hooks, in invocation order.
    #[must_use]
    pub const fn new(id: ChainId, hooks: Vec<Hook<C>>) -> Self {
        Self { id, hooks }
    }

    /// The chain identifier.
    #[must_use]
    pub const fn id(&self) -> ChainId {
        self.id
    }

    /// Number of hooks in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// True if the chain has no hooks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run the chain from `initial`.
    ///
    /// # Arguments
    ///
    /// - `initial`: value handed to the first hook
    /// - `context`: builds the context for one step from its value and settler
    /// - `update`: called with every value a hook continues with, before the
    ///   next hook runs
    ///
    /// # Stalls
    ///
    /// If a hook drops every clone of its context without settling, the
    /// returned future never completes. This is logged as a warning.
    pub async fn run<T, P, R, F, U>(
        &self,
        initial: T,
        mut context: F,
        mut update: U,
    ) -> ChainOutcome<T, P, R>
    where
        F: FnMut(T, Settler<T, P, R>) -> C,
        U: FnMut(&T),
    {
        let mut value = initial;

        for (index, hook) in self.hooks.iter().enumerate() {
            let (settler, settled) = Settler::new(self.id, index);

            tracing::trace!(chain = %self.id, hook = index, "Invoking hook");
            HookMetrics::record_invocation(self.id);
            let ctx = context(value, settler);
            if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| hook.call(ctx))) {
                let message = panic_message(&*panic);
                tracing::error!(chain = %self.id, hook = index, %message, "Hook panicked");
                return ChainOutcome::Faulted(AdapterError::HookPanicked {
                    chain: self.id,
                    message,
                });
            }

            match settled.await {
                Ok(Step::Next(next)) => {
                    update(&next);
                    value = next;
                }
                Ok(Step::Redirect(route)) => {
                    tracing::debug!(
                        chain = %self.id,
                        hook = index,
                        target = %route.chain(),
                        "Hook redirected"
                    );
                    HookMetrics::record_redirect(self.id, route.chain());
                    return ChainOutcome::Redirected(route);
                }
                Err(_) => {
                    tracing::warn!(
                        chain = %self.id,
                        hook = index,
                        "Hook dropped its context without settling; chain stalled"
                    );
                    HookMetrics::record_stall(self.id);
                    return std::future::pending().await;
                }
            }
        }

        // Completion is always deferred so a hook that settled synchronously
        // never observes the chain's terminal step on its own call stack.
        tokio::task::yield_now().await;
        ChainOutcome::Completed(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    type Ctx = (u32, Settler<u32, u32, u32>);

    fn chain(hooks: Vec<Hook<Ctx>>) -> HookChain<Ctx> {
        HookChain::new(ChainId::Before, hooks)
    }

    fn add(amount: u32) -> Hook<Ctx> {
        Hook::new(move |(value, settler): Ctx| {
            settler.settle(Step::Next(value + amount));
        })
    }

    #[tokio::test]
    async fn test_empty_chain_completes_with_initial_value() {
        let outcome = chain(Vec::new())
            .run(7, |value, settler| (value, settler), |_| {})
            .await;

        assert_eq!(outcome, ChainOutcome::Completed(7));
    }

    #[tokio::test]
    async fn test_hooks_run_in_order_and_update_each_value() {
        let updates = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&updates);

        let outcome = chain(vec![add(1), add(10), add(100)])
            .run(
                0,
                |value, settler| (value, settler),
                move |value| seen.lock().unwrap().push(*value),
            )
            .await;

        assert_eq!(outcome, ChainOutcome::Completed(111));
        assert_eq!(*updates.lock().unwrap(), vec![1, 11, 111]);
    }

    #[tokio::test]
    async fn test_redirect_stops_the_chain() {
        let redirect = Hook::new(|(value, settler): Ctx| {
            settler.settle(Step::Redirect(Route::Fail(value)));
        });

        let outcome = chain(vec![add(1), redirect, add(100)])
            .run(1, |value, settler| (value, settler), |_| {})
            .await;

        assert_eq!(outcome, ChainOutcome::Redirected(Route::Fail(2)));
    }

    #[tokio::test]
    async fn test_second_settlement_is_ignored() {
        let twice = Hook::new(|(value, settler): Ctx| {
            assert!(settler.settle(Step::Next(value + 1)));
            assert!(!settler.settle(Step::Redirect(Route::Done(0))));
        });

        let outcome = chain(vec![twice])
            .run(1, |value, settler| (value, settler), |_| {})
            .await;

        assert_eq!(outcome, ChainOutcome::Completed(2));
    }

    #[tokio::test]
    async fn test_hook_may_settle_later() {
        let deferred = Hook::spawn(|(value, settler): Ctx| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            settler.settle(Step::Next(value * 3));
        });

        let outcome = chain(vec![deferred, add(1)])
            .run(2, |value, settler| (value, settler), |_| {})
            .await;

        assert_eq!(outcome, ChainOutcome::Completed(7));
    }

    #[tokio::test]
    async fn test_abandoned_step_stalls() {
        let abandon = Hook::new(|_: Ctx| {});

        let chain = chain(vec![abandon]);
        let run = chain.run(1, |value, settler| (value, settler), |_| {});
        let result = tokio::time::timeout(Duration::from_millis(20), run).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    #[allow(clippy::panic)]
    async fn test_panicking_hook_ends_the_chain() {
        let updates = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&updates);
        let explode = Hook::new(|_: Ctx| panic!("bad header"));

        let outcome = chain(vec![add(1), explode, add(100)])
            .run(
                0,
                |value, settler| (value, settler),
                move |value| seen.lock().unwrap().push(*value),
            )
            .await;

        assert_eq!(
            outcome,
            ChainOutcome::Faulted(AdapterError::HookPanicked {
                chain: ChainId::Before,
                message: "bad header".to_string(),
            })
        );
        assert_eq!(*updates.lock().unwrap(), vec![1]);
    }
}
