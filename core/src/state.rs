//! Request state and its single transition function.
//!
//! A request's observable state is owned by exactly one [`RequestState`]
//! value. Every change goes through [`RequestState::apply`], which is pure: it
//! returns the next state together with the events describing the change and
//! leaves emission and storage to the runtime.
//!
//! # Emission order
//!
//! [`Applied::changes`] carry `{prev, next}` pairs and must be delivered
//! *before* the new state becomes visible, so subscribers can diff old against
//! new from inside their handler. [`Applied::lifecycle`] events (`done`,
//! `fail`, `finish`, `cancel`) are delivered *after* the new state is stored.
//!
//! # Invariant
//!
//! - `pending` is true only until the first terminal transition
//! - while `pending`, both `success` and `cancelled` are false
//! - once not `pending`, at most one of `success` / `cancelled` is true

use crate::Meta;
use crate::event::RequestEvent;
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};

/// The composite status flags of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateFlags {
    /// The request finished through the done chain.
    pub success: bool,
    /// No terminal transition has happened yet.
    pub pending: bool,
    /// The request was cancelled.
    pub cancelled: bool,
}

impl StateFlags {
    /// Flags of a freshly issued request.
    pub const PENDING: Self = Self {
        success: false,
        pending: true,
        cancelled: false,
    };

    /// Flags after the done chain finished.
    pub const SUCCEEDED: Self = Self {
        success: true,
        pending: false,
        cancelled: false,
    };

    /// Flags after the fail chain finished.
    pub const FAILED: Self = Self {
        success: false,
        pending: false,
        cancelled: false,
    };

    /// Flags after cancellation.
    pub const CANCELLED: Self = Self {
        success: false,
        pending: false,
        cancelled: true,
    };

    /// Field-wise difference from `self` to `next`.
    #[must_use]
    pub const fn diff(self, next: Self) -> StateDiff {
        StateDiff {
            success: if self.success == next.success {
                None
            } else {
                Some(next.success)
            },
            pending: if self.pending == next.pending {
                None
            } else {
                Some(next.pending)
            },
            cancelled: if self.cancelled == next.cancelled {
                None
            } else {
                Some(next.cancelled)
            },
        }
    }

    /// Collapse the flags into a single status.
    #[must_use]
    pub const fn status(self) -> RequestStatus {
        if self.pending {
            RequestStatus::Pending
        } else if self.cancelled {
            RequestStatus::Cancelled
        } else if self.success {
            RequestStatus::Success
        } else {
            RequestStatus::Failed
        }
    }
}

/// The fields that changed in a `change:state` event, with their new values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDiff {
    /// New `success` value, if it changed.
    pub success: Option<bool>,
    /// New `pending` value, if it changed.
    pub pending: Option<bool>,
    /// New `cancelled` value, if it changed.
    pub cancelled: Option<bool>,
}

impl StateDiff {
    /// True if no flag changed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.success.is_none() && self.pending.is_none() && self.cancelled.is_none()
    }
}

/// Lifecycle status of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Still running.
    Pending,
    /// Finished through the done chain.
    Success,
    /// Finished through the fail chain.
    Failed,
    /// Cancelled by the caller.
    Cancelled,
}

impl RequestStatus {
    /// True for every status except [`RequestStatus::Pending`].
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Immutable copy of a request's observable fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot<P, R> {
    /// See [`StateFlags::success`].
    pub success: bool,
    /// See [`StateFlags::pending`].
    pub pending: bool,
    /// See [`StateFlags::cancelled`].
    pub cancelled: bool,
    /// The last committed payload.
    pub payload: P,
    /// The last committed result, if any.
    pub result: Option<R>,
    /// Caller metadata.
    pub meta: Meta,
}

impl<P, R> StateSnapshot<P, R> {
    /// The status flags of this snapshot.
    #[must_use]
    pub const fn flags(&self) -> StateFlags {
        StateFlags {
            success: self.success,
            pending: self.pending,
            cancelled: self.cancelled,
        }
    }

    /// The collapsed status of this snapshot.
    #[must_use]
    pub const fn status(&self) -> RequestStatus {
        self.flags().status()
    }
}

/// A requested change to a [`RequestState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition<P, R> {
    /// Commit a new payload (before chain progress or retry).
    Payload(P),
    /// Commit a new result (adapter settlement or done/fail chain progress).
    Result(R),
    /// Finish the request through the done chain (`true`) or fail chain (`false`).
    Settle {
        /// Which terminal chain finished.
        success: bool,
    },
    /// Force the request into the cancelled state.
    Cancel,
}

/// The outcome of a transition that was accepted.
#[derive(Debug, Clone)]
pub struct Applied<P, R> {
    /// The state after the transition.
    pub next: RequestState<P, R>,
    /// Change events, emitted before `next` is stored.
    pub changes: SmallVec<[RequestEvent<P, R>; 1]>,
    /// Lifecycle events, emitted after `next` is stored.
    pub lifecycle: SmallVec<[RequestEvent<P, R>; 2]>,
}

/// The mutable record behind a request handle.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestState<P, R> {
    flags: StateFlags,
    payload: P,
    result: Option<R>,
    meta: Meta,
}

impl<P: Clone, R: Clone> RequestState<P, R> {
    /// Create the initial (pending) state of a request.
    #[must_use]
    pub const fn new(payload: P, result: Option<R>, meta: Meta) -> Self {
        Self {
            flags: StateFlags::PENDING,
            payload,
            result,
            meta,
        }
    }

    /// The status flags.
    #[must_use]
    pub const fn flags(&self) -> StateFlags {
        self.flags
    }

    /// The collapsed status.
    #[must_use]
    pub const fn status(&self) -> RequestStatus {
        self.flags.status()
    }

    /// The last committed payload.
    #[must_use]
    pub const fn payload(&self) -> &P {
        &self.payload
    }

    /// The last committed result.
    #[must_use]
    pub const fn result(&self) -> Option<&R> {
        self.result.as_ref()
    }

    /// Caller metadata.
    #[must_use]
    pub const fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Take an immutable copy of every observable field.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot<P, R> {
        StateSnapshot {
            success: self.flags.success,
            pending: self.flags.pending,
            cancelled: self.flags.cancelled,
            payload: self.payload.clone(),
            result: self.result.clone(),
            meta: self.meta.clone(),
        }
    }

    /// Compute the effect of `transition` on this state.
    ///
    /// Returns `None` when the transition is not allowed:
    /// - any transition other than [`Transition::Cancel`] once the request is
    ///   no longer pending (this is how late settlements after a cancel are
    ///   ignored)
    /// - [`Transition::Cancel`] on an already cancelled request
    #[must_use]
    pub fn apply(&self, transition: Transition<P, R>) -> Option<Applied<P, R>> {
        match transition {
            Transition::Cancel => {
                if self.flags.cancelled {
                    return None;
                }
                Some(self.with_flags(StateFlags::CANCELLED))
            }
            _ if !self.flags.pending => None,
            Transition::Payload(payload) => {
                let next = Self {
                    payload: payload.clone(),
                    ..self.clone()
                };
                Some(Applied {
                    next,
                    changes: smallvec![RequestEvent::PayloadChanged {
                        prev: self.payload.clone(),
                        next: payload,
                    }],
                    lifecycle: SmallVec::new(),
                })
            }
            Transition::Result(result) => {
                let next = Self {
                    result: Some(result.clone()),
                    ..self.clone()
                };
                Some(Applied {
                    next,
                    changes: smallvec![RequestEvent::ResultChanged {
                        prev: self.result.clone(),
                        next: result,
                    }],
                    lifecycle: SmallVec::new(),
                })
            }
            Transition::Settle { success: true } => Some(self.with_flags(StateFlags::SUCCEEDED)),
            Transition::Settle { success: false } => Some(self.with_flags(StateFlags::FAILED)),
        }
    }

    fn with_flags(&self, flags: StateFlags) -> Applied<P, R> {
        let next = Self {
            flags,
            ..self.clone()
        };
        let prev_snapshot = self.snapshot();
        let next_snapshot = next.snapshot();

        let lifecycle = match flags.status() {
            RequestStatus::Cancelled => smallvec![RequestEvent::Cancel {
                snapshot: next_snapshot.clone(),
            }],
            RequestStatus::Success => smallvec![
                RequestEvent::Done {
                    result: next.result.clone(),
                    snapshot: next_snapshot.clone(),
                },
                RequestEvent::Finish {
                    result: next.result.clone(),
                    snapshot: next_snapshot.clone(),
                },
            ],
            RequestStatus::Failed => smallvec![
                RequestEvent::Fail {
                    result: next.result.clone(),
                    snapshot: next_snapshot.clone(),
                },
                RequestEvent::Finish {
                    result: next.result.clone(),
                    snapshot: next_snapshot.clone(),
                },
            ],
            RequestStatus::Pending => SmallVec::new(),
        };

        Applied {
            changes: smallvec![RequestEvent::StateChanged {
                diff: self.flags.diff(flags),
                prev: prev_snapshot,
                next: next_snapshot,
            }],
            lifecycle,
            next,
        }
    }
}
