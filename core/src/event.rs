//! Events broadcast over a request's lifetime.
//!
//! Every request owns its own bus; the events below are the complete set of
//! things it can emit. [`EventKind`] is the subscription key and carries the
//! stable wire name of each event (`change:state`, `done`, ...).
//!
//! | Event | Emitted when | Payload |
//! |-------|--------------|---------|
//! | `change:state` | flags are about to change | `prev`, `next`, `diff` |
//! | `change:payload` | payload is about to change | `prev`, `next` |
//! | `change:result` | result is about to change | `prev`, `next` |
//! | `done` | done chain finished | `result`, `snapshot` |
//! | `fail` | fail chain finished | `result`, `snapshot` |
//! | `finish` | after `done` or `fail` | `result`, `snapshot` |
//! | `cancel` | request was cancelled | `snapshot` |
//! | `error` | adapter fault | error |
//! | custom | adapter called `emit` | name, JSON data |

use crate::error::AdapterError;
use crate::state::{StateDiff, StateSnapshot};
use std::borrow::Cow;
use std::fmt;

/// Subscription key for [`RequestEvent`]s.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `change:state`
    StateChanged,
    /// `change:payload`
    PayloadChanged,
    /// `change:result`
    ResultChanged,
    /// `done`
    Done,
    /// `fail`
    Fail,
    /// `finish`
    Finish,
    /// `cancel`
    Cancel,
    /// `error`
    Error,
    /// Adapter-defined event name.
    Custom(Cow<'static, str>),
}

impl EventKind {
    /// Create a key for an adapter-defined event.
    #[must_use]
    pub fn custom(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Custom(name.into())
    }

    /// The wire name of this event.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::StateChanged => "change:state",
            Self::PayloadChanged => "change:payload",
            Self::ResultChanged => "change:result",
            Self::Done => "done",
            Self::Fail => "fail",
            Self::Finish => "finish",
            Self::Cancel => "cancel",
            Self::Error => "error",
            Self::Custom(name) => name,
        }
    }

    /// Parse a wire name. Unknown names become [`EventKind::Custom`].
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            "change:state" => Self::StateChanged,
            "change:payload" => Self::PayloadChanged,
            "change:result" => Self::ResultChanged,
            "done" => Self::Done,
            "fail" => Self::Fail,
            "finish" => Self::Finish,
            "cancel" => Self::Cancel,
            "error" => Self::Error,
            other => Self::Custom(Cow::Owned(other.to_string())),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single event emitted by a request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestEvent<P, R> {
    /// The composite flags are about to change.
    StateChanged {
        /// Snapshot before the change.
        prev: StateSnapshot<P, R>,
        /// Snapshot after the change.
        next: StateSnapshot<P, R>,
        /// Flags that differ between `prev` and `next`.
        diff: StateDiff,
    },
    /// The payload is about to change.
    PayloadChanged {
        /// Current payload.
        prev: P,
        /// Incoming payload.
        next: P,
    },
    /// The result is about to change.
    ResultChanged {
        /// Current result.
        prev: Option<R>,
        /// Incoming result.
        next: R,
    },
    /// The done chain finished.
    Done {
        /// Final result.
        result: Option<R>,
        /// Final snapshot.
        snapshot: StateSnapshot<P, R>,
    },
    /// The fail chain finished.
    Fail {
        /// Final result.
        result: Option<R>,
        /// Final snapshot.
        snapshot: StateSnapshot<P, R>,
    },
    /// Either terminal chain finished. Always follows `Done` or `Fail`.
    Finish {
        /// Final result.
        result: Option<R>,
        /// Final snapshot.
        snapshot: StateSnapshot<P, R>,
    },
    /// The request was cancelled.
    Cancel {
        /// Snapshot after cancellation.
        snapshot: StateSnapshot<P, R>,
    },
    /// The adapter faulted; the request will never settle.
    Error(AdapterError),
    /// Adapter-defined event.
    Custom {
        /// Event name.
        name: Cow<'static, str>,
        /// Event data.
        data: serde_json::Value,
    },
}

impl<P, R> RequestEvent<P, R> {
    /// The subscription key of this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::StateChanged { .. } => EventKind::StateChanged,
            Self::PayloadChanged { .. } => EventKind::PayloadChanged,
            Self::ResultChanged { .. } => EventKind::ResultChanged,
            Self::Done { .. } => EventKind::Done,
            Self::Fail { .. } => EventKind::Fail,
            Self::Finish { .. } => EventKind::Finish,
            Self::Cancel { .. } => EventKind::Cancel,
            Self::Error(_) => EventKind::Error,
            Self::Custom { name, .. } => EventKind::Custom(name.clone()),
        }
    }

    /// The snapshot carried by terminal events.
    #[must_use]
    pub const fn snapshot(&self) -> Option<&StateSnapshot<P, R>> {
        match self {
            Self::Done { snapshot, .. }
            | Self::Fail { snapshot, .. }
            | Self::Finish { snapshot, .. }
            | Self::Cancel { snapshot } => Some(snapshot),
            Self::StateChanged { next, .. } => Some(next),
            _ => None,
        }
    }
}
