//! # Hookline Core
//!
//! Core types for the hookline request lifecycle engine.
//!
//! This crate holds the pure half of the engine: the request state record, the
//! single transition function that drives it, and the events and snapshots it
//! produces. Nothing here performs I/O or spawns tasks; the runtime crate owns
//! hooks, adapters and scheduling.
//!
//! ## Core Concepts
//!
//! - **State**: [`RequestState`], the `{success, pending, cancelled, payload, result, meta}` record
//! - **Transition**: every change to a request, applied by [`RequestState::apply`]
//! - **Snapshot**: [`StateSnapshot`], an immutable copy taken on every transition
//! - **Event**: [`RequestEvent`], what a request broadcasts to its subscribers
//! - **Route**: a flow redirect between the `before`, `done` and `fail` chains
//!
//! ## Lifecycle
//!
//! ```text
//!            ┌──────────── retry ─────────────┐
//!            ▼                                │
//!      ┌──────────┐  resolve  ┌────────┐ fail ┌────────┐
//!      │  before  │──adapter─►│  done  │─────►│  fail  │
//!      └──────────┘  reject   └────────┘◄─────└────────┘
//!                      │          │      done     │
//!                      └──────────┼───────────────┤
//!                                 ▼               ▼
//!                              SUCCESS         FAILED
//!
//!      cancel() from any point ──────────────► CANCELLED
//! ```
//!
//! ## Example
//!
//! ```
//! use hookline_core::{RequestState, RequestStatus, Transition};
//! use serde_json::json;
//!
//! let state: RequestState<u32, String> = RequestState::new(1, None, json!({}));
//! let applied = state
//!     .apply(Transition::Result("ok".to_string()))
//!     .and_then(|applied| applied.next.apply(Transition::Settle { success: true }));
//!
//! let state = applied.map(|applied| applied.next);
//! assert_eq!(state.map(|s| s.status()), Some(RequestStatus::Success));
//! ```

pub mod error;
pub mod event;
pub mod route;
pub mod state;

pub use error::AdapterError;
pub use event::{EventKind, RequestEvent};
pub use route::{ChainId, Route, Step};
pub use state::{
    Applied, RequestState, RequestStatus, StateDiff, StateFlags, StateSnapshot, Transition,
};

// Re-export commonly used types
pub use smallvec::{SmallVec, smallvec};

/// Caller-supplied request metadata.
///
/// The engine never interprets it; it is carried through every context,
/// snapshot and event unchanged.
pub type Meta = serde_json::Value;
