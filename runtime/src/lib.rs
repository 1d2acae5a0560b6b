//! # Hookline Runtime
//!
//! Runtime for the hookline request lifecycle engine.
//!
//! This crate runs requests: it owns the hook chains, the adapter call, the
//! per-request event bus and the task that drives everything between issue
//! and a terminal state. The pure state machine lives in `hookline-core`.
//!
//! ## Core Components
//!
//! - **Client**: binds an [`Adapter`] to a [`ClientConfig`] and issues requests
//! - **`RequestHandle`**: observes and controls one request
//! - **Hooks**: `before`, `done` and `fail` middleware with flow-control contexts
//! - **`EventBus`**: synchronous handlers plus a broadcast channel per request
//!
//! ## Example
//!
//! ```ignore
//! use hookline_runtime::{AdapterContext, Hook, Observable, RawRequest, adapter_fn, create};
//!
//! let client = create(adapter_fn(|ctx: AdapterContext<u32, String>| async move {
//!     if *ctx.payload() > 0 {
//!         ctx.resolve("ok".to_string());
//!     } else {
//!         ctx.reject("empty".to_string());
//!     }
//!     Ok(())
//! }));
//!
//! let request = RawRequest::new()
//!     .payload(0)
//!     .fail(Hook::new(|ctx| {
//!         ctx.retry(ctx.payload() + 1);
//!     }));
//!
//! let handle = client.prepare(request)?;
//! handle.on_finish(|result, snapshot| tracing::info!(?result, ?snapshot, "finished"));
//! handle.start();
//!
//! let snapshot = handle.await?;
//! assert!(snapshot.success);
//! assert_eq!(snapshot.payload, 1);
//! ```

/// The adapter contract and closure adapters
pub mod adapter;

/// Per-request event bus and the observer API
pub mod bus;

/// Sequential hook chain executor
pub mod chain;

/// The client that issues requests
pub mod client;

/// Client configuration
pub mod config;

/// Request descriptors and normalization
pub mod descriptor;

/// Error types for the runtime
pub mod error;

/// Hooks, hook contexts and step settlement
pub mod hook;

/// Prometheus metrics for observability
pub mod metrics;

/// The request controller
pub mod request;

pub use adapter::{Adapter, AdapterContext, AdapterFuture, FnAdapter, SharedAdapter, adapter_fn};
pub use bus::{EventBus, Observable};
pub use chain::{ChainOutcome, HookChain};
pub use client::{Client, create};
pub use config::{ClientConfig, DEFAULT_BROADCAST_CAPACITY};
pub use descriptor::{
    Hooks, IntoDescriptor, RawRequest, RequestDescriptor, normalize, normalize_with,
};
pub use error::{AdapterError, NormalizeError};
pub use hook::{
    BeforeContext, BeforeHook, DoneContext, DoneHook, FailContext, FailHook, Hook, Settler,
};
pub use request::{Completion, RequestHandle};

pub use hookline_core::{
    ChainId, EventKind, Meta, RequestEvent, RequestState, RequestStatus, Route, StateDiff,
    StateFlags, StateSnapshot, Step,
};
