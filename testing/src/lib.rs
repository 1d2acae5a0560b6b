//! # Hookline Testing
//!
//! Testing utilities and helpers for the hookline request lifecycle engine.
//!
//! This crate provides:
//! - Mock adapters that resolve, reject, fault, hang or wait for the test
//! - An event recorder for asserting on emission order
//! - A Given-When-Then harness for the state machine
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```ignore
//! use hookline_runtime::{RawRequest, create};
//! use hookline_testing::{EventRecorder, ScriptedAdapter};
//!
//! #[tokio::test]
//! async fn test_retry_flow() {
//!     let adapter = ScriptedAdapter::new(vec![Outcome::Reject("busy")], Outcome::Resolve("ok"));
//!     let client = create(adapter.clone());
//!
//!     let handle = client.prepare(RawRequest::new().payload(1)).unwrap();
//!     let recorder = EventRecorder::attach(&handle);
//!     handle.start();
//!
//!     let snapshot = handle.completion().await.unwrap();
//!     assert!(!snapshot.success);
//!     assert_eq!(recorder.names().last().map(String::as_str), Some("finish"));
//! }
//! ```

/// Mock adapters
pub mod mocks;

/// Property-based testing utilities
pub mod properties;

/// Event recording
pub mod recorder;

/// Given-When-Then harness for state transitions
pub mod transition_test;

// Re-export commonly used items
pub use mocks::{ManualAdapter, Outcome, ScriptedAdapter};
pub use recorder::EventRecorder;
pub use transition_test::{TransitionTest, assertions};

/// Install a `tracing` subscriber for tests.
///
/// Honours `RUST_LOG` and writes through the test harness's capture. Safe to
/// call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
