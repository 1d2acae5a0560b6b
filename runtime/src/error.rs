//! Error types for the runtime.

use std::any::Any;
use thiserror::Error;

pub use hookline_core::AdapterError;

/// Errors raised while normalizing a raw request into a descriptor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// Neither `payload` nor the deprecated `data` field was set.
    #[error("Request has no payload")]
    MissingPayload,
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panicked".to_string())
}
