//! Error types shared by every layer of the engine.
//!
//! Only one kind of error is ever surfaced through a request's completion:
//! an [`AdapterError`], which also covers hooks that panic. Business failures
//! (an adapter calling `reject`) are a normal terminal state, not an error.

use crate::route::ChainId;
use thiserror::Error;

/// A fault raised by an adapter's unit of work, or by a panicking hook.
///
/// A fault is unrecoverable for the request it happened in. It is
/// broadcast as an `error` event and then returned from the request's
/// completion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// The adapter's future resolved to an error before settling the request.
    #[error("Adapter failed: {0}")]
    Failed(String),

    /// The adapter's task panicked before settling the request.
    #[error("Adapter panicked: {0}")]
    Panicked(String),

    /// A hook panicked while being invoked.
    #[error("{chain} hook panicked: {message}")]
    HookPanicked {
        /// Chain the hook belongs to.
        chain: ChainId,
        /// The panic message.
        message: String,
    },
}

impl AdapterError {
    /// Create a [`AdapterError::Failed`] from any displayable reason.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

impl From<anyhow::Error> for AdapterError {
    fn from(error: anyhow::Error) -> Self {
        Self::Failed(format!("{error:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anyhow_conversion_keeps_context() {
        let error = anyhow::anyhow!("connection reset").context("sending request");
        let adapter_error = AdapterError::from(error);

        assert_eq!(
            adapter_error,
            AdapterError::Failed("sending request: connection reset".to_string())
        );
    }

    #[test]
    fn test_hook_panic_display_names_the_chain() {
        let error = AdapterError::HookPanicked {
            chain: ChainId::Done,
            message: "index out of bounds".to_string(),
        };
        assert_eq!(error.to_string(), "done hook panicked: index out of bounds");
    }

    #[test]
    fn test_display() {
        assert_eq!(
            AdapterError::failed("boom").to_string(),
            "Adapter failed: boom"
        );
    }
}
