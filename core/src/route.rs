//! Chain identifiers and flow redirects.
//!
//! Hooks never hold references to other chains. A redirect is a plain value
//! naming the chain that should run next together with the value it starts
//! from; the controller's dispatcher is the only place that interprets it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three hook chains of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainId {
    /// Runs before the adapter call; hooks rewrite the payload.
    Before,
    /// Runs after the adapter resolved; hooks see the result.
    Done,
    /// Runs after the adapter rejected; hooks see the result.
    Fail,
}

impl ChainId {
    /// Stable lowercase name, used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::Done => "done",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a request continues: a chain plus the value that chain starts with.
///
/// The before chain works on payloads (`P`), the done and fail chains on
/// results (`R`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route<P, R> {
    /// Re-enter the before chain with a payload (retry).
    Before(P),
    /// Enter the done chain with a result (resolve or promote).
    Done(R),
    /// Enter the fail chain with a result (reject or demote).
    Fail(R),
}

impl<P, R> Route<P, R> {
    /// The chain this route enters.
    #[must_use]
    pub const fn chain(&self) -> ChainId {
        match self {
            Self::Before(_) => ChainId::Before,
            Self::Done(_) => ChainId::Done,
            Self::Fail(_) => ChainId::Fail,
        }
    }
}

/// How a single chain step was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T, P, R> {
    /// Continue with the next hook of the same chain.
    Next(T),
    /// Abandon the current chain and continue elsewhere.
    Redirect(Route<P, R>),
}
