//! Client configuration.

use serde::{Deserialize, Serialize};

/// Default capacity of each request's broadcast channel.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 16;

/// Configuration shared by every request a [`Client`](crate::Client) issues.
///
/// # Example
///
/// ```
/// use hookline_runtime::ClientConfig;
///
/// let config = ClientConfig::default()
///     .with_broadcast_capacity(256)
///     .with_deprecation_warnings(false);
///
/// assert_eq!(config.broadcast_capacity, 256);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Events buffered per request for
    /// [`RequestHandle::subscribe`](crate::RequestHandle::subscribe) receivers
    /// before slow receivers start lagging.
    pub broadcast_capacity: usize,
    /// Log a warning when a request uses a deprecated shape.
    pub deprecation_warnings: bool,
}

impl ClientConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            deprecation_warnings: true,
        }
    }

    /// Set the per-request broadcast capacity. Zero is raised to one.
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = if capacity == 0 { 1 } else { capacity };
        self
    }

    /// Enable or disable deprecation warnings.
    #[must_use]
    pub const fn with_deprecation_warnings(mut self, enabled: bool) -> Self {
        self.deprecation_warnings = enabled;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}
