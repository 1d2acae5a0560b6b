//! The client: an adapter bound to a configuration.

use crate::adapter::{Adapter, SharedAdapter};
use crate::config::ClientConfig;
use crate::descriptor::IntoDescriptor;
use crate::error::NormalizeError;
use crate::request::RequestHandle;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Issues requests through one adapter.
///
/// Cheap to clone; clones share the adapter and the request id counter.
///
/// # Example
///
/// ```ignore
/// let client = hookline_runtime::create(adapter_fn(|ctx: AdapterContext<u32, u32>| async move {
///     ctx.resolve(ctx.payload() + 1);
///     Ok(())
/// }));
///
/// let snapshot = client.issue(RawRequest::new().payload(41))?.await?;
/// assert_eq!(snapshot.result, Some(42));
/// ```
pub struct Client<P, R> {
    adapter: SharedAdapter<P, R>,
    config: ClientConfig,
    next_id: Arc<AtomicU64>,
}

impl<P, R> Clone for Client<P, R> {
    fn clone(&self) -> Self {
        Self {
            adapter: Arc::clone(&self.adapter),
            config: self.config.clone(),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<P, R> fmt::Debug for Client<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("issued", &self.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<P, R> Client<P, R>
where
    P: Clone + fmt::Debug + Send + Sync + 'static,
    R: Clone + fmt::Debug + Send + Sync + 'static,
{
    /// Create a client with default configuration.
    #[must_use]
    pub fn new<A>(adapter: A) -> Self
    where
        A: Adapter<Payload = P, Output = R>,
    {
        Self::with_config(adapter, ClientConfig::default())
    }

    /// Create a client with custom configuration.
    #[must_use]
    pub fn with_config<A>(adapter: A, config: ClientConfig) -> Self
    where
        A: Adapter<Payload = P, Output = R>,
    {
        Self::from_shared(Arc::new(adapter), config)
    }

    /// Create a client from an adapter that is already shared.
    #[must_use]
    pub fn from_shared(adapter: SharedAdapter<P, R>, config: ClientConfig) -> Self {
        Self {
            adapter,
            config,
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The configuration every request is issued with.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The default adapter.
    #[must_use]
    pub const fn adapter(&self) -> &SharedAdapter<P, R> {
        &self.adapter
    }

    /// Normalize `request` and build its handle without starting it.
    ///
    /// Nothing is emitted until [`RequestHandle::start`] is called, so
    /// subscribers attached in between observe every event.
    ///
    /// # Errors
    ///
    /// Returns a [`NormalizeError`] if the request cannot be normalized.
    pub fn prepare(
        &self,
        request: impl IntoDescriptor<P, R>,
    ) -> Result<RequestHandle<P, R>, NormalizeError> {
        let descriptor = request.into_descriptor(&self.config)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(RequestHandle::new(id, &self.adapter, descriptor, &self.config))
    }

    /// Normalize `request` and start it on the current tokio runtime.
    ///
    /// On a multi-threaded runtime the request may emit events before the
    /// caller attaches handlers; use [`Client::prepare`] when that matters.
    ///
    /// # Errors
    ///
    /// Returns a [`NormalizeError`] if the request cannot be normalized.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn issue(
        &self,
        request: impl IntoDescriptor<P, R>,
    ) -> Result<RequestHandle<P, R>, NormalizeError> {
        let handle = self.prepare(request)?;
        handle.start();
        Ok(handle)
    }
}

/// Create a client for `adapter` with default configuration.
#[must_use]
pub fn create<A: Adapter>(adapter: A) -> Client<A::Payload, A::Output> {
    Client::new(adapter)
}
