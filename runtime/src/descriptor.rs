//! Request descriptors and their normalization.
//!
//! A [`RequestDescriptor`] is the normalized description of one request: its
//! metadata, initial payload, the three hook lists and an optional adapter
//! override. Callers usually build a [`RawRequest`] and let the client
//! normalize it; anything implementing [`IntoDescriptor`] can be issued.
//! Normalizing an already normalized descriptor is the identity.

use crate::adapter::{Adapter, SharedAdapter};
use crate::config::ClientConfig;
use crate::error::NormalizeError;
use crate::hook::{BeforeHook, DoneHook, FailHook};
use hookline_core::Meta;
use std::fmt;
use std::sync::Arc;

/// The three hook lists of a request.
pub struct Hooks<P, R> {
    /// Run before the adapter call, in order.
    pub before: Vec<BeforeHook<P, R>>,
    /// Run after the adapter resolved, in order.
    pub done: Vec<DoneHook<P, R>>,
    /// Run after the adapter rejected, in order.
    pub fail: Vec<FailHook<P, R>>,
}

impl<P, R> Default for Hooks<P, R> {
    fn default() -> Self {
        Self {
            before: Vec::new(),
            done: Vec::new(),
            fail: Vec::new(),
        }
    }
}

impl<P, R> Clone for Hooks<P, R> {
    fn clone(&self) -> Self {
        Self {
            before: self.before.clone(),
            done: self.done.clone(),
            fail: self.fail.clone(),
        }
    }
}

impl<P, R> fmt::Debug for Hooks<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("before", &self.before.len())
            .field("done", &self.done.len())
            .field("fail", &self.fail.len())
            .finish()
    }
}

/// A normalized request.
pub struct RequestDescriptor<P, R> {
    /// Caller metadata, carried unchanged.
    pub meta: Meta,
    /// Initial payload handed to the first `before` hook.
    pub payload: P,
    /// Hook lists.
    pub hooks: Hooks<P, R>,
    /// Adapter used instead of the client's default.
    pub adapter: Option<SharedAdapter<P, R>>,
}

impl<P, R> RequestDescriptor<P, R> {
    /// A descriptor with no metadata, no hooks and no adapter override.
    #[must_use]
    pub fn new(payload: P) -> Self {
        Self {
            meta: Meta::Null,
            payload,
            hooks: Hooks::default(),
            adapter: None,
        }
    }
}

impl<P: fmt::Debug, R> fmt::Debug for RequestDescriptor<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("meta", &self.meta)
            .field("payload", &self.payload)
            .field("hooks", &self.hooks)
            .field("adapter", &self.adapter.is_some())
            .finish()
    }
}

/// An un-normalized request, built fluently.
///
/// # Example
///
/// ```ignore
/// let request = RawRequest::new()
///     .payload(Query { id: 7 })
///     .meta(json!({"trace": "abc"}))
///     .before(Hook::new(|ctx| { ctx.next(ctx.payload().clone()); }))
///     .fail(Hook::new(|ctx| { ctx.retry(ctx.payload().clone()); }));
///
/// let handle = client.issue(request)?;
/// ```
pub struct RawRequest<P, R> {
    meta: Option<Meta>,
    payload: Option<P>,
    data: Option<P>,
    hooks: Hooks<P, R>,
    adapter: Option<SharedAdapter<P, R>>,
}

impl<P, R> Default for RawRequest<P, R> {
    fn default() -> Self {
        Self {
            meta: None,
            payload: None,
            data: None,
            hooks: Hooks::default(),
            adapter: None,
        }
    }
}

impl<P, R> RawRequest<P, R> {
    /// An empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the payload.
    #[must_use]
    pub fn payload(mut self, payload: P) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Set the payload through the legacy `data` field.
    #[deprecated(note = "use `RawRequest::payload`")]
    #[must_use]
    pub fn data(mut self, data: P) -> Self {
        self.data = Some(data);
        self
    }

    /// Set the metadata.
    #[must_use]
    pub fn meta(mut self, meta: Meta) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Append a `before` hook.
    #[must_use]
    pub fn before(mut self, hook: BeforeHook<P, R>) -> Self {
        self.hooks.before.push(hook);
        self
    }

    /// Append a `done` hook.
    #[must_use]
    pub fn done(mut self, hook: DoneHook<P, R>) -> Self {
        self.hooks.done.push(hook);
        self
    }

    /// Append a `fail` hook.
    #[must_use]
    pub fn fail(mut self, hook: FailHook<P, R>) -> Self {
        self.hooks.fail.push(hook);
        self
    }

    /// Override the client's adapter for this request.
    #[must_use]
    pub fn adapter<A>(mut self, adapter: A) -> Self
    where
        A: Adapter<Payload = P, Output = R>,
    {
        self.adapter = Some(Arc::new(adapter));
        self
    }
}

/// Normalize `raw` with default configuration.
///
/// # Errors
///
/// Returns [`NormalizeError::MissingPayload`] if no payload was given.
pub fn normalize<P, R>(raw: RawRequest<P, R>) -> Result<RequestDescriptor<P, R>, NormalizeError> {
    normalize_with(raw, &ClientConfig::default())
}

/// Normalize `raw`, honouring `config.deprecation_warnings`.
///
/// # Errors
///
/// Returns [`NormalizeError::MissingPayload`] if no payload was given.
pub fn normalize_with<P, R>(
    raw: RawRequest<P, R>,
    config: &ClientConfig,
) -> Result<RequestDescriptor<P, R>, NormalizeError> {
    let RawRequest {
        meta,
        payload,
        data,
        hooks,
        adapter,
    } = raw;

    if data.is_some() && config.deprecation_warnings {
        tracing::warn!("Request uses the deprecated `data` field; use `payload` instead");
    }

    let payload = match (payload, data) {
        (Some(payload), _) | (None, Some(payload)) => payload,
        (None, None) => return Err(NormalizeError::MissingPayload),
    };

    Ok(RequestDescriptor {
        meta: meta.unwrap_or(Meta::Null),
        payload,
        hooks,
        adapter,
    })
}

/// Anything that can be turned into a [`RequestDescriptor`].
pub trait IntoDescriptor<P, R> {
    /// Normalize into a descriptor.
    ///
    /// # Errors
    ///
    /// Returns a [`NormalizeError`] if the request is incomplete.
    fn into_descriptor(
        self,
        config: &ClientConfig,
    ) -> Result<RequestDescriptor<P, R>, NormalizeError>;
}

impl<P, R> IntoDescriptor<P, R> for RequestDescriptor<P, R> {
    fn into_descriptor(
        self,
        _config: &ClientConfig,
    ) -> Result<RequestDescriptor<P, R>, NormalizeError> {
        Ok(self)
    }
}

impl<P, R> IntoDescriptor<P, R> for RawRequest<P, R> {
    fn into_descriptor(
        self,
        config: &ClientConfig,
    ) -> Result<RequestDescriptor<P, R>, NormalizeError> {
        normalize_with(self, config)
    }
}
