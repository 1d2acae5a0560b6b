//! Records every event a request emits.

use hookline_core::{EventKind, RequestEvent};
use hookline_runtime::Observable;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Captures events from an [`Observable`] in emission order.
///
/// Attach it before starting the request (see `Client::prepare`) to observe
/// every event.
///
/// # Example
///
/// ```ignore
/// let handle = client.prepare(request)?;
/// let recorder = EventRecorder::attach(&handle);
/// handle.start();
/// handle.completion().await?;
///
/// assert_eq!(recorder.names().last().map(String::as_str), Some("finish"));
/// ```
pub struct EventRecorder<P, R> {
    events: Arc<Mutex<Vec<RequestEvent<P, R>>>>,
}

impl<P, R> Clone for EventRecorder<P, R> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
        }
    }
}

impl<P, R> fmt::Debug for EventRecorder<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRecorder")
            .field("recorded", &self.events.lock().map_or(0, |e| e.len()))
            .finish()
    }
}

impl<P, R> EventRecorder<P, R>
where
    P: Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    /// Start recording everything `source` emits.
    pub fn attach<O: Observable<P, R>>(source: &O) -> Self {
        let recorder = Self {
            events: Arc::new(Mutex::new(Vec::new())),
        };
        let sink = Arc::clone(&recorder.events);
        source.on_any(move |event| {
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event.clone());
        });
        recorder
    }

    /// Every recorded event.
    #[must_use]
    pub fn events(&self) -> Vec<RequestEvent<P, R>> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The kind of every recorded event.
    #[must_use]
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(RequestEvent::kind)
            .collect()
    }

    /// The wire name of every recorded event.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.kinds().iter().map(ToString::to_string).collect()
    }

    /// Number of recorded events of `kind`.
    #[must_use]
    pub fn count(&self, kind: &EventKind) -> usize {
        self.kinds().iter().filter(|k| *k == kind).count()
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
