//! Reporter sink for completed events.
//!
//! The tracer hands every finished event to a [`Reporter`] and treats the
//! call as fire-and-forget: failures are logged and counted by the caller
//! but never propagate into the instrumented application. Implementations
//! own their transport and must return within the timeout they are given.

use crate::error::{TraceError, TraceResult};
use crate::event::Event;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Accepts completed events for transmission to a collector.
pub trait Reporter: Send + Sync + fmt::Debug {
    /// Deliver one event, completing within `timeout`.
    fn send(&self, event: &Event, timeout: Duration) -> TraceResult<()>;
}

/// A [`Reporter`] that discards every event.
#[derive(Clone, Debug, Default)]
pub struct NoopReporter {
    _private: (),
}

impl NoopReporter {
    /// Create a new `NoopReporter`.
    pub fn new() -> Self {
        NoopReporter::default()
    }
}

impl Reporter for NoopReporter {
    fn send(&self, _event: &Event, _timeout: Duration) -> TraceResult<()> {
        Ok(())
    }
}

/// A [`Reporter`] that stores events in memory.
///
/// Useful for testing and debugging. Finished events can be retrieved with
/// [`InMemoryReporter::finished_events`].
///
/// # Example
///
/// ```
/// use xtrace::{InMemoryReporter, TracerProvider};
///
/// let reporter = InMemoryReporter::default();
/// let provider = TracerProvider::builder()
///     .with_reporter(reporter.clone())
///     .build();
///
/// let mut tracer = provider.tracer();
/// tracer.start_trace("web", None, Vec::new());
/// tracer.end_trace("web", Vec::new());
///
/// assert_eq!(reporter.finished_events().len(), 2);
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryReporter {
    events: Arc<Mutex<Vec<Event>>>,
}

impl InMemoryReporter {
    /// Create a new `InMemoryReporter`.
    pub fn new() -> Self {
        InMemoryReporter::default()
    }

    /// Returns the events delivered so far, in delivery order.
    pub fn finished_events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Clears the stored events.
    pub fn reset(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Reporter for InMemoryReporter {
    fn send(&self, event: &Event, _timeout: Duration) -> TraceResult<()> {
        self.events
            .lock()
            .map(|mut events| events.push(event.clone()))
            .map_err(|err| TraceError::SendFailed(format!("event store lock poisoned: {err}")))
    }
}
