//! Event transports.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{error, warn};

use crate::error::ReportingError;
use crate::event::Event;

/// Delivers prepared events.
///
/// Delivery failures stay inside the transport; callers never see them.
pub trait Transport: Send + Sync {
    fn send_event(&self, event: Event);

    /// Block until buffered events are delivered or `timeout` elapses.
    /// Returns `false` when the deadline was hit.
    fn flush(&self, _timeout: Duration) -> bool {
        true
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send_event(&self, event: Event) {
        (**self).send_event(event)
    }

    fn flush(&self, timeout: Duration) -> bool {
        (**self).flush(timeout)
    }
}

/// In-memory transport for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    events: Mutex<Vec<Event>>,
    flushes: AtomicUsize,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Snapshot of every event sent so far.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn take_events(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl Transport for InMemoryTransport {
    fn send_event(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    fn flush(&self, _timeout: Duration) -> bool {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        true
    }
}

/// Writes each event as one structured log line.
///
/// Useful when no backend is configured: failures still end up in the
/// process log, with the full enriched payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTransport;

impl TracingTransport {
    fn render(event: &Event) -> Result<String, ReportingError> {
        Ok(serde_json::to_string(event)?)
    }
}

impl Transport for TracingTransport {
    fn send_event(&self, event: Event) {
        match Self::render(&event) {
            Ok(payload) => error!(
                target: "jobwatch::event",
                event_id = %event.event_id,
                transaction = event.transaction.as_deref().unwrap_or(""),
                payload = %payload,
                "captured event"
            ),
            Err(e) => warn!(event_id = %event.event_id, error = %e, "dropping event"),
        }
    }
}
