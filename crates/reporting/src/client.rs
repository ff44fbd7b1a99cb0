//! Reporting client.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::event::{Event, Hint};
use crate::integration::Integration;
use crate::options::ClientOptions;
use crate::scope::Scope;
use crate::transport::Transport;

/// Prepares events and hands them to a transport.
pub struct Client {
    options: ClientOptions,
    transport: Arc<dyn Transport>,
}

impl Client {
    /// Create a client. Every registered integration gets its `setup` call
    /// here, once.
    pub fn new<T: Transport + 'static>(options: ClientOptions, transport: T) -> Self {
        let mut options = options;
        let integrations = options.integrations.clone();
        for entry in &integrations {
            entry.integration.setup(&mut options);
            debug!(integration = entry.integration.name(), "integration installed");
        }
        Self {
            options,
            transport: Arc::new(transport),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Look up a registered integration by type.
    pub fn get_integration<I: Integration>(&self) -> Option<Arc<I>> {
        self.options.integrations.iter().find_map(|e| e.downcast::<I>())
    }

    /// Fill client defaults and apply `scope`.
    ///
    /// Returns `None` when a scope processor dropped the event.
    pub fn prepare_event(&self, mut event: Event, hint: &Hint, scope: Option<&Scope>) -> Option<Event> {
        if event.event_id.is_nil() {
            event.event_id = Uuid::new_v4();
        }
        if event.timestamp.is_none() {
            event.timestamp = Some(Utc::now());
        }
        if event.environment.is_none() {
            event.environment = self.options.environment.clone();
        }
        if event.release.is_none() {
            event.release = self.options.release.clone();
        }
        if event.server_name.is_none() {
            event.server_name = self.options.server_name.clone();
        }

        match scope {
            Some(scope) => scope.apply_to_event(event, hint),
            None => Some(event),
        }
    }

    /// Prepare and send an event. Returns its id if it was sent.
    pub fn capture_event(&self, event: Event, hint: &Hint, scope: Option<&Scope>) -> Option<Uuid> {
        let event = self.prepare_event(event, hint, scope)?;
        let id = event.event_id;
        self.transport.send_event(event);
        Some(id)
    }

    /// Wait for buffered events, bounded by `timeout` or the configured
    /// shutdown timeout.
    pub fn flush(&self, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(self.options.shutdown_timeout);
        let delivered = self.transport.flush(timeout);
        if !delivered {
            warn!(timeout_ms = timeout.as_millis() as u64, "flush timed out");
        }
        delivered
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
