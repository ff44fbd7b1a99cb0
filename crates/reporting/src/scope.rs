//! Scope: contextual data applied to every event captured while it is active.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use jobwatch_core::ExcInfo;

use crate::event::{Breadcrumb, Event, Hint, Level, User};

/// Default cap on buffered breadcrumbs.
pub const DEFAULT_MAX_BREADCRUMBS: usize = 100;

/// Transforms an event before delivery; returning `None` drops it.
pub type EventProcessor = Arc<dyn Fn(Event, &Hint) -> Option<Event> + Send + Sync>;

/// Like [`EventProcessor`] but only invoked for events carrying exception info.
pub type ErrorProcessor = Arc<dyn Fn(Event, &ExcInfo) -> Option<Event> + Send + Sync>;

#[derive(Clone)]
pub struct Scope {
    name: Option<String>,
    level: Option<Level>,
    fingerprint: Option<Vec<String>>,
    transaction: Option<String>,
    user: Option<User>,
    tags: BTreeMap<String, String>,
    contexts: Map<String, Value>,
    extra: Map<String, Value>,
    breadcrumbs: VecDeque<Breadcrumb>,
    max_breadcrumbs: usize,
    event_processors: Vec<EventProcessor>,
    error_processors: Vec<ErrorProcessor>,
}

impl Default for Scope {
    fn default() -> Self {
        Self {
            name: None,
            level: None,
            fingerprint: None,
            transaction: None,
            user: None,
            tags: BTreeMap::new(),
            contexts: Map::new(),
            extra: Map::new(),
            breadcrumbs: VecDeque::new(),
            max_breadcrumbs: DEFAULT_MAX_BREADCRUMBS,
            event_processors: Vec::new(),
            error_processors: Vec::new(),
        }
    }
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Label used in logs to tell scopes apart.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// When set this overrides the event level.
    pub fn set_level(&mut self, level: Option<Level>) {
        self.level = level;
    }

    /// When set this overrides the default fingerprint.
    pub fn set_fingerprint(&mut self, fingerprint: Option<Vec<String>>) {
        self.fingerprint = fingerprint;
    }

    pub fn set_transaction(&mut self, transaction: Option<String>) {
        self.transaction = transaction;
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn set_user(&mut self, user: Option<User>) {
        self.user = user;
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    pub fn set_context(&mut self, key: impl Into<String>, value: Value) {
        self.contexts.insert(key.into(), value);
    }

    pub fn set_extra(&mut self, key: impl Into<String>, value: Value) {
        self.extra.insert(key.into(), value);
    }

    /// Reset everything except the processors and the name.
    pub fn clear(&mut self) {
        self.level = None;
        self.fingerprint = None;
        self.transaction = None;
        self.user = None;
        self.tags.clear();
        self.contexts.clear();
        self.extra.clear();
        self.clear_breadcrumbs();
    }

    pub fn breadcrumbs(&self) -> impl Iterator<Item = &Breadcrumb> {
        self.breadcrumbs.iter()
    }

    pub fn clear_breadcrumbs(&mut self) {
        self.breadcrumbs.clear();
    }

    pub fn set_max_breadcrumbs(&mut self, max: usize) {
        self.max_breadcrumbs = max;
        self.trim_breadcrumbs();
    }

    /// Record a breadcrumb, evicting the oldest once the buffer is full.
    pub fn add_breadcrumb(&mut self, breadcrumb: Breadcrumb) {
        if self.max_breadcrumbs == 0 {
            return;
        }
        self.breadcrumbs.push_back(breadcrumb);
        self.trim_breadcrumbs();
    }

    fn trim_breadcrumbs(&mut self) {
        while self.breadcrumbs.len() > self.max_breadcrumbs {
            self.breadcrumbs.pop_front();
        }
    }

    /// Register a scope-local event processor.
    pub fn add_event_processor<F>(&mut self, processor: F)
    where
        F: Fn(Event, &Hint) -> Option<Event> + Send + Sync + 'static,
    {
        self.event_processors.push(Arc::new(processor));
    }

    pub fn event_processor_count(&self) -> usize {
        self.event_processors.len()
    }

    /// Register an error processor invoked with the exception info of
    /// events that carry one.
    pub fn add_error_processor<F>(&mut self, processor: F)
    where
        F: Fn(Event, &ExcInfo) -> Option<Event> + Send + Sync + 'static,
    {
        self.error_processors.push(Arc::new(processor));
    }

    /// Register an error processor that only fires for errors of type `E`.
    pub fn add_error_processor_for<E, F>(&mut self, processor: F)
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
        F: Fn(Event, &ExcInfo) -> Option<Event> + Send + Sync + 'static,
    {
        self.add_error_processor(move |event, exc| {
            if exc.is::<E>() {
                processor(event, exc)
            } else {
                Some(event)
            }
        });
    }

    /// Apply the scope to `event`.
    ///
    /// Returns `None` when a processor dropped the event. A processor that
    /// panics is skipped and the event continues unchanged.
    pub fn apply_to_event(&self, mut event: Event, hint: &Hint) -> Option<Event> {
        if let Some(level) = self.level {
            event.level = level;
        }

        event.breadcrumbs.extend(self.breadcrumbs.iter().cloned());

        if event.user.is_none() {
            event.user = self.user.clone();
        }
        if event.transaction.is_none() {
            event.transaction = self.transaction.clone();
        }
        if event.fingerprint.is_none() {
            event.fingerprint = self.fingerprint.clone();
        }

        for (k, v) in &self.extra {
            event.extra.insert(k.clone(), v.clone());
        }
        for (k, v) in &self.tags {
            event.tags.insert(k.clone(), v.clone());
        }
        for (k, v) in &self.contexts {
            event.contexts.insert(k.clone(), v.clone());
        }

        if let Some(exc_info) = &hint.exc_info {
            for processor in &self.error_processors {
                event = match isolated(&event, |e| processor(e, exc_info)) {
                    Some(e) => e,
                    None => return self.dropped(&event, "error processor"),
                };
            }
        }

        for processor in &self.event_processors {
            event = match isolated(&event, |e| processor(e, hint)) {
                Some(e) => e,
                None => return self.dropped(&event, "event processor"),
            };
        }

        Some(event)
    }

    fn dropped(&self, event: &Event, by: &str) -> Option<Event> {
        info!(
            scope = self.name.as_deref().unwrap_or("-"),
            event_id = %event.event_id,
            "{by} dropped event"
        );
        None
    }
}

/// Run `f` on a copy of `event`; if it panics keep the original.
fn isolated<F>(event: &Event, f: F) -> Option<Event>
where
    F: FnOnce(Event) -> Option<Event>,
{
    match catch_unwind(AssertUnwindSafe(|| f(event.clone()))) {
        Ok(result) => result,
        Err(_) => {
            debug!(event_id = %event.event_id, "processor panicked; event kept as is");
            Some(event.clone())
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.name)
            .field("level", &self.level)
            .field("fingerprint", &self.fingerprint)
            .field("transaction", &self.transaction)
            .field("user", &self.user)
            .field("tags", &self.tags)
            .field("breadcrumbs", &self.breadcrumbs.len())
            .field("event_processors", &self.event_processors.len())
            .field("error_processors", &self.error_processors.len())
            .finish()
    }
}
