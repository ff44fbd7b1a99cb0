//! Hub: a client plus a stack of scopes.
//!
//! A hub is an explicit handle. Code that reports passes it around (usually as
//! `Arc<Hub>`) instead of reaching for ambient global state, so several
//! independently configured hubs can live in one process.
//!
//! The scope stack belongs to one logical thread of work. Concurrent work
//! pushes its scopes on a hub of its own, forked with [`Hub::new_from_top`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use jobwatch_core::ExcInfo;

use crate::client::Client;
use crate::event::{Breadcrumb, Event, Hint, Level};
use crate::exception::event_from_exception;
use crate::integration::Integration;
use crate::scope::Scope;

pub struct Hub {
    client: RwLock<Option<Arc<Client>>>,
    stack: Mutex<Vec<Scope>>,
    last_event_id: Mutex<Option<Uuid>>,
}

impl Hub {
    pub fn new(client: Option<Arc<Client>>, scope: Scope) -> Self {
        let mut scope = scope;
        if let Some(client) = &client {
            scope.set_max_breadcrumbs(client.options().max_breadcrumbs);
        }
        Self {
            client: RwLock::new(client),
            stack: Mutex::new(vec![scope]),
            last_event_id: Mutex::new(None),
        }
    }

    /// Hub with the given client and an empty root scope.
    pub fn with_client(client: Arc<Client>) -> Self {
        Self::new(Some(client), Scope::new())
    }

    /// Hub sharing `other`'s client, seeded with a copy of its current scope.
    pub fn new_from_top(other: &Hub) -> Self {
        let scope = other.stack().last().cloned().unwrap_or_default();
        Self::new(other.client(), scope)
    }

    pub fn client(&self) -> Option<Arc<Client>> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace (or remove) the bound client. A new client's breadcrumb limit
    /// applies to every scope on the stack.
    pub fn bind_client(&self, client: Option<Arc<Client>>) {
        if let Some(client) = &client {
            let max = client.options().max_breadcrumbs;
            for scope in self.stack().iter_mut() {
                scope.set_max_breadcrumbs(max);
            }
        }
        *self.client.write().unwrap_or_else(PoisonError::into_inner) = client;
    }

    /// The integration of type `I`, if the bound client has it registered.
    pub fn get_integration<I: Integration>(&self) -> Option<Arc<I>> {
        self.client()?.get_integration::<I>()
    }

    /// Push a copy of the current scope. The returned guard pops it (and
    /// anything pushed after it) when dropped.
    pub fn push_scope(&self) -> ScopeGuard<'_> {
        let mut stack = self.stack();
        let top = stack.last().cloned().unwrap_or_default();
        let depth = stack.len();
        stack.push(top);
        ScopeGuard { hub: self, depth }
    }

    /// Run `body` inside a fresh scope prepared by `configure`.
    pub fn with_scope<C, F, R>(&self, configure: C, body: F) -> R
    where
        C: FnOnce(&mut Scope),
        F: FnOnce() -> R,
    {
        let _guard = self.push_scope();
        self.configure_scope(configure);
        body()
    }

    /// Mutate the current scope.
    pub fn configure_scope<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Scope) -> R,
    {
        let mut stack = self.stack();
        if stack.is_empty() {
            stack.push(Scope::new());
        }
        let top = stack.len() - 1;
        f(&mut stack[top])
    }

    /// Number of scopes on the stack (1 when no scope is pushed).
    pub fn scope_depth(&self) -> usize {
        self.stack().len()
    }

    /// Snapshot of the current scope.
    pub fn current_scope(&self) -> Scope {
        self.stack().last().cloned().unwrap_or_default()
    }

    pub fn add_breadcrumb(&self, breadcrumb: Breadcrumb) {
        if self.client().is_none() {
            return;
        }
        self.configure_scope(|scope| scope.add_breadcrumb(breadcrumb));
    }

    /// Capture an event through the bound client and current scope.
    ///
    /// The scope is copied out before processors run so that processors may
    /// use the hub themselves.
    pub fn capture_event(&self, event: Event, hint: &Hint) -> Option<Uuid> {
        let client = self.client()?;
        let scope = self.current_scope();
        let id = client.capture_event(event, hint, Some(&scope));
        if let Some(id) = id {
            debug!(event_id = %id, scope = scope.name().unwrap_or("-"), "event captured");
            *self
                .last_event_id
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(id);
        }
        id
    }

    /// Capture an error with no particular mechanism.
    pub fn capture_error(&self, exc_info: &ExcInfo) -> Option<Uuid> {
        let client = self.client()?;
        let (event, hint) = event_from_exception(exc_info, client.options(), None);
        self.capture_event(event, &hint)
    }

    pub fn capture_message(&self, message: impl Into<String>, level: Level) -> Option<Uuid> {
        self.capture_event(Event::message(level, message), &Hint::default())
    }

    pub fn last_event_id(&self) -> Option<Uuid> {
        *self
            .last_event_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Flush the bound client. `true` when there is nothing left to deliver.
    pub fn flush(&self, timeout: Option<Duration>) -> bool {
        match self.client() {
            Some(client) => client.flush(timeout),
            None => true,
        }
    }

    // A panic inside `configure_scope` poisons the lock; the stack itself is
    // still consistent, so keep using it.
    fn stack(&self) -> MutexGuard<'_, Vec<Scope>> {
        self.stack.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(None, Scope::new())
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("bound", &self.client().is_some())
            .field("depth", &self.scope_depth())
            .finish()
    }
}

/// Restores the hub's scope stack when dropped, including during unwinding.
#[must_use = "the scope is popped as soon as the guard is dropped"]
pub struct ScopeGuard<'a> {
    hub: &'a Hub,
    depth: usize,
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        let mut stack = self.hub.stack();
        if stack.len() <= self.depth {
            warn!(depth = self.depth, len = stack.len(), "scope already popped");
            return;
        }
        if stack.len() > self.depth + 1 {
            warn!(depth = self.depth, len = stack.len(), "popping leaked inner scopes");
        }
        stack.truncate(self.depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ClientOptions;
    use crate::transport::InMemoryTransport;
    use jobwatch_core::JobError;
    use proptest::prelude::*;

    fn hub() -> (Hub, Arc<InMemoryTransport>) {
        let transport = InMemoryTransport::arc();
        let client = Arc::new(Client::new(ClientOptions::default(), transport.clone()));
        (Hub::with_client(client), transport)
    }

    #[test]
    fn pushed_scope_inherits_and_is_discarded() {
        let (hub, transport) = hub();
        hub.configure_scope(|s| s.set_tag("outer", "1"));

        {
            let _guard = hub.push_scope();
            hub.configure_scope(|s| s.set_tag("inner", "1"));
            hub.capture_message("inside", Level::Info);
        }
        hub.capture_message("outside", Level::Info);

        let events = transport.events();
        assert_eq!(events[0].tags.len(), 2);
        assert_eq!(events[1].tags.len(), 1);
        assert_eq!(hub.scope_depth(), 1);
    }

    #[test]
    fn guard_restores_stack_on_panic() {
        let (hub, _) = hub();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = hub.push_scope();
            hub.configure_scope(|s| s.set_name("doomed"));
            panic!("job blew up");
        }));

        assert!(result.is_err());
        assert_eq!(hub.scope_depth(), 1);
        assert_eq!(hub.current_scope().name(), None);
    }

    #[test]
    fn outer_guard_pops_leaked_inner_scopes() {
        let (hub, _) = hub();
        let outer = hub.push_scope();
        std::mem::forget(hub.push_scope());
        assert_eq!(hub.scope_depth(), 3);
        drop(outer);
        assert_eq!(hub.scope_depth(), 1);
    }

    #[test]
    fn no_client_means_no_capture() {
        let hub = Hub::default();
        assert!(hub.capture_message("nobody listens", Level::Error).is_none());
        hub.add_breadcrumb(Breadcrumb::new("test", "ignored"));
        assert_eq!(hub.current_scope().breadcrumbs().count(), 0);
        assert!(hub.flush(None));
    }

    #[test]
    fn bind_client_applies_breadcrumb_limit() {
        let hub = Hub::default();
        hub.bind_client(Some(Arc::new(Client::new(
            ClientOptions::default().with_max_breadcrumbs(2),
            InMemoryTransport::new(),
        ))));
        let _guard = hub.push_scope();

        for i in 0..3 {
            hub.add_breadcrumb(Breadcrumb::new("test", format!("crumb {i}")));
        }
        assert_eq!(hub.current_scope().breadcrumbs().count(), 2);

        hub.bind_client(None);
        assert!(hub.client().is_none());
        assert!(hub.capture_message("unbound", Level::Info).is_none());
    }

    #[test]
    fn capture_error_records_last_event_id() {
        let (hub, transport) = hub();
        let id = hub.capture_error(&ExcInfo::new(JobError::failed("x"))).unwrap();
        assert_eq!(hub.last_event_id(), Some(id));
        assert_eq!(transport.events()[0].exception[0].ty, "JobError");
    }

    #[test]
    fn forked_hub_is_isolated() {
        let (hub, transport) = hub();
        hub.configure_scope(|s| s.set_tag("shared", "yes"));
        let forked = Hub::new_from_top(&hub);
        forked.configure_scope(|s| s.set_tag("forked", "yes"));

        assert!(!hub.current_scope().tags().contains_key("forked"));
        forked.capture_message("from fork", Level::Info);
        assert_eq!(transport.events()[0].tags["shared"], "yes");
    }

    #[test]
    fn with_scope_applies_configuration_temporarily() {
        let (hub, transport) = hub();
        let out = hub.with_scope(
            |s| s.set_transaction(Some("batch".into())),
            || hub.capture_message("m", Level::Info),
        );
        assert!(out.is_some());
        assert_eq!(transport.events()[0].transaction.as_deref(), Some("batch"));
        assert_eq!(hub.scope_depth(), 1);
    }

    proptest! {
        #[test]
        fn nested_guards_always_restore_depth(levels in 1usize..8, tags in proptest::collection::vec("[a-z]{1,6}", 0..8)) {
            let (hub, _) = hub();
            hub.configure_scope(|s| s.set_name("marker"));
            let before = hub.current_scope();

            let mut guards = Vec::new();
            for i in 0..levels {
                guards.push(hub.push_scope());
                let tag = tags.get(i).cloned().unwrap_or_default();
                hub.configure_scope(|s| {
                    s.set_name(format!("level-{i}"));
                    s.set_tag(tag, "x");
                });
            }
            while let Some(guard) = guards.pop() {
                drop(guard);
            }

            let after = hub.current_scope();
            prop_assert_eq!(hub.scope_depth(), 1);
            prop_assert_eq!(after.name(), before.name());
            prop_assert_eq!(after.tags(), before.tags());
        }
    }
}
