//! Reporting middleware for `jobwatch-worker`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use tracing::debug;
use uuid::Uuid;

use jobwatch_core::ExcInfo;
use jobwatch_reporting::{Hub, Integration, Mechanism, event_from_exception};
use jobwatch_worker::{Job, JobMiddleware, Next, Worker, WorkerBuilder};

use crate::scope::open_job_scope;

/// Identifier of the integration: scope name, mechanism type and first
/// fingerprint component.
pub const IDENTIFIER: &str = "rq";

/// Marks a reporting client as wanting job reporting.
///
/// Without it registered on the client options the middleware passes jobs
/// straight through.
#[derive(Debug, Default, Clone, Copy)]
pub struct RqIntegration;

impl Integration for RqIntegration {
    fn name(&self) -> &'static str {
        IDENTIFIER
    }
}

/// Wraps job execution in a reporting scope and captures failures.
///
/// Every execution reports through its own hub, forked from the shared one
/// when the job starts. Workers sharing a hub therefore never see (or pop)
/// each other's job scopes.
#[derive(Debug, Clone)]
pub struct ReportingMiddleware {
    hub: Arc<Hub>,
    executions: Arc<Mutex<HashMap<ThreadId, Arc<Hub>>>>,
}

impl ReportingMiddleware {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self {
            hub,
            executions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Hub of the execution running on this thread, or the shared hub.
    fn current_hub(&self) -> Arc<Hub> {
        lock(&self.executions)
            .get(&thread::current().id())
            .cloned()
            .unwrap_or_else(|| self.hub.clone())
    }

    fn enter(&self, hub: Arc<Hub>) -> Execution<'_> {
        let thread = thread::current().id();
        lock(&self.executions).insert(thread, hub);
        Execution {
            executions: &self.executions,
            thread,
        }
    }
}

impl JobMiddleware for ReportingMiddleware {
    fn name(&self) -> &'static str {
        IDENTIFIER
    }

    fn perform(&self, worker: &Worker, job: &Arc<Job>, next: Next<'_>) -> bool {
        if self.hub.get_integration::<RqIntegration>().is_none() {
            return next.run(worker, job);
        }
        let Some(client) = self.hub.client() else {
            return next.run(worker, job);
        };

        let job_hub = Arc::new(Hub::new_from_top(&self.hub));
        let rv = {
            let _execution = self.enter(job_hub.clone());
            let _scope = open_job_scope(&job_hub, worker, job);
            next.run(worker, job)
        };

        if worker.is_horse() {
            // The horse ends right after this job; deliver before it does.
            debug!(worker = worker.name(), job_id = %job.id(), "flushing from horse");
            client.flush(None);
        }

        rv
    }

    fn on_exception(&self, _worker: &Worker, _job: &Arc<Job>, exc_info: &ExcInfo) {
        capture_exception(&self.current_hub(), exc_info);
    }
}

/// Unregisters an execution's hub when dropped, including during unwinding.
struct Execution<'a> {
    executions: &'a Mutex<HashMap<ThreadId, Arc<Hub>>>,
    thread: ThreadId,
}

impl Drop for Execution<'_> {
    fn drop(&mut self) {
        lock(self.executions).remove(&self.thread);
    }
}

fn lock(
    executions: &Mutex<HashMap<ThreadId, Arc<Hub>>>,
) -> MutexGuard<'_, HashMap<ThreadId, Arc<Hub>>> {
    executions.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Capture `exc_info` as an unhandled job failure.
///
/// Does nothing unless [`RqIntegration`] is registered on the hub's client.
pub fn capture_exception(hub: &Hub, exc_info: &ExcInfo) -> Option<Uuid> {
    hub.get_integration::<RqIntegration>()?;
    let client = hub.client()?;

    let (event, hint) = event_from_exception(
        exc_info,
        client.options(),
        Some(Mechanism::unhandled(IDENTIFIER)),
    );
    hub.capture_event(event, &hint)
}

/// Builder shorthand for installing [`ReportingMiddleware`].
pub trait ReportingExt: Sized {
    fn with_reporting(self, hub: Arc<Hub>) -> Self;
}

impl ReportingExt for WorkerBuilder {
    fn with_reporting(self, hub: Arc<Hub>) -> Self {
        self.middleware(ReportingMiddleware::new(hub))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobwatch_core::JobError;
    use jobwatch_reporting::{Client, ClientOptions, InMemoryTransport};

    fn hub(with_integration: bool) -> (Arc<Hub>, Arc<InMemoryTransport>) {
        let transport = InMemoryTransport::arc();
        let mut options = ClientOptions::default();
        if with_integration {
            options = options.add_integration(RqIntegration);
        }
        let client = Arc::new(Client::new(options, transport.clone()));
        (Arc::new(Hub::with_client(client)), transport)
    }

    #[test]
    fn capture_marks_failure_unhandled() {
        let (hub, transport) = hub(true);
        assert!(capture_exception(&hub, &ExcInfo::new(JobError::failed("x"))).is_some());

        let events = transport.events();
        let outer = events[0].exception.last().unwrap();
        assert_eq!(outer.mechanism, Some(Mechanism::unhandled("rq")));
    }

    #[test]
    fn capture_needs_the_integration() {
        let (hub, transport) = hub(false);
        assert!(capture_exception(&hub, &ExcInfo::new(JobError::failed("x"))).is_none());
        assert!(transport.events().is_empty());
    }

    #[test]
    fn execution_hub_belongs_to_the_running_thread() {
        let (hub, _) = hub(true);
        let middleware = ReportingMiddleware::new(hub.clone());
        let job_hub = Arc::new(Hub::new_from_top(&hub));

        {
            let _execution = middleware.enter(job_hub.clone());
            assert!(Arc::ptr_eq(&middleware.current_hub(), &job_hub));

            let elsewhere = thread::scope(|s| s.spawn(|| middleware.current_hub()).join().unwrap());
            assert!(Arc::ptr_eq(&elsewhere, &hub));
        }

        assert!(Arc::ptr_eq(&middleware.current_hub(), &hub));
    }

    #[test]
    fn execution_is_unregistered_on_panic() {
        let (hub, _) = hub(true);
        let middleware = ReportingMiddleware::new(hub.clone());

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _execution = middleware.enter(Arc::new(Hub::new_from_top(&hub)));
            panic!("job blew up");
        }));

        assert!(result.is_err());
        assert!(Arc::ptr_eq(&middleware.current_hub(), &hub));
    }

    #[test]
    fn with_reporting_is_idempotent() {
        let (hub, _) = hub(true);
        let worker = Worker::builder("w")
            .with_reporting(hub.clone())
            .with_reporting(hub)
            .build();
        assert_eq!(worker.middleware_names(), vec!["rq"]);
    }
}
