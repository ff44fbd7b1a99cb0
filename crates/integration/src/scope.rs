//! Per-job reporting scope.

use std::sync::Arc;

use jobwatch_reporting::{Hub, ScopeGuard, User};
use jobwatch_worker::{Job, Worker};

use crate::processor::make_event_processor;
use crate::rq::IDENTIFIER;

/// Push a scope for one execution of `job`.
///
/// The scope starts with no breadcrumbs (a job must not inherit the trail of
/// unrelated earlier work), reports the job's own user or none at all, and
/// enriches events through a weak reference to the job. Dropping the guard
/// restores the previous scope.
pub fn open_job_scope<'h>(hub: &'h Hub, worker: &Worker, job: &Arc<Job>) -> ScopeGuard<'h> {
    let guard = hub.push_scope();
    let weak = Arc::downgrade(job);

    hub.configure_scope(|scope| {
        scope.set_name(IDENTIFIER);
        scope.clear_breadcrumbs();
        scope.set_user(job.user_id().map(|id| User::with_id(id.to_string())));
        scope.set_tag("rq.worker", worker.name());
        if let Some(queue) = job.origin() {
            scope.set_tag("rq.queue", queue);
        }
        if let Some(tenant) = job.tenant_id() {
            scope.set_tag("tenant_id", tenant.to_string());
        }
        scope.add_event_processor(make_event_processor(weak));
    });

    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobwatch_core::UserId;
    use jobwatch_reporting::Breadcrumb;
    use serde_json::Map;

    fn worker() -> Worker {
        Worker::builder("w1").build()
    }

    #[test]
    fn scope_is_named_and_starts_clean() {
        let hub = Hub::default();
        hub.configure_scope(|s| {
            s.add_breadcrumb(Breadcrumb::new("previous", "unrelated work"));
            s.set_user(Some(User::with_id("someone-else")));
        });
        let job = Arc::new(Job::new("noop", Vec::new(), Map::new()).with_origin("default"));

        {
            let _guard = open_job_scope(&hub, &worker(), &job);
            let scope = hub.current_scope();
            assert_eq!(scope.name(), Some("rq"));
            assert_eq!(scope.breadcrumbs().count(), 0);
            assert!(scope.user().is_none());
            assert_eq!(scope.tags()["rq.queue"], "default");
            assert_eq!(scope.tags()["rq.worker"], "w1");
            assert_eq!(scope.event_processor_count(), 1);
        }

        let restored = hub.current_scope();
        assert_eq!(restored.name(), None);
        assert_eq!(restored.breadcrumbs().count(), 1);
        assert_eq!(restored.event_processor_count(), 0);
    }

    #[test]
    fn user_comes_from_the_job() {
        let hub = Hub::default();
        let user = UserId::new();
        let job = Arc::new(Job::new("noop", Vec::new(), Map::new()).with_user(user));

        let _guard = open_job_scope(&hub, &worker(), &job);
        assert_eq!(hub.current_scope().user(), Some(&User::with_id(user.to_string())));
    }

    #[test]
    fn scope_holds_only_a_weak_reference() {
        let hub = Hub::default();
        let job = Arc::new(Job::new("noop", Vec::new(), Map::new()));
        let _guard = open_job_scope(&hub, &worker(), &job);
        assert_eq!(Arc::strong_count(&job), 1);
    }
}
