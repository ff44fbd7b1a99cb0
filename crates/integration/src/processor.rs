//! Event enrichment with job metadata.

use std::sync::Weak;

use serde_json::json;
use tracing::debug;

use jobwatch_core::JobResult;
use jobwatch_reporting::{Event, Hint};
use jobwatch_worker::{Job, JobTimeout};

use crate::rq::IDENTIFIER;

/// Key of the job metadata entry in `Event::extra`.
pub const JOB_EXTRA_KEY: &str = "rq-job";

/// Second component of the fingerprint shared by all timeouts of a function.
pub const TIMEOUT_FINGERPRINT_TYPE: &str = "JobTimeoutException";

/// Event processor bound to a job it does not keep alive.
pub fn make_event_processor(
    job: Weak<Job>,
) -> impl Fn(Event, &Hint) -> Option<Event> + Send + Sync + 'static {
    move |event, hint| Some(enrich(event, hint, &job))
}

/// Annotate `event` with the job's metadata.
///
/// Each step is independent: a field that cannot be decoded skips that step
/// only. If the job is gone the event is returned untouched.
pub fn enrich(mut event: Event, hint: &Hint, job: &Weak<Job>) -> Event {
    let Some(job) = job.upgrade() else {
        return event;
    };

    step(&job, "transaction", || {
        event.transaction = Some(job.func_name()?);
        Ok(())
    });

    step(&job, "extra", || {
        let entry = json!({
            "job_id": job.id().as_str(),
            "func": job.func_name()?,
            "args": job.args()?,
            "kwargs": job.kwargs()?,
            "description": job.description()?,
        });
        event.extra.insert(JOB_EXTRA_KEY.to_string(), entry);
        Ok(())
    });

    let timed_out = hint
        .exc_info
        .as_ref()
        .is_some_and(|exc| exc.is::<JobTimeout>());
    if timed_out {
        step(&job, "fingerprint", || {
            event.fingerprint = Some(vec![
                IDENTIFIER.to_string(),
                TIMEOUT_FINGERPRINT_TYPE.to_string(),
                job.func_name()?,
            ]);
            Ok(())
        });
    }

    event
}

fn step<F>(job: &Job, name: &'static str, f: F)
where
    F: FnOnce() -> JobResult<()>,
{
    if let Err(e) = f() {
        debug!(job_id = %job.id(), step = name, error = %e, "skipped event enrichment step");
    }
}
