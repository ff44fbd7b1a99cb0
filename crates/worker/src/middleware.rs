//! Worker middleware.
//!
//! Middleware is fixed when the worker is built. Each middleware wraps job
//! execution (`perform`) and observes failures (`on_exception`); the chain
//! runs outermost first, in registration order.

use std::sync::Arc;

use jobwatch_core::ExcInfo;

use crate::job::Job;
use crate::worker::Worker;

pub trait JobMiddleware: Send + Sync {
    /// Identifier used to keep a middleware from being installed twice.
    fn name(&self) -> &'static str;

    /// Wrap execution of `job`. Implementations must call `next.run` exactly
    /// once and should return its result unchanged.
    fn perform(&self, worker: &Worker, job: &Arc<Job>, next: Next<'_>) -> bool {
        next.run(worker, job)
    }

    /// Called when `job` failed, before the worker's exception handlers run.
    fn on_exception(&self, _worker: &Worker, _job: &Arc<Job>, _exc_info: &ExcInfo) {}
}

/// The remainder of the middleware chain.
pub struct Next<'a> {
    chain: &'a [Arc<dyn JobMiddleware>],
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn JobMiddleware>]) -> Self {
        Self { chain }
    }

    /// Run the rest of the chain and, at its end, the job itself.
    pub fn run(self, worker: &Worker, job: &Arc<Job>) -> bool {
        match self.chain.split_first() {
            Some((head, rest)) => head.perform(worker, job, Next::new(rest)),
            None => worker.run_job_inner(job),
        }
    }
}
