//! In-memory queues and their job registries.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use jobwatch_core::JobId;

use crate::job::Job;

/// Queue error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("job already queued: {0}")]
    AlreadyQueued(JobId),
    #[error("job not found: {0}")]
    NotFound(JobId),
}

/// Queue statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueueStats {
    pub queued: usize,
    pub finished: usize,
    pub failed: usize,
}

/// A named FIFO of jobs.
///
/// Finished jobs are only remembered by id so the queue does not keep them
/// alive; failed jobs are kept whole for inspection and requeueing.
#[derive(Debug)]
pub struct Queue {
    name: String,
    jobs: Mutex<VecDeque<Arc<Job>>>,
    finished: RwLock<Vec<JobId>>,
    failed: RwLock<HashMap<JobId, Arc<Job>>>,
}

impl Queue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            jobs: Mutex::new(VecDeque::new()),
            finished: RwLock::new(Vec::new()),
            failed: RwLock::new(HashMap::new()),
        }
    }

    pub fn arc(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(name))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Put a job at the back of the queue.
    pub fn enqueue(&self, job: Job) -> Result<Arc<Job>, QueueError> {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.iter().any(|j| j.id() == job.id()) {
            return Err(QueueError::AlreadyQueued(job.id().clone()));
        }

        let mut job = job;
        job.set_origin(&self.name);
        let job = Arc::new(job);
        job.mark_queued();
        jobs.push_back(job.clone());
        Ok(job)
    }

    /// Pop the oldest job, if any.
    pub fn dequeue(&self) -> Option<Arc<Job>> {
        self.jobs.lock().unwrap().pop_front()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn job_ids(&self) -> Vec<JobId> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .map(|j| j.id().clone())
            .collect()
    }

    pub(crate) fn record_finished(&self, job: &Job) {
        self.finished.write().unwrap().push(job.id().clone());
    }

    pub(crate) fn record_failed(&self, job: Arc<Job>) {
        self.failed.write().unwrap().insert(job.id().clone(), job);
    }

    pub fn finished_job_ids(&self) -> Vec<JobId> {
        self.finished.read().unwrap().clone()
    }

    pub fn failed_jobs(&self) -> Vec<Arc<Job>> {
        let mut jobs: Vec<Arc<Job>> = self.failed.read().unwrap().values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at());
        jobs
    }

    /// Move a failed job back onto the queue.
    pub fn requeue(&self, job_id: &JobId) -> Result<Arc<Job>, QueueError> {
        let job = self
            .failed
            .write()
            .unwrap()
            .remove(job_id)
            .ok_or_else(|| QueueError::NotFound(job_id.clone()))?;

        job.mark_queued();
        self.jobs.lock().unwrap().push_back(job.clone());
        Ok(job)
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queued: self.len(),
            finished: self.finished.read().unwrap().len(),
            failed: self.failed.read().unwrap().len(),
        }
    }

    /// Drop every queued job. Registries are left alone.
    pub fn empty(&self) -> usize {
        let mut jobs = self.jobs.lock().unwrap();
        let n = jobs.len();
        jobs.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;
    use serde_json::Map;

    fn job(id: &str) -> Job {
        Job::new("noop", Vec::new(), Map::new()).with_id(id)
    }

    #[test]
    fn fifo_order_and_origin() {
        let queue = Queue::new("default");
        queue.enqueue(job("1")).unwrap();
        queue.enqueue(job("2")).unwrap();

        let first = queue.dequeue().unwrap();
        assert_eq!(first.id().as_str(), "1");
        assert_eq!(first.origin(), Some("default"));
        assert_eq!(first.status(), JobStatus::Queued);
        assert_eq!(queue.job_ids(), vec![JobId::from("2")]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let queue = Queue::new("default");
        queue.enqueue(job("1")).unwrap();
        assert_eq!(
            queue.enqueue(job("1")).unwrap_err(),
            QueueError::AlreadyQueued(JobId::from("1"))
        );
    }

    #[test]
    fn failed_jobs_can_be_requeued() {
        let queue = Queue::new("default");
        let queued = queue.enqueue(job("1")).unwrap();
        let claimed = queue.dequeue().unwrap();
        drop(queued);
        queue.record_failed(claimed);

        assert_eq!(queue.stats().failed, 1);
        let requeued = queue.requeue(&JobId::from("1")).unwrap();
        assert_eq!(requeued.status(), JobStatus::Queued);
        assert_eq!(queue.stats(), QueueStats { queued: 1, finished: 0, failed: 0 });
        assert!(matches!(queue.requeue(&JobId::from("1")), Err(QueueError::NotFound(_))));
    }

    #[test]
    fn finished_registry_keeps_ids_only() {
        let queue = Queue::new("default");
        let job = queue.enqueue(job("1")).unwrap();
        let _ = queue.dequeue();
        queue.record_finished(&job);

        let weak = Arc::downgrade(&job);
        drop(job);
        assert!(weak.upgrade().is_none());
        assert_eq!(queue.finished_job_ids(), vec![JobId::from("1")]);
    }

    #[test]
    fn empty_clears_queue() {
        let queue = Queue::new("default");
        queue.enqueue(job("1")).unwrap();
        queue.enqueue(job("2")).unwrap();
        assert_eq!(queue.empty(), 2);
        assert!(queue.is_empty());
    }
}
