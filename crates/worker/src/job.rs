//! Jobs: one queued function call plus its execution state.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use jobwatch_core::{ExcInfo, JobError, JobId, JobResult, TenantId, UserId};

/// Decoded call data: which function to run and with what.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCall {
    pub func: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl JobCall {
    /// `func(arg1, arg2, key=value)`; strings are rendered without quotes.
    pub fn call_string(&self) -> String {
        let args = self.args.iter().map(render_value);
        let kwargs = self
            .kwargs
            .iter()
            .map(|(k, v)| format!("{k}={}", render_value(v)));
        let params: Vec<String> = args.chain(kwargs).collect();
        format!("{}({})", self.func, params.join(", "))
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Job execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, not yet on a queue
    Created,
    /// Waiting on a queue
    Queued,
    /// Picked up by a worker
    Started,
    /// Returned successfully
    Finished,
    /// Raised, timed out or could not be run
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }
}

/// Mutable execution state of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobState {
    pub status: JobStatus,
    pub enqueued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Name of the worker that last picked the job up.
    pub worker_name: Option<String>,
    pub result: Option<Value>,
    /// `Type: message` of the last failure.
    pub exc_info: Option<String>,
}

impl Default for JobState {
    fn default() -> Self {
        Self {
            status: JobStatus::Created,
            enqueued_at: None,
            started_at: None,
            ended_at: None,
            worker_name: None,
            result: None,
            exc_info: None,
        }
    }
}

/// A background job.
///
/// The call is kept in serialized form and decoded on access, so a job whose
/// data is corrupt can still be queued, inspected and failed cleanly.
/// Workers share jobs as `Arc<Job>`; the state behind the mutex is the only
/// part that changes after enqueueing.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    origin: Option<String>,
    data: Value,
    description: Option<String>,
    timeout: Option<Duration>,
    user_id: Option<UserId>,
    tenant_id: Option<TenantId>,
    created_at: DateTime<Utc>,
    state: Mutex<JobState>,
}

impl Job {
    /// Create a job calling `func` with the given arguments.
    pub fn new(func: impl Into<String>, args: Vec<Value>, kwargs: Map<String, Value>) -> Self {
        let call = JobCall {
            func: func.into(),
            args,
            kwargs,
        };
        let description = call.call_string();
        let data = serde_json::to_value(&call).unwrap_or(Value::Null);
        let mut job = Self::from_raw(JobId::new(), data);
        job.description = Some(description);
        job
    }

    /// Wrap already-serialized call data (e.g. read back from a broker).
    pub fn from_raw(id: JobId, data: Value) -> Self {
        Self {
            id,
            origin: None,
            data,
            description: None,
            timeout: None,
            user_id: None,
            tenant_id: None,
            created_at: Utc::now(),
            state: Mutex::new(JobState::default()),
        }
    }

    pub fn with_id(mut self, id: impl Into<JobId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn with_origin(mut self, queue: impl Into<String>) -> Self {
        self.origin = Some(queue.into());
        self
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Name of the queue the job was enqueued on.
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn func_name(&self) -> JobResult<String> {
        self.field::<String>("func")?
            .ok_or_else(|| JobError::deserialization(format!("job {}: missing func", self.id)))
    }

    pub fn args(&self) -> JobResult<Vec<Value>> {
        Ok(self.field("args")?.unwrap_or_default())
    }

    pub fn kwargs(&self) -> JobResult<Map<String, Value>> {
        Ok(self.field("kwargs")?.unwrap_or_default())
    }

    /// Decode the whole call.
    pub fn call(&self) -> JobResult<JobCall> {
        Ok(JobCall {
            func: self.func_name()?,
            args: self.args()?,
            kwargs: self.kwargs()?,
        })
    }

    /// Explicit description, or the call string.
    pub fn description(&self) -> JobResult<String> {
        match &self.description {
            Some(d) => Ok(d.clone()),
            None => self.call().map(|c| c.call_string()),
        }
    }

    fn field<T: DeserializeOwned>(&self, key: &str) -> JobResult<Option<T>> {
        match self.data.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(raw) => serde_json::from_value(raw.clone())
                .map(Some)
                .map_err(|e| JobError::deserialization(format!("job {}: {key}: {e}", self.id))),
        }
    }

    /// Snapshot of the execution state.
    pub fn state(&self) -> JobState {
        self.state.lock().unwrap().clone()
    }

    pub fn status(&self) -> JobStatus {
        self.state.lock().unwrap().status
    }

    pub(crate) fn set_origin(&mut self, queue: &str) {
        self.origin = Some(queue.to_string());
    }

    pub(crate) fn mark_queued(&self) {
        let mut state = self.state.lock().unwrap();
        state.status = JobStatus::Queued;
        state.enqueued_at = Some(Utc::now());
    }

    pub(crate) fn mark_started(&self, worker_name: &str) {
        let mut state = self.state.lock().unwrap();
        state.status = JobStatus::Started;
        state.started_at = Some(Utc::now());
        state.ended_at = None;
        state.worker_name = Some(worker_name.to_string());
    }

    pub(crate) fn mark_finished(&self, result: Value) {
        let mut state = self.state.lock().unwrap();
        state.status = JobStatus::Finished;
        state.ended_at = Some(Utc::now());
        state.result = Some(result);
        state.exc_info = None;
    }

    pub(crate) fn mark_failed(&self, exc_info: &ExcInfo) {
        let mut state = self.state.lock().unwrap();
        state.status = JobStatus::Failed;
        state.ended_at = Some(Utc::now());
        state.exc_info = Some(exc_info.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn send_email() -> Job {
        Job::new("send_email", vec![json!("a@example.com")], Map::new()).with_id("42")
    }

    #[test]
    fn new_job_exposes_its_call() {
        let job = send_email();

        assert_eq!(job.id().as_str(), "42");
        assert_eq!(job.func_name().unwrap(), "send_email");
        assert_eq!(job.args().unwrap(), vec![json!("a@example.com")]);
        assert!(job.kwargs().unwrap().is_empty());
        assert_eq!(job.description().unwrap(), "send_email(a@example.com)");
        assert_eq!(job.status(), JobStatus::Created);
    }

    #[test]
    fn call_string_renders_kwargs() {
        let mut kwargs = Map::new();
        kwargs.insert("retries".into(), json!(3));
        let call = JobCall {
            func: "resize".into(),
            args: vec![json!("img.png"), json!(640)],
            kwargs,
        };
        assert_eq!(call.call_string(), "resize(img.png, 640, retries=3)");
    }

    #[test]
    fn corrupt_fields_fail_independently() {
        let job = Job::from_raw(JobId::from("7"), json!({"func": "report", "args": "oops"}));

        assert_eq!(job.func_name().unwrap(), "report");
        assert!(matches!(job.args(), Err(JobError::Deserialization(_))));
        assert!(job.kwargs().unwrap().is_empty());
        assert!(job.call().is_err());
        assert!(job.description().is_err());
    }

    #[test]
    fn missing_func_is_an_error() {
        let job = Job::from_raw(JobId::from("8"), json!({}));
        let err = job.func_name().unwrap_err();
        assert!(err.to_string().contains("missing func"));
    }

    #[test]
    fn lifecycle_updates_state() {
        let job = send_email();
        job.mark_queued();
        job.mark_started("w1");
        assert_eq!(job.status(), JobStatus::Started);

        job.mark_finished(json!(true));
        let state = job.state();
        assert_eq!(state.status, JobStatus::Finished);
        assert!(state.status.is_terminal());
        assert_eq!(state.result, Some(json!(true)));
        assert_eq!(state.worker_name.as_deref(), Some("w1"));
    }

    #[test]
    fn failure_records_exception_text() {
        let job = send_email();
        job.mark_failed(&ExcInfo::new(JobError::failed("smtp down")));
        let state = job.state();
        assert_eq!(state.status, JobStatus::Failed);
        assert_eq!(state.exc_info.as_deref(), Some("JobError: job failed: smtp down"));
    }
}
