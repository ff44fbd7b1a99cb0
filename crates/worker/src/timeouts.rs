//! Job timeouts and the guarded call that enforces them.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use jobwatch_core::{ExcInfo, JobError};

use crate::job::JobCall;
use crate::registry::JobFunction;

/// Raised when a job runs longer than its timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("job exceeded maximum timeout value ({} ms)", .timeout.as_millis())]
pub struct JobTimeout {
    pub timeout: Duration,
}

/// Run `func`, converting errors and panics into [`ExcInfo`].
///
/// With a timeout the call runs on its own thread. When the deadline passes
/// that thread is abandoned; its eventual result is discarded.
pub(crate) fn call_with_timeout(
    func: JobFunction,
    call: JobCall,
    timeout: Option<Duration>,
) -> Result<Value, ExcInfo> {
    let Some(limit) = timeout else {
        return invoke(&func, &call);
    };

    let (tx, rx) = mpsc::channel();
    let name = format!("job-{}", call.func);
    thread::Builder::new()
        .name(name)
        .spawn(move || {
            let _ = tx.send(invoke(&func, &call));
        })
        .map_err(|e| ExcInfo::from_anyhow(anyhow::Error::new(e).context("failed to spawn job thread")))?;

    match rx.recv_timeout(limit) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            warn!(timeout_ms = limit.as_millis() as u64, "job timed out; abandoning its thread");
            Err(ExcInfo::new(JobTimeout { timeout: limit }))
        }
        Err(RecvTimeoutError::Disconnected) => Err(ExcInfo::new(JobError::panicked(
            "job thread exited without a result",
        ))),
    }
}

fn invoke(func: &JobFunction, call: &JobCall) -> Result<Value, ExcInfo> {
    match catch_unwind(AssertUnwindSafe(|| func(call))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(ExcInfo::from_anyhow(error)),
        Err(payload) => Err(ExcInfo::new(JobError::panicked(panic_message(&*payload)))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};
    use std::sync::Arc;

    fn call(func: &str) -> JobCall {
        JobCall {
            func: func.to_string(),
            args: vec![json!(2)],
            kwargs: Map::new(),
        }
    }

    fn function<F>(f: F) -> JobFunction
    where
        F: Fn(&JobCall) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Arc::new(f)
    }

    #[test]
    fn returns_value_without_timeout() {
        let func = function(|c| Ok(json!(c.args[0].as_i64().unwrap() * 2)));
        assert_eq!(call_with_timeout(func, call("double"), None).unwrap(), json!(4));
    }

    #[test]
    fn returns_value_within_timeout() {
        let func = function(|_| Ok(json!("done")));
        let out = call_with_timeout(func, call("quick"), Some(Duration::from_secs(5))).unwrap();
        assert_eq!(out, json!("done"));
    }

    #[test]
    fn slow_jobs_raise_job_timeout() {
        let func = function(|_| {
            thread::sleep(Duration::from_millis(500));
            Ok(Value::Null)
        });
        let exc = call_with_timeout(func, call("slow"), Some(Duration::from_millis(20))).unwrap_err();
        assert!(exc.is::<JobTimeout>());
        assert_eq!(exc.type_name(), "JobTimeout");
    }

    #[test]
    fn panics_become_job_errors() {
        let func = function(|_| panic!("kaboom"));
        let exc = call_with_timeout(func, call("explode"), None).unwrap_err();
        assert_eq!(exc.downcast_ref::<JobError>(), Some(&JobError::panicked("kaboom")));
    }

    #[test]
    fn returned_errors_keep_their_type() {
        let func = function(|_| Err(JobError::failed("nope").into()));
        let exc = call_with_timeout(func, call("fail"), Some(Duration::from_secs(5))).unwrap_err();
        assert!(exc.is::<JobError>());
    }
}
