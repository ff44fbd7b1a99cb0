//! Job-side error model.

use thiserror::Error;

/// Result type used when touching job data.
pub type JobResult<T> = Result<T, JobError>;

/// Errors raised while decoding or running a job.
///
/// Timeouts are not part of this enum; the worker raises its own `JobTimeout` so
/// that reporters can recognise them by type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Stored call data could not be decoded (missing or malformed field).
    #[error("could not decode job data: {0}")]
    Deserialization(String),

    /// No function is registered under the job's function name.
    #[error("no such job function: {0}")]
    NoSuchFunction(String),

    /// The job function panicked.
    #[error("job panicked: {0}")]
    Panicked(String),

    /// The job function returned an error.
    #[error("job failed: {0}")]
    Failed(String),
}

impl JobError {
    pub fn deserialization(msg: impl Into<String>) -> Self {
        Self::Deserialization(msg.into())
    }

    pub fn no_such_function(name: impl Into<String>) -> Self {
        Self::NoSuchFunction(name.into())
    }

    pub fn panicked(msg: impl Into<String>) -> Self {
        Self::Panicked(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}
