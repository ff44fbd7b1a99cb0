//! `jobwatch-worker` — a small background job queue and worker.
//!
//! ## Design
//!
//! - Jobs carry a serialized call (`func`, `args`, `kwargs`) decoded on demand
//! - Queues are in-memory FIFOs with finished/failed registries
//! - Workers run jobs in-process or on a per-job horse thread
//! - Timeouts raise [`JobTimeout`]; panics are caught and fail the job
//! - Cross-cutting behaviour (reporting, metrics) plugs in as [`JobMiddleware`]
//!
//! ## Components
//!
//! - `Job`: call data plus execution state
//! - `Queue`: FIFO of jobs, with failed-job requeueing
//! - `FunctionRegistry`: job function lookup (exact, category, wildcard)
//! - `Worker`: runs jobs through the middleware chain and exception handlers

pub mod job;
pub mod middleware;
pub mod queue;
pub mod registry;
pub mod timeouts;
pub mod worker;

pub use job::{Job, JobCall, JobState, JobStatus};
pub use middleware::{JobMiddleware, Next};
pub use queue::{Queue, QueueError, QueueStats};
pub use registry::{FunctionRegistry, JobFunction};
pub use timeouts::JobTimeout;
pub use worker::{
    DEFAULT_JOB_TIMEOUT, ExceptionHandler, ExecutionMode, Worker, WorkerBuilder, WorkerConfig,
    WorkerHandle, WorkerStats,
};
