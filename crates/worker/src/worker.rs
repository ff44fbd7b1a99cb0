//! Worker: pulls jobs off queues and runs them.

use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use jobwatch_core::{ExcInfo, JobError};

use crate::job::Job;
use crate::middleware::{JobMiddleware, Next};
use crate::queue::Queue;
use crate::registry::FunctionRegistry;
use crate::timeouts::call_with_timeout;

/// Default job timeout, applied when a job sets none.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(180);

/// Exception handler. Returns `true` to fall through to the next handler.
pub type ExceptionHandler = Arc<dyn Fn(&Job, &ExcInfo) -> bool + Send + Sync>;

/// Where a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// On the worker's own thread.
    #[default]
    InProcess,
    /// On a dedicated horse thread per job, which ends right after the job.
    Horse,
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Name for logging
    pub name: String,
    /// How often to poll empty queues
    pub poll_interval: Duration,
    pub mode: ExecutionMode,
    /// Timeout for jobs that set none; `None` runs them unbounded
    pub default_timeout: Option<Duration>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "worker".to_string(),
            poll_interval: Duration::from_millis(100),
            mode: ExecutionMode::InProcess,
            default_timeout: Some(DEFAULT_JOB_TIMEOUT),
        }
    }
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct WorkerStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub uptime_secs: u64,
}

/// Builds a [`Worker`]. The middleware list is final once built.
pub struct WorkerBuilder {
    config: WorkerConfig,
    queues: Vec<Arc<Queue>>,
    functions: FunctionRegistry,
    middleware: Vec<Arc<dyn JobMiddleware>>,
    exception_handlers: Vec<ExceptionHandler>,
}

impl WorkerBuilder {
    pub fn config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn queue(mut self, queue: Arc<Queue>) -> Self {
        self.queues.push(queue);
        self
    }

    pub fn function<F>(mut self, pattern: impl Into<String>, func: F) -> Self
    where
        F: Fn(&crate::job::JobCall) -> anyhow::Result<serde_json::Value> + Send + Sync + 'static,
    {
        self.functions.register(pattern, func);
        self
    }

    pub fn functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.default_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn middleware<M: JobMiddleware + 'static>(self, middleware: M) -> Self {
        self.middleware_arc(Arc::new(middleware))
    }

    /// Append a middleware. A middleware whose name is already installed is
    /// skipped, so installing twice never wraps twice.
    pub fn middleware_arc(mut self, middleware: Arc<dyn JobMiddleware>) -> Self {
        let name = middleware.name();
        if self.middleware.iter().any(|m| m.name() == name) {
            warn!(worker = %self.config.name, middleware = name, "middleware already installed");
            return self;
        }
        self.middleware.push(middleware);
        self
    }

    /// Push an exception handler. Handlers run newest first.
    pub fn exception_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Job, &ExcInfo) -> bool + Send + Sync + 'static,
    {
        self.exception_handlers.push(Arc::new(handler));
        self
    }

    pub fn build(self) -> Worker {
        Worker {
            config: self.config,
            queues: self.queues,
            functions: Arc::new(self.functions),
            middleware: self.middleware,
            exception_handlers: self.exception_handlers,
            horse: false,
        }
    }
}

/// Background job worker.
#[derive(Clone)]
pub struct Worker {
    config: WorkerConfig,
    queues: Vec<Arc<Queue>>,
    functions: Arc<FunctionRegistry>,
    middleware: Vec<Arc<dyn JobMiddleware>>,
    exception_handlers: Vec<ExceptionHandler>,
    horse: bool,
}

impl Worker {
    pub fn builder(name: impl Into<String>) -> WorkerBuilder {
        WorkerBuilder {
            config: WorkerConfig {
                name: name.into(),
                ..Default::default()
            },
            queues: Vec::new(),
            functions: FunctionRegistry::new(),
            middleware: Vec::new(),
            exception_handlers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn queues(&self) -> &[Arc<Queue>] {
        &self.queues
    }

    /// Whether this is a horse: a per-job worker that ends right after the
    /// job and must not leave anything buffered behind.
    pub fn is_horse(&self) -> bool {
        self.horse
    }

    pub fn middleware_names(&self) -> Vec<&'static str> {
        self.middleware.iter().map(|m| m.name()).collect()
    }

    /// Run `job` through the middleware chain. Returns whether it succeeded.
    pub fn perform_job(&self, job: &Arc<Job>) -> bool {
        Next::new(&self.middleware).run(self, job)
    }

    /// Report a failed job: middleware hooks first, then the exception
    /// handlers, newest first, until one returns `false`.
    pub fn handle_exception(&self, job: &Arc<Job>, exc_info: &ExcInfo) {
        for middleware in &self.middleware {
            middleware.on_exception(self, job, exc_info);
        }

        for handler in self.exception_handlers.iter().rev() {
            if !handler(job.as_ref(), exc_info) {
                debug!(worker = %self.config.name, job_id = %job.id(), "exception handler stopped fall-through");
                return;
            }
        }

        warn!(
            worker = %self.config.name,
            job_id = %job.id(),
            exc_type = exc_info.type_name(),
            error = exc_info.value(),
            "job failed"
        );
    }

    /// End of the middleware chain: actually run the job.
    pub(crate) fn run_job_inner(&self, job: &Arc<Job>) -> bool {
        job.mark_started(&self.config.name);
        debug!(worker = %self.config.name, job_id = %job.id(), horse = self.horse, "job started");

        match self.call_job(job) {
            Ok(value) => {
                job.mark_finished(value);
                if let Some(queue) = self.origin_queue(job) {
                    queue.record_finished(job);
                }
                info!(worker = %self.config.name, job_id = %job.id(), "job finished");
                true
            }
            Err(exc_info) => {
                job.mark_failed(&exc_info);
                self.handle_exception(job, &exc_info);
                if let Some(queue) = self.origin_queue(job) {
                    queue.record_failed(job.clone());
                }
                false
            }
        }
    }

    fn call_job(&self, job: &Job) -> Result<serde_json::Value, ExcInfo> {
        let call = job.call().map_err(ExcInfo::new)?;
        let func = self
            .functions
            .get(&call.func)
            .ok_or_else(|| ExcInfo::new(JobError::no_such_function(&call.func)))?;
        let timeout = job.timeout().or(self.config.default_timeout);
        call_with_timeout(func, call, timeout)
    }

    fn origin_queue(&self, job: &Job) -> Option<&Arc<Queue>> {
        let origin = job.origin()?;
        self.queues.iter().find(|q| q.name() == origin)
    }

    fn horse_view(&self) -> Worker {
        let mut horse = self.clone();
        horse.horse = true;
        horse
    }

    /// Execute a dequeued job according to the configured mode.
    pub fn execute_job(&self, job: Arc<Job>) -> bool {
        match self.config.mode {
            ExecutionMode::InProcess => self.perform_job(&job),
            ExecutionMode::Horse => self.fork_work_horse(job),
        }
    }

    fn fork_work_horse(&self, job: Arc<Job>) -> bool {
        let horse = self.horse_view();
        let horse_job = job.clone();
        let spawned = thread::Builder::new()
            .name(format!("{}-horse", self.config.name))
            .spawn(move || horse.perform_job(&horse_job));

        let outcome = match spawned {
            Ok(handle) => handle.join(),
            Err(e) => {
                error!(worker = %self.config.name, error = %e, "failed to spawn horse");
                self.fail_unperformed(&job, ExcInfo::from_anyhow(anyhow::Error::new(e)));
                return false;
            }
        };

        match outcome {
            Ok(succeeded) => succeeded,
            Err(_) => {
                error!(worker = %self.config.name, job_id = %job.id(), "horse died unexpectedly");
                self.fail_unperformed(&job, ExcInfo::new(JobError::panicked("work horse died")));
                false
            }
        }
    }

    fn fail_unperformed(&self, job: &Arc<Job>, exc_info: ExcInfo) {
        job.mark_failed(&exc_info);
        if let Some(queue) = self.origin_queue(job) {
            queue.record_failed(job.clone());
        }
    }

    fn dequeue(&self) -> Option<Arc<Job>> {
        self.queues.iter().find_map(|q| q.dequeue())
    }

    /// Process jobs until the queues are empty. Returns the run's statistics.
    pub fn work_burst(&self) -> WorkerStats {
        let stats = Mutex::new(WorkerStats::default());
        self.work_loop(true, None, &stats);
        stats.into_inner().unwrap()
    }

    /// Run the worker on its own thread until shut down.
    pub fn spawn(self) -> std::io::Result<WorkerHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let stats_clone = stats.clone();

        let join = thread::Builder::new()
            .name(self.config.name.clone())
            .spawn(move || {
                self.work_loop(false, Some(&shutdown_rx), &stats_clone);
            })?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }

    fn work_loop(&self, burst: bool, shutdown_rx: Option<&mpsc::Receiver<()>>, stats: &Mutex<WorkerStats>) {
        info!(worker = %self.config.name, burst, mode = ?self.config.mode, "worker started");
        let start_time = Instant::now();

        loop {
            if let Some(rx) = shutdown_rx {
                if rx.try_recv().is_ok() {
                    break;
                }
            }

            stats.lock().unwrap().uptime_secs = start_time.elapsed().as_secs();

            match self.dequeue() {
                Some(job) => {
                    debug!(worker = %self.config.name, job_id = %job.id(), "claimed job");
                    let succeeded = self.execute_job(job);

                    let mut s = stats.lock().unwrap();
                    s.jobs_processed += 1;
                    if succeeded {
                        s.jobs_succeeded += 1;
                    } else {
                        s.jobs_failed += 1;
                    }
                }
                None if burst => break,
                None => thread::sleep(self.config.poll_interval),
            }
        }

        info!(worker = %self.config.name, "worker stopped");
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("config", &self.config)
            .field("queues", &self.queues.iter().map(|q| q.name()).collect::<Vec<_>>())
            .field("middleware", &self.middleware_names())
            .field("horse", &self.horse)
            .finish()
    }
}

/// Handle to control a running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the current job to finish.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    /// Get current worker statistics.
    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().unwrap().clone()
    }
}
