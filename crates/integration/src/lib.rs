//! `jobwatch-integration` — error reporting for `jobwatch-worker`.
//!
//! Register [`RqIntegration`] on the reporting client and add
//! [`ReportingMiddleware`] to the worker (or call
//! [`ReportingExt::with_reporting`] on the builder). Every job then runs
//! inside its own reporting scope, failures are captured as unhandled
//! events, and events are enriched with the job's metadata.
//!
//! ```ignore
//! let client = Client::new(
//!     ClientOptions::from_env().add_integration(RqIntegration),
//!     TracingTransport,
//! );
//! let hub = Arc::new(Hub::with_client(Arc::new(client)));
//! let worker = Worker::builder("mailer")
//!     .queue(queue)
//!     .function("send_email", send_email)
//!     .with_reporting(hub)
//!     .build();
//! ```

pub mod processor;
pub mod rq;
pub mod scope;

pub use processor::{JOB_EXTRA_KEY, TIMEOUT_FINGERPRINT_TYPE, enrich, make_event_processor};
pub use rq::{ReportingExt, ReportingMiddleware, RqIntegration, capture_exception};
pub use scope::open_job_scope;
