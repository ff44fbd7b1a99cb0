//! `jobwatch-core` — primitives shared by the worker, the reporting client and the
//! integration that joins them.
//!
//! Nothing in here performs IO or logging.

pub mod error;
pub mod exc;
pub mod id;

pub use error::{JobError, JobResult};
pub use exc::ExcInfo;
pub use id::{JobId, TenantId, UserId};
