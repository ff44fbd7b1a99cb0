//! `jobwatch-reporting` — in-process error-reporting client.
//!
//! ## Components
//!
//! - `Event`: one captured error or message, enriched before delivery
//! - `Scope`: contextual data and processors applied to every event
//! - `Client`: fills defaults, applies a scope and hands events to a `Transport`
//! - `Hub`: explicit handle pairing a client with a stack of scopes
//! - `Integration`: marker registered on the client options; looked up by type
//!
//! There is no global hub. Callers create one and pass it where it is needed.

pub mod client;
pub mod error;
pub mod event;
pub mod exception;
pub mod hub;
pub mod integration;
pub mod options;
pub mod scope;
pub mod transport;

pub use client::Client;
pub use error::ReportingError;
pub use event::{Breadcrumb, Event, Exception, Hint, Level, Mechanism, User};
pub use exception::event_from_exception;
pub use hub::{Hub, ScopeGuard};
pub use integration::Integration;
pub use options::ClientOptions;
pub use scope::{ErrorProcessor, EventProcessor, Scope};
pub use transport::{InMemoryTransport, TracingTransport, Transport};
