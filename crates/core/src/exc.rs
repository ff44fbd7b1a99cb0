//! Captured exception information.
//!
//! An [`ExcInfo`] is what a worker hands to its exception handlers when a job
//! fails, and what the reporting client turns into an event. It keeps the
//! original error alive (behind an `Arc`) so handlers can recognise specific
//! failure types with [`ExcInfo::is`] / [`ExcInfo::downcast_ref`].

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Type name used when the concrete error type is not known.
pub const OPAQUE_ERROR_TYPE: &str = "Error";

#[derive(Clone)]
pub struct ExcInfo {
    type_name: String,
    value: String,
    error: Arc<anyhow::Error>,
}

impl ExcInfo {
    /// Capture a typed error, recording its short type name.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        let type_name = short_type_name(std::any::type_name::<E>()).to_string();
        let value = error.to_string();
        Self {
            type_name,
            value,
            error: Arc::new(anyhow::Error::new(error)),
        }
    }

    /// Capture an opaque error returned by a job function.
    pub fn from_anyhow(error: anyhow::Error) -> Self {
        Self {
            type_name: OPAQUE_ERROR_TYPE.to_string(),
            value: error.to_string(),
            error: Arc::new(error),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn error(&self) -> &anyhow::Error {
        &self.error
    }

    /// Whether the captured error is (or wraps, via context) an `E`.
    pub fn is<E>(&self) -> bool
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.is::<E>()
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<E>()
    }

    /// The error followed by its sources, outermost first.
    pub fn chain(&self) -> impl Iterator<Item = &(dyn StdError + 'static)> {
        self.error.chain()
    }
}

impl fmt::Debug for ExcInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExcInfo")
            .field("type_name", &self.type_name)
            .field("value", &self.value)
            .finish()
    }
}

impl fmt::Display for ExcInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.value)
    }
}

/// `a::b::Foo<c::Bar>` -> `Foo`
pub fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JobError;

    #[derive(Debug, thiserror::Error)]
    #[error("outer")]
    struct Outer(#[source] JobError);

    #[test]
    fn typed_errors_record_short_type_name() {
        let exc = ExcInfo::new(JobError::failed("boom"));
        assert_eq!(exc.type_name(), "JobError");
        assert_eq!(exc.value(), "job failed: boom");
        assert!(exc.is::<JobError>());
    }

    #[test]
    fn opaque_errors_still_downcast() {
        let exc = ExcInfo::from_anyhow(anyhow::Error::new(JobError::panicked("x")));
        assert_eq!(exc.type_name(), OPAQUE_ERROR_TYPE);
        assert!(matches!(
            exc.downcast_ref::<JobError>(),
            Some(JobError::Panicked(_))
        ));
    }

    #[test]
    fn chain_walks_sources() {
        let exc = ExcInfo::new(Outer(JobError::failed("inner")));
        let messages: Vec<String> = exc.chain().map(|e| e.to_string()).collect();
        assert_eq!(messages, vec!["outer", "job failed: inner"]);
    }

    #[test]
    fn short_type_name_strips_paths_and_generics() {
        assert_eq!(short_type_name("a::b::Foo"), "Foo");
        assert_eq!(short_type_name("a::Foo<b::Bar>"), "Foo");
        assert_eq!(short_type_name("Plain"), "Plain");
    }
}
