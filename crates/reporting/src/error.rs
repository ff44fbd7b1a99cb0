//! Reporting error model.

use thiserror::Error;

/// Errors surfaced by configuration and transports.
///
/// Capturing itself never fails; these only come out of setup paths.
#[derive(Debug, Error)]
pub enum ReportingError {
    #[error("invalid option {key}: {reason}")]
    InvalidOption { key: &'static str, reason: String },

    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
}
