//! Client configuration.

use std::time::Duration;

use tracing::warn;

use crate::error::ReportingError;
use crate::integration::{Integration, IntegrationEntry};
use crate::scope::DEFAULT_MAX_BREADCRUMBS;

/// Default bound on `flush` when the caller passes no timeout.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Default number of chained causes kept per exception.
pub const DEFAULT_MAX_EXCEPTION_CHAIN: usize = 10;

/// Reporting client configuration.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub environment: Option<String>,
    pub release: Option<String>,
    pub server_name: Option<String>,
    /// Breadcrumbs kept per scope.
    pub max_breadcrumbs: usize,
    /// Upper bound for a synchronous flush.
    pub shutdown_timeout: Duration,
    /// Causes kept when turning an error chain into an event.
    pub max_exception_chain: usize,
    pub(crate) integrations: Vec<IntegrationEntry>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            environment: None,
            release: None,
            server_name: None,
            max_breadcrumbs: DEFAULT_MAX_BREADCRUMBS,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            max_exception_chain: DEFAULT_MAX_EXCEPTION_CHAIN,
            integrations: Vec::new(),
        }
    }
}

impl ClientOptions {
    /// Defaults overridden by `JOBWATCH_*` environment variables.
    ///
    /// Malformed numeric values are logged and ignored.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        options.environment = std::env::var("JOBWATCH_ENVIRONMENT").ok();
        options.release = std::env::var("JOBWATCH_RELEASE").ok();
        options.server_name = std::env::var("JOBWATCH_SERVER_NAME").ok();

        if let Ok(raw) = std::env::var("JOBWATCH_MAX_BREADCRUMBS") {
            match parse_number("JOBWATCH_MAX_BREADCRUMBS", &raw) {
                Ok(n) => options.max_breadcrumbs = n as usize,
                Err(e) => warn!(error = %e, "ignoring option"),
            }
        }
        if let Ok(raw) = std::env::var("JOBWATCH_SHUTDOWN_TIMEOUT_MS") {
            match parse_number("JOBWATCH_SHUTDOWN_TIMEOUT_MS", &raw) {
                Ok(ms) => options.shutdown_timeout = Duration::from_millis(ms),
                Err(e) => warn!(error = %e, "ignoring option"),
            }
        }

        options
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_release(mut self, release: impl Into<String>) -> Self {
        self.release = Some(release.into());
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_max_breadcrumbs(mut self, max: usize) -> Self {
        self.max_breadcrumbs = max;
        self
    }

    /// Register an integration. Registering the same type twice is a no-op.
    pub fn add_integration<I: Integration>(mut self, integration: I) -> Self {
        let entry = IntegrationEntry::new(integration);
        if self.integrations.iter().any(|e| e.type_id == entry.type_id) {
            warn!(integration = entry.integration.name(), "integration already registered");
            return self;
        }
        self.integrations.push(entry);
        self
    }

    pub fn integration_names(&self) -> Vec<&'static str> {
        self.integrations
            .iter()
            .map(|e| e.integration.name())
            .collect()
    }
}

fn parse_number(key: &'static str, raw: &str) -> Result<u64, ReportingError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| ReportingError::InvalidOption {
            key,
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy;

    impl Integration for Dummy {
        fn name(&self) -> &'static str {
            "dummy"
        }
    }

    #[test]
    fn duplicate_integrations_are_ignored() {
        let options = ClientOptions::default()
            .add_integration(Dummy)
            .add_integration(Dummy);
        assert_eq!(options.integration_names(), vec!["dummy"]);
    }

    // The only test in this crate touching `JOBWATCH_*` variables.
    #[test]
    fn from_env_reads_overrides_and_keeps_defaults_for_bad_values() {
        let vars = [
            ("JOBWATCH_RELEASE", "1.0"),
            ("JOBWATCH_MAX_BREADCRUMBS", "lots"),
            ("JOBWATCH_SHUTDOWN_TIMEOUT_MS", "250"),
        ];
        for (key, value) in vars {
            unsafe { std::env::set_var(key, value) };
        }

        let options = ClientOptions::from_env();

        for (key, _) in vars {
            unsafe { std::env::remove_var(key) };
        }
        assert_eq!(options.release.as_deref(), Some("1.0"));
        assert_eq!(options.max_breadcrumbs, DEFAULT_MAX_BREADCRUMBS);
        assert_eq!(options.shutdown_timeout, Duration::from_millis(250));
    }

    #[test]
    fn parse_number_reports_key() {
        let err = parse_number("JOBWATCH_MAX_BREADCRUMBS", "lots").unwrap_err();
        assert!(err.to_string().contains("JOBWATCH_MAX_BREADCRUMBS"));
        assert_eq!(parse_number("X", " 25 ").unwrap(), 25);
    }
}
