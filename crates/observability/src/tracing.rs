//! Tracing/logging initialization.
//!
//! Worker processes log JSON lines by default; `RUST_LOG` always wins over the
//! configured default directive.

use tracing_subscriber::EnvFilter;

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
    /// Plain lines captured by the test harness.
    Test,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Directive used when `RUST_LOG` is unset or invalid.
    pub default_directive: String,
    pub format: LogFormat,
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_directive: "info".to_string(),
            format: LogFormat::Json,
            with_target: false,
        }
    }
}

impl LogConfig {
    /// Configuration suited to `cargo test`: debug output routed through the
    /// test writer.
    pub fn for_tests() -> Self {
        Self {
            default_directive: "debug".to_string(),
            format: LogFormat::Test,
            with_target: true,
        }
    }

    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.default_directive = directive.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Resolve the effective filter.
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.default_directive))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(config: &LogConfig) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.filter())
        .with_target(config.with_target);

    let _ = match config.format {
        LogFormat::Json => builder
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Test => builder.with_test_writer().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_a_no_op() {
        init(&LogConfig::for_tests());
        init(&LogConfig::default());
        ::tracing::info!("still logging");
    }

    #[test]
    fn builder_setters_apply() {
        let config = LogConfig::default()
            .with_directive("jobwatch=trace")
            .with_format(LogFormat::Pretty);
        assert_eq!(config.default_directive, "jobwatch=trace");
        assert_eq!(config.format, LogFormat::Pretty);
    }
}
