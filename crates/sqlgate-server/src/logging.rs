//! Structured logging for the sqlgate server
//!
//! Features:
//! - Structured JSON logging for production
//! - Human-readable console logging for development
//! - File rotation with daily log files
//! - Request ID tracking through spans

use tracing::Subscriber;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "sqlgate-server.log";

/// Third-party targets kept at `warn`
const QUIET_TARGETS: &[&str] = &["hyper", "tokio", "runtime", "tower", "h2", "reqwest"];

/// Log format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format for development
    Pretty,
    /// JSON format for production (structured logging)
    Json,
    /// Compact format for testing
    Compact,
}

impl LogFormat {
    /// Parse from environment variable
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    /// Log to stdout only
    Stdout,
    /// Log to file only
    File,
    /// Log to both stdout and file
    Both,
}

impl LogOutput {
    /// Parse from environment variable
    pub fn from_env() -> Self {
        match std::env::var("LOG_OUTPUT").as_deref() {
            Ok("file") => LogOutput::File,
            Ok("both") => LogOutput::Both,
            _ => LogOutput::Stdout,
        }
    }
}

/// Filter directives: `RUST_LOG` (or `info`), then crate and noise overrides
fn filter_directives() -> String {
    let base = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let mut directives = vec![base, "sqlgate_server=debug".to_string()];
    directives.extend(QUIET_TARGETS.iter().map(|target| format!("{target}=warn")));
    directives.join(",")
}

/// Daily-rolling, ANSI-free file layer in `LOG_DIR`
fn file_layer<S>() -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string());
    std::fs::create_dir_all(&log_dir).ok();
    let appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);

    fmt::layer().with_writer(appender).with_ansi(false).boxed()
}

/// Initialize the logging system
///
/// Environment variables:
/// - `RUST_LOG`: Log level (e.g., "debug", "info", "sqlgate_guard=debug")
/// - `LOG_FORMAT`: Output format ("pretty", "json", "compact")
/// - `LOG_OUTPUT`: Where to write logs ("stdout", "file", "both")
/// - `LOG_DIR`: Directory for log files (default: "./logs")
///
/// Examples:
/// ```bash
/// # Development: pretty console output at debug level
/// RUST_LOG=debug LOG_FORMAT=pretty cargo run
///
/// # Production: JSON to file with info level
/// RUST_LOG=info LOG_FORMAT=json LOG_OUTPUT=file LOG_DIR=/var/log/sqlgate cargo run
/// ```
pub fn init() {
    let format = LogFormat::from_env();
    let output = LogOutput::from_env();
    let env_filter = EnvFilter::new(filter_directives());

    let stdout_layer = match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_thread_ids(true)
            .with_target(true)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    match output {
        LogOutput::Stdout => registry.with(stdout_layer).init(),
        LogOutput::File => registry.with(file_layer()).init(),
        LogOutput::Both => registry.with(stdout_layer).with(file_layer()).init(),
    }

    tracing::info!(format = ?format, output = ?output, "Logging system initialized");
    tracing::debug!(
        rust_log = %std::env::var("RUST_LOG").unwrap_or_else(|_| "not set".to_string()),
        log_dir = %std::env::var("LOG_DIR").unwrap_or_else(|_| "not set".to_string()),
        "Logging environment"
    );
}

/// Helper macro for logging with structured fields
///
/// Usage:
/// ```ignore
/// log_event!(
///     level: tracing::Level::INFO,
///     event: "query_executed",
///     request_id: "abc123",
///     rows: 100
/// );
/// ```
#[macro_export]
macro_rules! log_event {
    (level: $level:expr, event: $event:expr $(, $key:ident: $value:expr)* $(,)?) => {
        tracing::event!(
            $level,
            event = $event
            $(, $key = ?$value)*
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_and_output_from_env() {
        std::env::set_var("LOG_FORMAT", "json");
        assert_eq!(LogFormat::from_env(), LogFormat::Json);
        std::env::set_var("LOG_FORMAT", "compact");
        assert_eq!(LogFormat::from_env(), LogFormat::Compact);
        std::env::set_var("LOG_FORMAT", "bogus");
        assert_eq!(LogFormat::from_env(), LogFormat::Pretty);
        std::env::remove_var("LOG_FORMAT");
        assert_eq!(LogFormat::from_env(), LogFormat::Pretty);

        std::env::set_var("LOG_OUTPUT", "both");
        assert_eq!(LogOutput::from_env(), LogOutput::Both);
        std::env::set_var("LOG_OUTPUT", "file");
        assert_eq!(LogOutput::from_env(), LogOutput::File);
        std::env::remove_var("LOG_OUTPUT");
        assert_eq!(LogOutput::from_env(), LogOutput::Stdout);
    }

    #[test]
    fn test_filter_directives_quiet_third_party() {
        let directives = filter_directives();
        assert!(directives.contains("sqlgate_server=debug"));
        assert!(directives.contains("hyper=warn"));
        assert!(directives.contains("h2=warn"));
    }
}
