//! Logging initialization for hosts embedding the task sync client.
//!
//! Thin wrapper over the observability package: structured JSONL goes to
//! `~/.storyflow/logs/dev.jsonl`, with compact stderr output alongside.

use observability::LogConfig;

/// Initialize logging under the default "task-sync" service name.
///
/// `level` is the default filter; `RUST_LOG` overrides it.
///
/// ```ignore
/// init_logging("info");
/// tracing::info!("task sync host started");
/// ```
pub fn init_logging(level: &str) {
    init_logging_for_service("task-sync", level);
}

/// Initialize logging with a custom service name, so several StoryFlow
/// components can share the central log stream.
pub fn init_logging_for_service(service_name: &str, level: &str) {
    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: parse_level(level).as_str().to_ascii_lowercase(),
        also_stderr: true,
        ..Default::default()
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.trim().to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
