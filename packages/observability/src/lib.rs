//! # Observability
//!
//! Tracing setup shared by StoryFlow services.
//!
//! Libraries in this workspace only emit `tracing` events. The host calls
//! [`init`] or [`init_with_config`] once at startup, which installs:
//!
//! - a JSONL layer appending one object per line to
//!   `~/.storyflow/logs/dev.jsonl` (or [`LogConfig::log_path`]),
//! - an optional compact stderr layer for foreground runs.
//!
//! `RUST_LOG` takes precedence over [`LogConfig::default_level`].
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "dashboard".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! tracing::info!(project_id = %id, "task sync starting");
//! ```

mod json_layer;
mod writer;

use std::io;
use std::path::PathBuf;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use json_layer::{JsonLayer, LogEntry};
pub use writer::{CentralLogWriter, WriterFactory};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, written into every log line.
    pub service_name: String,

    /// Default filter directive (e.g. "info", "task_progress_sync=debug").
    /// Overridden by `RUST_LOG` when set.
    pub default_level: String,

    /// Custom log file path. Defaults to `~/.storyflow/logs/dev.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit human-readable logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Default central log file, `~/.storyflow/logs/dev.jsonl`.
///
/// Falls back to the system temp directory when no home directory exists.
pub fn default_log_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".storyflow")
        .join("logs")
        .join("dev.jsonl")
}

/// Initialize logging for `service_name` with default settings.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize logging with a custom configuration.
///
/// Calling this more than once is harmless: later calls leave the first
/// subscriber in place. When the log file cannot be opened the JSONL layer
/// is skipped and stderr output is forced on.
pub fn init_with_config(config: LogConfig) {
    let log_path = config.log_path.clone().unwrap_or_else(default_log_path);

    let (json_layer, file_error) = match CentralLogWriter::new(&log_path) {
        Ok(writer) => (
            Some(JsonLayer::new(
                config.service_name.clone(),
                WriterFactory::new(writer),
            )),
            None,
        ),
        Err(e) => (None, Some(e)),
    };

    let stderr_layer = (config.also_stderr || file_error.is_some()).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(io::stderr)
    });

    let result = tracing_subscriber::registry()
        .with(json_layer.map(|l| l.with_filter(env_filter(&config.default_level))))
        .with(stderr_layer.map(|l| l.with_filter(env_filter(&config.default_level))))
        .try_init();

    if result.is_err() {
        return;
    }

    match file_error {
        None => tracing::info!(
            service = %config.service_name,
            log_path = %log_path.display(),
            "observability initialized"
        ),
        Some(e) => tracing::warn!(
            service = %config.service_name,
            log_path = %log_path.display(),
            error = %e,
            "log file unavailable, logging to stderr only"
        ),
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Re-export tracing macros so services can use `observability::info!()`.
pub use tracing::{debug, error, info, instrument, trace, warn, Level};
