//! Logging system configuration and initialization
//!
//! - Console and/or file output
//! - File rotation via `tracing-appender` ("daily", "hourly" or "never")
//! - Optional structured JSON output
//! - Verbose dependency targets clamped unless TRACE is requested

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

// Keeps the non-blocking file writer alive for the life of the process
static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
static INITIALIZED: AtomicBool = AtomicBool::new(false);

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Initialize logging with custom configuration.
///
/// `RUST_LOG` overrides the configured level when set:
/// ```bash
/// RUST_LOG="debug,sqlx::query=debug" xkcd-sync
/// ```
///
/// Calling this again after a successful call is a no-op; a failed call
/// leaves logging uninitialized so it can be retried.
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    if INITIALIZED.load(Ordering::SeqCst) {
        return Ok(());
    }

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_env_filter(&config.level)?,
    };

    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.file_output {
        let log_dir = PathBuf::from(&config.log_directory);
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

        let (file_writer, guard) = non_blocking(file_appender(&log_dir, &config.file_name, &config.rotation));
        let _ = LOG_GUARD.set(guard);

        let file_layer = if config.json_format {
            fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_timer(ChronoUtc::new(TIMESTAMP_FORMAT.to_string()))
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(file_writer)
                .with_timer(ChronoUtc::new(TIMESTAMP_FORMAT.to_string()))
                .with_target(false)
                .with_ansi(false)
                .boxed()
        };
        layers.push(file_layer);
    }

    if config.console_output {
        let console_layer = if config.json_format {
            fmt::layer()
                .json()
                .with_writer(std::io::stdout)
                .with_timer(ChronoUtc::new(TIMESTAMP_FORMAT.to_string()))
                .boxed()
        } else {
            fmt::layer()
                .with_writer(std::io::stdout)
                .with_timer(ChronoUtc::new(TIMESTAMP_FORMAT.to_string()))
                .with_target(false)
                .boxed()
        };
        layers.push(console_layer);
    }

    let installed = tracing_subscriber::registry().with(layers).with(env_filter).try_init();
    INITIALIZED.store(true, Ordering::SeqCst);
    if let Err(e) = installed {
        // Another subscriber (e.g. a test harness) won the race
        eprintln!("Logging already initialized: {e}");
        return Ok(());
    }

    info!(
        level = %config.level,
        json = config.json_format,
        file_output = config.file_output,
        "Logging initialized"
    );
    Ok(())
}

/// Base filter at `level` with noisy dependency targets clamped
fn build_env_filter(level: &str) -> Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(level).with_context(|| format!("Invalid log level '{level}'"))?;

    if !level.to_lowercase().contains("trace") {
        for directive in [
            "sqlx::query=warn",
            "sqlx::sqlite=warn",
            "sqlx::migrate=info",
            "reqwest=info",
            "hyper=warn",
            "hyper_util=warn",
            "h2=warn",
            "rustls=warn",
            "aws_config=warn",
            "aws_smithy_runtime=warn",
            "aws_sdk_s3=info",
            "tokio=info",
            "runtime=warn",
        ] {
            filter = filter.add_directive(directive.parse()?);
        }
        filter = filter.add_directive(format!("xkcd_sync_lib={level}").parse()?);
    }

    Ok(filter)
}

fn file_appender(log_dir: &Path, file_name: &str, rotation: &str) -> rolling::RollingFileAppender {
    match rotation.to_lowercase().as_str() {
        "never" => rolling::never(log_dir, file_name),
        "hourly" => rolling::hourly(log_dir, file_name),
        _ => rolling::daily(log_dir, file_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_builds_for_standard_levels() {
        for level in ["error", "warn", "info", "debug", "trace"] {
            assert!(build_env_filter(level).is_ok(), "level {level} should parse");
        }
    }

    #[test]
    fn filter_rejects_garbage_level() {
        assert!(build_env_filter("xkcd_sync_lib=verbose").is_err());
    }

    // Single test touching the process-wide subscriber
    #[test]
    fn failed_initialization_can_be_retried() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"occupied").unwrap();

        let unusable = LoggingConfig {
            console_output: false,
            file_output: true,
            log_directory: blocker.join("logs").to_string_lossy().into_owned(),
            ..LoggingConfig::default()
        };
        assert!(init_logging_with_config(&unusable).is_err());
        assert!(!INITIALIZED.load(Ordering::SeqCst));

        let usable = LoggingConfig {
            console_output: false,
            file_output: true,
            log_directory: dir.path().join("logs").to_string_lossy().into_owned(),
            ..LoggingConfig::default()
        };
        assert!(init_logging_with_config(&usable).is_ok());
        assert!(INITIALIZED.load(Ordering::SeqCst));

        // Repeated calls are a no-op, even with the unusable directory
        assert!(init_logging_with_config(&unusable).is_ok());
    }
}
