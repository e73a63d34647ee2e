//! # Structured Logging Module
//!
//! Environment-aware structured logging for the background loops and the
//! review commands. Console output is always on; a JSON file is added when
//! `logging.directory` is configured.

use crate::config::LoggingConfig;
use chrono::Utc;
use std::fs;
use std::process;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Initialize structured logging once per process.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_structured_logging(config: &LoggingConfig, environment: &str) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let log_level = resolve_log_level(config, environment);

        let console_layer = if config.json {
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .json()
                .with_filter(EnvFilter::new(&log_level))
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(EnvFilter::new(&log_level))
                .boxed()
        };

        let mut guard = None;
        let mut log_file = None;
        let file_layer = config.directory.as_ref().and_then(|dir| {
            if let Err(e) = fs::create_dir_all(dir) {
                eprintln!("Failed to create log directory {}: {e}", dir.display());
                return None;
            }
            let filename = format!(
                "{}.{}.{}.log",
                environment,
                process::id(),
                Utc::now().format("%Y%m%d_%H%M%S")
            );
            log_file = Some(dir.join(&filename));
            let appender = tracing_appender::rolling::never(dir, filename);
            let (writer, file_guard) = tracing_appender::non_blocking(appender);
            guard = Some(file_guard);
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(EnvFilter::new(&log_level)),
            )
        });

        let subscriber = tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer);

        // Embedding applications may have installed their own subscriber already
        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            level = %log_level,
            log_file = ?log_file,
            "🔧 STRUCTURED LOGGING: Initialized"
        );

        guard
    });
}

fn resolve_log_level(config: &LoggingConfig, environment: &str) -> String {
    if let Ok(from_env) = std::env::var("RUST_LOG") {
        return from_env;
    }
    match environment {
        "test" => "debug".to_string(),
        _ => config.level.clone(),
    }
}

/// Log structured data for job lifecycle operations
pub fn log_job_operation(
    operation: &str,
    job_id: Option<i64>,
    run_id: Option<i64>,
    step_id: Option<i64>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        job_id = job_id,
        run_id = run_id,
        step_id = step_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 JOB_OPERATION"
    );
}

/// Log structured data for tree mutations (ingest, reject, winner, reconcile)
pub fn log_tree_operation(
    operation: &str,
    run_id: Option<i64>,
    candidate_id: Option<i64>,
    parent_id: Option<i64>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        run_id = run_id,
        candidate_id = candidate_id,
        parent_id = parent_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🌳 TREE_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_resolution() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig {
            level: "warn".to_string(),
            ..LoggingConfig::default()
        };
        assert_eq!(resolve_log_level(&config, "test"), "debug");
        assert_eq!(resolve_log_level(&config, "production"), "warn");
        assert_eq!(resolve_log_level(&config, "development"), "warn");
    }
}
