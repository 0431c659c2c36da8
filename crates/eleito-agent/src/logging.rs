//! Logging bootstrap for the agent
//!
//! Console output is always on, filtered through `RUST_LOG` with an
//! `info` default. Passing a log directory adds a daily-rolling
//! `eleito.log` file without ANSI escapes.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry, fmt};

/// Keeps the non-blocking file writer flushing until the process exits.
/// Must be held alive by main.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

pub fn init(log_dir: Option<&Path>) -> anyhow::Result<LoggingGuard> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = fmt::layer().with_target(true).with_filter(console_filter);
    layers.push(Box::new(console_layer));

    let mut file_guard = None;
    if let Some(log_dir) = log_dir {
        std::fs::create_dir_all(log_dir)?;
        let appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "eleito.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);

        let file_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .with_filter(file_filter);
        layers.push(Box::new(file_layer));
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
