//! provides logging helpers

use std::env;
use std::path::Path;
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;

/// Environment variable holding an optional log file path.
pub const LOG_PATH_ENV_VAR: &str = "LOG_PATH";

const DEFAULT_LOG_PREFIX: &str = "network-injector.log";

/// Splits a log path into the rotation directory and the file name prefix.
///
/// A path pointing at an existing directory keeps the default prefix.
pub fn rotation_target(log_path: &Path) -> (PathBuf, String) {
    if log_path.is_dir() {
        return (log_path.to_path_buf(), DEFAULT_LOG_PREFIX.to_string());
    }

    let dir = log_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let prefix = log_path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(DEFAULT_LOG_PREFIX)
        .to_string();
    (dir, prefix)
}

/// initiate the global tracing subscriber
///
/// Logs always go to stderr. When `LOG_PATH` is set, a daily rotated copy is
/// written there as well; keep the returned guard alive to flush it.
pub fn init() -> Option<WorkerGuard> {
    let env_filter = || {
        filter::EnvFilter::builder()
            .with_default_directive(filter::LevelFilter::INFO.into())
            .from_env_lossy()
    };

    let stderr_layer = layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(env_filter());

    let Some(log_path) = env::var(LOG_PATH_ENV_VAR).ok().filter(|p| !p.is_empty()) else {
        registry().with(stderr_layer).init();
        return None;
    };

    let (dir, prefix) = rotation_target(Path::new(&log_path));
    let appender = match RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&prefix)
        .max_log_files(3)
        .build(&dir)
    {
        Ok(appender) => appender,
        Err(err) => {
            registry().with(stderr_layer).init();
            tracing::error!(
                "failed to create rolling log appender at {}: {err}; logging to stderr only",
                dir.display()
            );
            return None;
        }
    };

    let (file_writer, guard) = tracing_appender::non_blocking(appender);
    let file_layer = layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_filter(env_filter());

    registry().with(stderr_layer).with(file_layer).init();
    Some(guard)
}
