use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

const DEFAULT_LOG_DIRECTIVES: &str = "info,sqlx=warn";

/// Log to a daily file under `log_dir` and to the console.
///
/// The appender prunes old files itself, keeping `log_keep_files` days. Hold on
/// to the returned guard until exit so buffered lines are flushed.
pub fn init_logging(config: &LogConfig) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("failed to create {}", config.log_dir.display()))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("etl")
        .filename_suffix("log")
        .max_log_files(config.log_keep_files.max(1))
        .build(&config.log_dir)
        .context("failed to open log file")?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_DIRECTIVES))
        .context("invalid log directives")?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
        .with(fmt::layer().with_target(false))
        .try_init()
        .context("logging already initialised")?;

    Ok(guard)
}
