//! Tracing setup: console output plus a warnings-and-errors log file.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{BotError, Result};

/// Install the global subscriber.
///
/// The console honours `RUST_LOG` (falling back to `lifeline=info`, or
/// `lifeline=debug` when `verbose`). The file at `log_file` is appended to and
/// only receives `WARN` and above. Keep the returned guard alive for the life
/// of the process or buffered file lines are lost.
pub fn init(log_file: &Path, verbose: bool) -> Result<WorkerGuard> {
    let file_name = log_file
        .file_name()
        .ok_or_else(|| BotError::Config(format!("invalid log file: {}", log_file.display())))?;
    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let default_filter = if verbose {
        "lifeline=debug,info"
    } else {
        "lifeline=info,warn"
    };
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(console_filter))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer)
                .with_filter(LevelFilter::WARN),
        )
        .try_init()
        .map_err(|e| BotError::Config(format!("logging already initialised: {e}")))?;

    Ok(guard)
}
