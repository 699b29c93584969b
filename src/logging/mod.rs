//! Logging initialization: an EnvFilter-driven console layer plus an
//! optional non-blocking file sink when MODELBRIDGE_LOG_DIR is set.
//! Initialized once per process behind an atomic guard.

use anyhow::{anyhow, Context};
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;

static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Keeps the file sink's worker alive for the duration of the command.
pub struct LoggingGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
    log_file_dir: Option<PathBuf>,
}

impl LoggingGuard {
    pub fn log_file_dir(&self) -> Option<&PathBuf> {
        self.log_file_dir.as_ref()
    }
}

/// Initialize the logging framework. `verbose` lowers the default filter
/// to debug; RUST_LOG always wins when set.
pub fn init(verbose: bool) -> crate::Result<LoggingGuard> {
    if LOGGER_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(anyhow!("logging already initialized"));
    }

    let default_level = if verbose {
        "modelbridge=debug,info"
    } else {
        "modelbridge=info,warn"
    };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .context("failed to configure tracing level")?;

    let console_layer = tracing_subscriber::fmt::layer().with_target(false);

    let (file_layer, file_guard, log_file_dir) = match env::var("MODELBRIDGE_LOG_DIR") {
        Ok(dir) => {
            let dir = PathBuf::from(dir);
            let appender = tracing_appender::rolling::daily(&dir, "modelbridge.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking);
            (Some(layer), Some(guard), Some(dir))
        }
        Err(_) => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
        log_file_dir,
    })
}
