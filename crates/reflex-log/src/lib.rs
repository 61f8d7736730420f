//! Structured logging for the Reflex reliability layer.
//!
//! Console output with uptime timestamps and module paths, plus a JSON file
//! log in debug builds so reconnect episodes can be reviewed after the fact.
//! The level comes from `RUST_LOG` when set, else from the config file.

use std::fs::File;
use std::io;
use std::path::Path;

use reflex_config::Config;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither `RUST_LOG` nor the config names a level.
pub const DEFAULT_FILTER: &str = "info";

/// Name of the JSON log file written in debug builds.
pub const LOG_FILE_NAME: &str = "reflex.log";

/// Resolve the filter string from an optional config.
///
/// An empty `debug.log_level` falls back to [`DEFAULT_FILTER`].
pub fn filter_directive(config: Option<&Config>) -> String {
    match config {
        Some(config) if !config.debug.log_level.trim().is_empty() => {
            config.debug.log_level.trim().to_string()
        }
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// Create `log_dir` if needed and truncate the JSON log file inside it.
pub fn open_log_file(log_dir: &Path) -> io::Result<File> {
    std::fs::create_dir_all(log_dir)?;
    File::create(log_dir.join(LOG_FILE_NAME))
}

/// Install the global tracing subscriber.
///
/// Console output is always on. With `debug_build` set and a `log_dir`
/// given, a JSON copy goes to [`LOG_FILE_NAME`] in that directory; if the
/// file cannot be opened the console still works and a warning is logged.
///
/// ```no_run
/// use reflex_log::init_logging;
///
/// init_logging(None, false, None);
/// ```
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config)));

    let console = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_timer(fmt::time::uptime());

    let (file, open_error) = match log_dir.filter(|_| debug_build).map(open_log_file) {
        Some(Ok(file)) => (Some(file), None),
        Some(Err(err)) => (None, Some(err)),
        None => (None, None),
    };
    // `Option<Layer>` is itself a layer, so a missing file just disables it.
    let json = file.map(|file| {
        fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_timer(fmt::time::uptime())
            .json()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(json)
        .init();

    if let Some(err) = open_error {
        tracing::warn!(error = %err, "File logging disabled");
    }
}

/// `EnvFilter` built from [`DEFAULT_FILTER`].
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}
