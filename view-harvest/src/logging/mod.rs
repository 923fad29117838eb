//! Logging setup with a reloadable filter and optional daily log files.
//!
//! Console output is always enabled. When a log directory is configured the
//! same events are also written to `view-harvest.log.YYYY-MM-DD` through a
//! non-blocking writer. Timestamps use the local timezone.

use std::path::PathBuf;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
};

use crate::{Error, Result};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "view_harvest=info,view_parser=info";

/// File name prefix of the rolling log files.
const LOG_FILE_PREFIX: &str = "view-harvest.log";

/// Timer formatting timestamps in the local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Type alias for the reload handle.
pub type FilterHandle = Handle<EnvFilter, tracing_subscriber::Registry>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingOptions {
    /// Filter directive. `RUST_LOG` wins when set, then this, then
    /// [`DEFAULT_LOG_FILTER`].
    #[serde(default)]
    pub filter: Option<String>,
    /// Directory for daily log files. Console only when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

/// Keeps logging alive. Drop it last so buffered file output is flushed.
pub struct LoggingGuard {
    handle: FilterHandle,
    _file_guard: Option<WorkerGuard>,
}

impl LoggingGuard {
    /// Get the current filter directive string.
    pub fn filter(&self) -> String {
        self.handle
            .with_current(|filter| filter.to_string())
            .unwrap_or_default()
    }

    /// Replace the filter directive at runtime.
    pub fn set_filter(&self, directive: &str) -> Result<()> {
        let new_filter = parse_filter(directive)?;

        self.handle
            .reload(new_filter)
            .map_err(|e| Error::Other(format!("Failed to reload filter: {}", e)))?;

        info!(directive = %directive, "Log filter updated");
        Ok(())
    }
}

fn parse_filter(directive: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directive)
        .map_err(|e| Error::config(format!("Invalid filter directive: {}", e)))
}

/// Install the global subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init_logging(options: &LoggingOptions) -> Result<LoggingGuard> {
    let initial_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => parse_filter(options.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER))?,
    };
    let (filter_layer, handle) = reload::Layer::new(initial_filter);

    let (file_layer, file_guard) = match &options.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Other(format!("Failed to set global default subscriber: {}", e)))?;

    Ok(LoggingGuard {
        handle,
        _file_guard: file_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert!(DEFAULT_LOG_FILTER.contains("view_harvest=info"));
        assert!(parse_filter(DEFAULT_LOG_FILTER).is_ok());
    }

    #[test]
    fn test_invalid_filter_rejected() {
        assert!(matches!(
            parse_filter("view_harvest=loud"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_options_deserialize() {
        let options: LoggingOptions = toml::from_str("log_dir = \"logs\"").unwrap();
        assert_eq!(options.log_dir, Some(PathBuf::from("logs")));
        assert_eq!(options.filter, None);
    }
}
