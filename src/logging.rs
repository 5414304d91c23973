use serde::{
    Deserialize,
    Serialize,
};
use std::path::PathBuf;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` overrides it when set.
    pub filter: String,
    /// Write logs to a daily rolling file here instead of stdout.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: String::from("info"),
            directory: None,
            file_prefix: String::from("mega-lottery.log"),
        }
    }
}

/// Installs the global subscriber. Safe to call more than once; only the first
/// call takes effect.
///
/// When logging to a file the returned guard must be kept alive, otherwise
/// buffered lines are lost on exit.
pub fn init_tracing(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter.as_str()));
    match &config.directory {
        Some(directory) => {
            let appender = rolling::daily(directory, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let installed = fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .is_ok();
            installed.then_some(guard)
        }
        None => {
            let _ = fmt().with_env_filter(filter).try_init();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn default__logs_info_to_stdout() {
        let config = LoggingConfig::default();
        assert_eq!(config.filter, "info");
        assert!(config.directory.is_none());
    }

    #[test]
    fn init_tracing__repeated_calls_do_not_panic() {
        let config = LoggingConfig::default();
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_none());
    }
}
