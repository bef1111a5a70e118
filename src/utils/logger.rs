//! Logging setup
//!
//! The level comes from `--verbose`, then the first parseable value among
//! `--log`, `TESTGRAPH_LOG` and the config file. Only events from this crate
//! are shown.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Log level configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    /// Pick the level from CLI and config sources in priority order
    pub fn resolve<'a>(verbose: bool, sources: impl IntoIterator<Item = Option<&'a str>>) -> Self {
        if verbose {
            return LogLevel::Debug;
        }
        sources
            .into_iter()
            .flatten()
            .find_map(LogLevel::from_str)
            .unwrap_or_default()
    }
}

/// Filter directive scoped to this crate
fn filter_directive(level: LogLevel) -> String {
    format!("testgraph={}", level.to_tracing_level())
}

/// Initialize the logger with specified level
pub fn init_logger(level: LogLevel) {
    let filter = EnvFilter::new(filter_directive(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_str() {
        assert_eq!(LogLevel::from_str("info"), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_str("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_str("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str("unknown"), None);
    }

    #[test]
    fn test_resolve_priority() {
        assert_eq!(LogLevel::resolve(true, [Some("error")]), LogLevel::Debug);
        assert_eq!(
            LogLevel::resolve(false, [None, Some("warn"), Some("trace")]),
            LogLevel::Warn
        );
        assert_eq!(
            LogLevel::resolve(false, [Some("loud"), Some("error")]),
            LogLevel::Error
        );
        assert_eq!(LogLevel::resolve(false, [None, None]), LogLevel::Info);
    }

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive(LogLevel::Debug), "testgraph=DEBUG");
    }
}
