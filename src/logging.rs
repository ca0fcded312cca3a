// src/logging.rs

//! Logging setup for `treewatch` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. explicit level (usually `[logging].level` from the config file)
//! 2. `TREEWATCH_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `info`
//!
//! Logs are sent to STDERR.

use anyhow::{Result, anyhow};
use tracing_subscriber::fmt;

use crate::types::LogLevel;

/// Environment variable consulted when no explicit level is given.
pub const LOG_ENV_VAR: &str = "TREEWATCH_LOG";

/// Initialise the global logging subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(level: Option<LogLevel>) -> Result<()> {
    let env_level = std::env::var(LOG_ENV_VAR).ok();
    let level = effective_level(level, env_level.as_deref());

    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("installing tracing subscriber: {e}"))
}

fn effective_level(explicit: Option<LogLevel>, env_value: Option<&str>) -> tracing::Level {
    match explicit {
        Some(lvl) => level_from_log_level(lvl),
        None => env_value
            .and_then(|s| s.parse::<LogLevel>().ok())
            .map(level_from_log_level)
            .unwrap_or(tracing::Level::INFO),
    }
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_level_wins_over_env() {
        let level = effective_level(Some(LogLevel::Trace), Some("error"));
        assert_eq!(level, tracing::Level::TRACE);
    }

    #[test]
    fn env_level_is_used_when_no_explicit_level() {
        assert_eq!(effective_level(None, Some(" Warning ")), tracing::Level::WARN);
        assert_eq!(effective_level(None, Some("debug")), tracing::Level::DEBUG);
    }

    #[test]
    fn falls_back_to_info() {
        assert_eq!(effective_level(None, None), tracing::Level::INFO);
        assert_eq!(effective_level(None, Some("loud")), tracing::Level::INFO);
    }
}
