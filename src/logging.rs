//! Structured logging setup.
//!
//! Both binaries log JSON lines through `tracing-subscriber`. The level is
//! given by name (`-v` flag or `LOG_LEVEL`) and `RUST_LOG`, when set,
//! takes precedence for per-module filtering.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{AppError, Result};

/// Map a level name to a filter. `WARNING` and `CRITICAL` are accepted as
/// aliases of `warn` and `error`.
pub fn level_filter(name: &str) -> Result<LevelFilter> {
    match name.trim().to_ascii_uppercase().as_str() {
        "TRACE" => Ok(LevelFilter::TRACE),
        "DEBUG" => Ok(LevelFilter::DEBUG),
        "INFO" => Ok(LevelFilter::INFO),
        "WARN" | "WARNING" => Ok(LevelFilter::WARN),
        "ERROR" | "CRITICAL" => Ok(LevelFilter::ERROR),
        "OFF" => Ok(LevelFilter::OFF),
        _ => Err(AppError::Configuration(format!("Invalid log level '{}'", name))),
    }
}

/// Install the global JSON subscriber.
pub fn init(level: &str) -> Result<()> {
    let level = level_filter(level)?;
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .json()
        .try_init()
        .map_err(|e| AppError::Internal(format!("Failed to initialise logging: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names() {
        assert_eq!(level_filter("INFO").unwrap(), LevelFilter::INFO);
        assert_eq!(level_filter("debug").unwrap(), LevelFilter::DEBUG);
        assert_eq!(level_filter("WARNING").unwrap(), LevelFilter::WARN);
        assert_eq!(level_filter("CRITICAL").unwrap(), LevelFilter::ERROR);
        assert_eq!(level_filter(" trace ").unwrap(), LevelFilter::TRACE);
    }

    #[test]
    fn test_unknown_level_rejected() {
        let err = level_filter("LOUD").unwrap_err();
        assert!(err.to_string().contains("Invalid log level 'LOUD'"));
    }
}
