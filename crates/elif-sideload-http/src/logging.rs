//! Structured logging setup for sideloading services
//!
//! The engine logs under `elif::sideload` (parsed selections, gathered
//! prefetches, reducer hops) and the view under `elif::sideload::http`.
//! [`LoggingConfig`] sets the level for those targets separately from
//! everything else, so planning can be traced without turning up axum.

use std::io;

use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SIDELOAD_TARGET: &str = "elif::sideload";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("A global subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] TryInitError),
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Level for every target without a more specific directive
    pub level: String,
    /// Level for `elif::sideload` targets, `None` to inherit `level`
    pub sideload_level: Option<String>,
    pub format: LogFormat,
    /// Print the event target next to each line
    pub with_target: bool,
    /// Extra `target=level` directives
    pub directives: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            sideload_level: None,
            format: LogFormat::Pretty,
            with_target: true,
            directives: Vec::new(),
        }
    }
}

impl LoggingConfig {
    pub fn production() -> Self {
        Self {
            level: "warn".to_string(),
            sideload_level: Some("info".to_string()),
            format: LogFormat::Json,
            with_target: true,
            directives: Vec::new(),
        }
    }

    /// Selections and prefetch plans at debug, reducer hops at trace
    pub fn development() -> Self {
        Self {
            level: "info".to_string(),
            sideload_level: Some("trace".to_string()),
            format: LogFormat::Pretty,
            with_target: true,
            directives: vec!["tower=debug".to_string()],
        }
    }

    pub fn test() -> Self {
        Self {
            level: "error".to_string(),
            sideload_level: Some("warn".to_string()),
            format: LogFormat::Compact,
            with_target: false,
            directives: Vec::new(),
        }
    }

    pub fn with_sideload_level(mut self, level: impl Into<String>) -> Self {
        self.sideload_level = Some(level.into());
        self
    }

    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// `EnvFilter` directives, most general first
    pub fn filter_directives(&self) -> String {
        let mut directives = vec![self.level.clone()];
        if let Some(level) = &self.sideload_level {
            directives.push(format!("{}={}", SIDELOAD_TARGET, level));
        }
        directives.extend(self.directives.iter().cloned());
        directives.join(",")
    }

    pub fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        Ok(EnvFilter::try_new(self.filter_directives())?)
    }
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the
/// configured directives when set.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => config.env_filter()?,
    };
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().with_writer(io::stdout).with_target(config.with_target).json())
            .try_init()?,
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(io::stdout).with_target(config.with_target).pretty())
            .try_init()?,
        LogFormat::Compact => registry
            .with(fmt::layer().with_writer(io::stdout).with_target(config.with_target).compact())
            .try_init()?,
    }

    tracing::info!(
        target: "elif::sideload::http",
        filter = %config.filter_directives(),
        format = ?config.format,
        "sideload logging initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives() {
        assert_eq!(LoggingConfig::default().filter_directives(), "info");
        assert_eq!(LoggingConfig::production().filter_directives(), "warn,elif::sideload=info");
        assert_eq!(
            LoggingConfig::development().filter_directives(),
            "info,elif::sideload=trace,tower=debug"
        );

        let config = LoggingConfig::test()
            .with_sideload_level("debug")
            .with_directive("axum=info");
        assert_eq!(config.filter_directives(), "error,elif::sideload=debug,axum=info");
        assert!(config.env_filter().is_ok());
    }

    #[test]
    fn test_init_logging_installs_once() {
        let config = LoggingConfig::test();
        match init_logging(&config) {
            Ok(()) => assert!(matches!(init_logging(&config), Err(LoggingError::AlreadyInstalled(_)))),
            Err(err) => assert!(matches!(err, LoggingError::AlreadyInstalled(_))),
        }
    }
}
