use std::fmt::Display;

use clap::ValueEnum;
use log::LevelFilter;
use serde::{Deserialize, Serialize};

/// Verbosity selectable from settings and the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
        }
    }
}

/// Initialize the `env_logger` backend. `RUST_LOG` overrides `level`.
pub fn init_logging(level: LogLevel) {
    let result = env_logger::Builder::new()
        .filter_level(level.into())
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
    if result.is_err() {
        eprintln!("Warning: Logging system already initialized");
    }
}

/// Log failures of a per-asset result with context, passing it through.
pub trait ResultExt<T, E> {
    fn log_failure(self, context: &str) -> Result<T, E>;
}

impl<T, E: Display> ResultExt<T, E> for Result<T, E> {
    fn log_failure(self, context: &str) -> Result<T, E> {
        if let Err(err) = &self {
            log::error!("{context}: {err}");
        }
        self
    }
}
