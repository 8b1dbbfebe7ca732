use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};
use xylem_derive::LayeredConfig;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, single line per event
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Logger {
    pub log_format: LogFormat,
    pub log_level: LogLevel,
}

#[derive(Args, Debug, Clone, Default, Serialize, Deserialize, LayeredConfig)]
#[serde(rename_all = "kebab-case")]
#[xylem(try_into = "Logger")]
pub struct LoggerArgs {
    /// Log output format
    #[arg(long, env = "XYLEM_LOG_FORMAT", value_enum)]
    #[xylem(default = LogFormat::Text)]
    pub log_format: Option<LogFormat>,

    /// Minimum log level
    #[arg(long, env = "XYLEM_LOG_LEVEL", value_enum)]
    #[xylem(default = LogLevel::Info)]
    pub log_level: Option<LogLevel>,
}

impl Logger {
    /// Installs the global subscriber. `RUST_LOG` takes precedence over the configured level.
    pub fn init(&self) -> Result<(), LoggingError> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.log_level.as_directive()));

        match self.log_format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_current_span(false))
                .try_init(),
            LogFormat::Text => tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(false))
                .try_init(),
        }
        .map_err(|e| LoggingError::Init(e.to_string()))
    }
}
