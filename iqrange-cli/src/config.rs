//! CLI-facing configuration: log sink/format selection, layered on top of
//! `iqrange_core::config::PipelineConfig` for everything pipeline-shaped.
//!
//! The exercise range's external configuration surface is a handful of
//! environment variables (spec.md §6: `IQ_FILE_PATH`, `SAMPLE_RATE`, bus
//! broker host/port) rather than a TOML file, so CLI arguments here are
//! `clap`'s `env` feature directly onto the relevant fields instead of a
//! layered TOML loader.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Log output target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    Stdout,
    Stderr,
    File,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Logfmt,
    Pretty,
}

/// Log level filter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// CLI-level logging configuration: where structured events (telemetry, AIS
/// frames, statistics) are written, independent of the DSP/network logging
/// `iqrange_core::logging::PipelineLogger` does internally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub target: LogTarget,
    pub file_path: Option<PathBuf>,
    pub format: LogFormat,
    pub level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            target: LogTarget::Stdout,
            file_path: None,
            format: LogFormat::Pretty,
            level: LogLevel::Info,
        }
    }
}

impl LoggingConfig {
    /// Translate the CLI's level filter into the core crate's DSP/network
    /// logger configuration, so both loggers agree on verbosity.
    pub fn to_core_log_config(&self) -> iqrange_core::logging::LogConfig {
        use iqrange_core::logging::{LogConfig as CoreLogConfig, LogLevel as CoreLogLevel};

        let level = match self.level {
            LogLevel::Debug => CoreLogLevel::Debug,
            LogLevel::Info => CoreLogLevel::Info,
            LogLevel::Warn => CoreLogLevel::Warn,
            LogLevel::Error => CoreLogLevel::Error,
        };

        CoreLogConfig {
            level,
            ..CoreLogConfig::default()
        }
    }
}
