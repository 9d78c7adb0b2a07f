//! Unified logging infrastructure for the exercise-range pipeline.
//!
//! This keeps the hand-rolled, dependency-free structured logger the
//! original modulation pipeline used, generalized with an internal mutex so
//! a single logger can be shared (`Arc<PipelineLogger>`) across the tokio
//! tasks that make up the pipeline, dongle server and decoders.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Log level for filtering messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to record.
    pub level: LogLevel,

    /// Per-subsystem enable flags, keyed by the subsystem tags used in
    /// `log()` calls throughout the crate (SOURCE, JAMMER, MIXER, DONGLE,
    /// BUS, CONTROL, CLOCK, AIS, SSTV, METRICS, CLIENT, DECODE).
    pub enable_dsp: bool,
    pub enable_network: bool,
    pub enable_decode: bool,

    /// Maximum number of log entries to keep in memory.
    pub max_entries: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            enable_dsp: true,
            enable_network: true,
            enable_decode: true,
            max_entries: 1000,
        }
    }
}

impl LogConfig {
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            max_entries: 5000,
            ..Default::default()
        }
    }

    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Warn,
            enable_dsp: false,
            enable_network: false,
            enable_decode: false,
            max_entries: 100,
        }
    }

    pub fn disabled() -> Self {
        Self {
            level: LogLevel::Error,
            enable_dsp: false,
            enable_network: false,
            enable_decode: false,
            max_entries: 0,
        }
    }
}

/// A single log entry.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub subsystem: &'static str,
    pub message: String,
}

struct Inner {
    config: LogConfig,
    entries: Vec<LogEntry>,
}

/// Logger that collects structured log entries, safe to share between tasks.
#[derive(Clone)]
pub struct PipelineLogger {
    inner: Arc<Mutex<Inner>>,
}

impl PipelineLogger {
    pub fn new(config: LogConfig) -> Self {
        let capacity = config.max_entries.min(1000);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                config,
                entries: Vec::with_capacity(capacity),
            })),
        }
    }

    /// Log a message at the specified level for the given subsystem tag.
    pub fn log(&self, level: LogLevel, subsystem: &'static str, message: impl fmt::Display) {
        let mut inner = self.inner.lock();
        if level < inner.config.level {
            return;
        }

        let enabled = match subsystem {
            "SOURCE" | "JAMMER" | "MIXER" | "CLOCK" => inner.config.enable_dsp,
            "DONGLE" | "BUS" | "CONTROL" | "CLIENT" => inner.config.enable_network,
            "AIS" | "SSTV" | "METRICS" | "DECODE" => inner.config.enable_decode,
            _ => true,
        };
        if !enabled {
            return;
        }

        let entry = LogEntry {
            level,
            subsystem,
            message: message.to_string(),
        };

        #[cfg(any(test, debug_assertions))]
        eprintln!("[{}] {}: {}", entry.level, entry.subsystem, entry.message);

        if inner.config.max_entries > 0 {
            if inner.entries.len() >= inner.config.max_entries {
                inner.entries.remove(0);
            }
            inner.entries.push(entry);
        }
    }

    pub fn trace(&self, subsystem: &'static str, message: impl fmt::Display) {
        self.log(LogLevel::Trace, subsystem, message);
    }

    pub fn debug(&self, subsystem: &'static str, message: impl fmt::Display) {
        self.log(LogLevel::Debug, subsystem, message);
    }

    pub fn info(&self, subsystem: &'static str, message: impl fmt::Display) {
        self.log(LogLevel::Info, subsystem, message);
    }

    pub fn warn(&self, subsystem: &'static str, message: impl fmt::Display) {
        self.log(LogLevel::Warn, subsystem, message);
    }

    pub fn error(&self, subsystem: &'static str, message: impl fmt::Display) {
        self.log(LogLevel::Error, subsystem, message);
    }

    /// Snapshot of all currently-retained entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.inner.lock().entries.clone()
    }

    pub fn entries_for_subsystem(&self, subsystem: &str) -> Vec<LogEntry> {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|e| e.subsystem == subsystem)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }
}

impl Default for PipelineLogger {
    fn default() -> Self {
        Self::new(LogConfig::default())
    }
}

impl fmt::Debug for PipelineLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineLogger").finish_non_exhaustive()
    }
}
