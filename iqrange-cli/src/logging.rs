//! Structured logging for telemetry, AIS frame decode, and SSTV events.

use crate::config::{LogFormat, LogTarget, LoggingConfig};
use chrono::{DateTime, Utc};
use color_eyre::eyre::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};

/// Structured log event types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEvent {
    /// Periodic signal-quality telemetry sample.
    Telemetry(TelemetryEvent),

    /// A decoded AIS frame.
    AisFrame(AisFrameEvent),

    /// An SSTV decoder state-machine event.
    SstvEvent(SstvEventLog),

    /// Statistical summary over the run so far.
    Statistics(StatisticsEvent),

    /// General info message.
    Info { message: String },

    /// Warning message.
    Warn { message: String },

    /// Error message.
    Error { message: String, details: Option<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub timestamp: DateTime<Utc>,
    pub snr_db: f64,
    pub ber: f64,
    pub signal_strength_dbm: f64,
    pub packet_success_rate: f64,
    pub events_decoded: usize,
    pub chunks_processed: usize,
    pub healthy: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AisFrameEvent {
    pub timestamp: DateTime<Utc>,
    pub message_id: u64,
    pub hex_dump: AisHexDump,
    pub decoded: AisDecoded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AisHexDump {
    pub mmsi: String,
    pub message_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AisDecoded {
    pub mmsi: u32,
    pub message_type: String,
    pub message_description: String,
    pub vessel_name: String,
    pub vessel_type: String,
    pub position: String,
    pub speed_knots: f64,
    pub heading_degrees: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SstvEventLog {
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsEvent {
    pub timestamp: DateTime<Utc>,
    pub duration_secs: f64,
    pub snr_db: StatSummary,
    pub ber: StatSummary,
    pub signal_strength_dbm: StatSummary,
    pub total_events: usize,
    pub total_chunks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatSummary {
    pub mean: f64,
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
    pub samples: usize,
}

/// Logger that outputs structured logs in one of three formats to one of
/// three sinks, as chosen on the command line.
pub struct StructuredLogger {
    config: LoggingConfig,
    writer: Box<dyn Write + Send>,
    start_time: DateTime<Utc>,
}

impl StructuredLogger {
    pub fn new(config: LoggingConfig) -> Result<Self> {
        let writer: Box<dyn Write + Send> = match &config.target {
            LogTarget::Stdout => Box::new(io::stdout()),
            LogTarget::Stderr => Box::new(io::stderr()),
            LogTarget::File => {
                let path = config
                    .file_path
                    .as_ref()
                    .ok_or_else(|| color_eyre::eyre::eyre!("file path required for file logging"))?;
                Box::new(BufWriter::new(File::create(path)?))
            }
        };

        Ok(Self {
            config,
            writer,
            start_time: Utc::now(),
        })
    }

    pub fn log(&mut self, event: LogEvent) -> Result<()> {
        let output = match self.config.format {
            LogFormat::Json => self.format_json(&event)?,
            LogFormat::Logfmt => self.format_logfmt(&event),
            LogFormat::Pretty => self.format_pretty(&event),
        };

        writeln!(self.writer, "{output}")?;
        self.writer.flush()?;

        Ok(())
    }

    fn format_json(&self, event: &LogEvent) -> Result<String> {
        Ok(serde_json::to_string(event)?)
    }

    fn format_logfmt(&self, event: &LogEvent) -> String {
        let ts = Utc::now().to_rfc3339();

        match event {
            LogEvent::Telemetry(t) => format!(
                "ts=\"{}\" type=telemetry snr_db={:.2} ber={:.6} signal_dbm={:.1} packet_success={:.4} events={} chunks={} healthy={}",
                ts, t.snr_db, t.ber, t.signal_strength_dbm, t.packet_success_rate, t.events_decoded, t.chunks_processed, t.healthy
            ),
            LogEvent::AisFrame(f) => format!(
                "ts=\"{}\" type=ais_frame mmsi={} msg_type=\"{}\" vessel=\"{}\" position=\"{}\"",
                ts, f.decoded.mmsi, f.decoded.message_type, f.decoded.vessel_name, f.decoded.position
            ),
            LogEvent::SstvEvent(e) => format!(
                "ts=\"{}\" type=sstv_event kind={} detail=\"{}\"",
                ts, e.kind, e.detail
            ),
            LogEvent::Statistics(s) => format!(
                "ts=\"{}\" type=statistics duration_secs={:.2} total_events={} total_chunks={} snr_db_mean={:.2} ber_mean={:.6}",
                ts, s.duration_secs, s.total_events, s.total_chunks, s.snr_db.mean, s.ber.mean
            ),
            LogEvent::Info { message } => format!("ts=\"{ts}\" level=info msg=\"{message}\""),
            LogEvent::Warn { message } => format!("ts=\"{ts}\" level=warn msg=\"{message}\""),
            LogEvent::Error { message, details } => match details {
                Some(d) => format!("ts=\"{ts}\" level=error msg=\"{message}\" details=\"{d}\""),
                None => format!("ts=\"{ts}\" level=error msg=\"{message}\""),
            },
        }
    }

    fn format_pretty(&self, event: &LogEvent) -> String {
        let ts = Utc::now().format("%Y-%m-%d %H:%M:%S%.3f");

        match event {
            LogEvent::Telemetry(t) => format!(
                "[{}] TELEMETRY: SNR={:.1}dB BER={:.6} Signal={:.1}dBm Success={:.4} | Events={} Chunks={} | {}",
                ts, t.snr_db, t.ber, t.signal_strength_dbm, t.packet_success_rate, t.events_decoded, t.chunks_processed,
                if t.healthy { "HEALTHY" } else { "DEGRADED" }
            ),
            LogEvent::AisFrame(f) => format!(
                "[{}] AIS[{}]: MMSI {} | {} | {} | {}",
                ts, f.message_id, f.decoded.mmsi, f.decoded.message_type, f.decoded.vessel_name, f.decoded.position
            ),
            LogEvent::SstvEvent(e) => format!("[{}] SSTV: {} | {}", ts, e.kind, e.detail),
            LogEvent::Statistics(s) => format!(
                "[{}] STATISTICS ({:.2}s): Events={} Chunks={} | SNR: μ={:.1}dB σ={:.1} [{:.1},{:.1}] | BER: μ={:.6} σ={:.6} [{:.6},{:.6}]",
                ts, s.duration_secs, s.total_events, s.total_chunks,
                s.snr_db.mean, s.snr_db.stddev, s.snr_db.min, s.snr_db.max,
                s.ber.mean, s.ber.stddev, s.ber.min, s.ber.max
            ),
            LogEvent::Info { message } => format!("[{ts}] INFO: {message}"),
            LogEvent::Warn { message } => format!("[{ts}] WARN: {message}"),
            LogEvent::Error { message, details } => match details {
                Some(d) => format!("[{ts}] ERROR: {message} | {d}"),
                None => format!("[{ts}] ERROR: {message}"),
            },
        }
    }

    pub fn elapsed(&self) -> f64 {
        (Utc::now() - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}
