mod config;
mod frame_decoder;
mod logging;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result};

use iqrange_core::ais::AisDecoder;
use iqrange_core::bus::{Bus, BusServer};
use iqrange_core::config::{JammerConfig, PipelineConfig, TuningState};
use iqrange_core::control_plane::{ControlPlane, PlaybackState};
use iqrange_core::decoders::{run_decoder_session, DecoderEvent, DecoderTarget, EventSink};
use iqrange_core::dongle_server::{DongleServer, SharedState};
use iqrange_core::logging::PipelineLogger;
use iqrange_core::metrics::MetricsAnalyzer;
use iqrange_core::pipeline::Pipeline;
use iqrange_core::sstv::{SstvDecoder, SstvEvent};

use config::{LogFormat as CliLogFormat, LogLevel as CliLogLevel, LogTarget as CliLogTarget, LoggingConfig};
use frame_decoder::AisFrameFormatter;
use logging::{LogEvent, SstvEventLog, StatisticsEvent, StructuredLogger};
use telemetry::TelemetryAggregator;

const STATS_INTERVAL_SECS: f64 = 30.0;
const TELEMETRY_INTERVAL_SECS: f64 = 1.0;

#[derive(Parser, Debug)]
#[command(author, version, about = "Exercise-range IQ streaming, jamming, and decode tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream an IQ file through the jammer and serve it over the
    /// dongle-emulation protocol, driven by control-bus commands.
    Serve(ServeArgs),
    /// Connect to a running dongle-emulation server and run one decoder
    /// against the live stream.
    Decode(DecodeArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Path to the IQ file to loop-play.
    #[arg(long, env = "IQ_FILE_PATH", default_value = "signal.iq")]
    iq_file: PathBuf,

    /// Sample rate of the IQ file, in Hz.
    #[arg(long, env = "SAMPLE_RATE", default_value_t = 1_024_000)]
    sample_rate: u32,

    /// Samples read and broadcast per pacing tick.
    #[arg(long, default_value_t = 16_384)]
    chunk_size: usize,

    #[arg(long, env = "DONGLE_HOST", default_value = "0.0.0.0")]
    dongle_host: String,

    #[arg(long, env = "DONGLE_PORT", default_value_t = 1234)]
    dongle_port: u16,

    #[arg(long, env = "BUS_HOST", default_value = "0.0.0.0")]
    bus_host: String,

    #[arg(long, env = "BUS_PORT", default_value_t = 7878)]
    bus_port: u16,

    #[arg(long, default_value_t = 1)]
    tuner_type: u32,

    #[arg(long, default_value_t = 29)]
    gain_stages: u32,

    #[command(flatten)]
    logging: LoggingArgs,
}

#[derive(Debug, Clone, ValueEnum)]
enum DecoderKindArg {
    Ais,
    Sstv,
    Metrics,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    /// Which decoder to run against the stream.
    #[arg(long, value_enum)]
    kind: DecoderKindArg,

    #[arg(long, env = "DONGLE_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(long, env = "DONGLE_PORT", default_value_t = 1234)]
    port: u16,

    /// Samples pulled from the stream per read.
    #[arg(long, default_value_t = 16_384)]
    chunk_size: usize,

    /// Sample rate of the stream being decoded, in Hz; AIS/SSTV decoder
    /// timing constants are derived from this.
    #[arg(long, env = "SAMPLE_RATE", default_value_t = 1_024_000.0)]
    sample_rate: f64,

    #[command(flatten)]
    logging: LoggingArgs,
}

#[derive(Args, Debug)]
struct LoggingArgs {
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: CliLogFormat,

    #[arg(long, value_enum, default_value = "stdout")]
    log_target: CliLogTarget,

    #[arg(long)]
    log_file: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "info")]
    log_level: CliLogLevel,
}

impl LoggingArgs {
    fn into_config(self) -> LoggingConfig {
        LoggingConfig {
            target: self.log_target,
            file_path: self.log_file,
            format: self.log_format,
            level: self.log_level,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::Decode(args) => run_decode(args).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let logging_config = args.logging.into_config();
    let mut logger = StructuredLogger::new(logging_config.clone())?;
    let core_logger = Arc::new(PipelineLogger::new(logging_config.to_core_log_config()));

    let pipeline_config = PipelineConfig {
        iq_file_path: args.iq_file.clone(),
        sample_rate_hz: args.sample_rate,
        chunk_size: args.chunk_size,
        dongle_host: args.dongle_host.clone(),
        dongle_port: args.dongle_port,
        bus_host: args.bus_host.clone(),
        bus_port: args.bus_port,
        tuner_type: args.tuner_type,
        gain_stages: args.gain_stages,
    };
    pipeline_config
        .validate()
        .wrap_err("invalid pipeline configuration")?;

    logger.log(LogEvent::Info {
        message: format!(
            "starting range: file={} rate={}Hz dongle={}:{} bus={}:{}",
            pipeline_config.iq_file_path.display(),
            pipeline_config.sample_rate_hz,
            pipeline_config.dongle_host,
            pipeline_config.dongle_port,
            pipeline_config.bus_host,
            pipeline_config.bus_port,
        ),
    })?;

    let tuning = TuningState {
        center_freq_hz: TuningState::default().center_freq_hz,
        sample_rate_hz: pipeline_config.sample_rate_hz,
    };
    let state = SharedState::new(tuning, JammerConfig::default());
    let dongle = DongleServer::new(
        pipeline_config.tuner_type,
        pipeline_config.gain_stages,
        state.clone(),
        core_logger.clone(),
    );
    let bus = Bus::new();
    let playback = Arc::new(parking_lot::Mutex::new(PlaybackState::default()));
    let (pipeline_tx, pipeline_rx) = tokio::sync::mpsc::channel(16);

    let pipeline = Pipeline::new(
        pipeline_config.clone(),
        state.clone(),
        dongle.clone(),
        playback.clone(),
        core_logger.clone(),
    )
    .wrap_err("failed to load IQ file")?;

    let control_plane = ControlPlane::new(
        bus.clone(),
        state,
        dongle.clone(),
        playback,
        pipeline_tx,
        core_logger.clone(),
    );

    let dongle_host = pipeline_config.dongle_host.clone();
    let dongle_port = pipeline_config.dongle_port;
    let dongle_for_serve = dongle.clone();
    tokio::spawn(async move {
        if let Err(err) = dongle_for_serve.serve(&dongle_host, dongle_port).await {
            eprintln!("dongle-emulation server exited: {err}");
        }
    });

    let bus_host = pipeline_config.bus_host.clone();
    let bus_port = pipeline_config.bus_port;
    let bus_for_serve = bus.clone();
    let bus_logger = core_logger.clone();
    tokio::spawn(async move {
        if let Err(err) = BusServer::serve(bus_for_serve, &bus_host, bus_port, bus_logger).await {
            eprintln!("control bus server exited: {err}");
        }
    });

    tokio::spawn(control_plane.run(wall_clock_secs));

    logger.log(LogEvent::Info {
        message: "range is up; playback is paused until a 'play' control command arrives".to_string(),
    })?;

    tokio::select! {
        _ = pipeline.run(pipeline_rx) => {}
        _ = tokio::signal::ctrl_c() => {
            logger.log(LogEvent::Info { message: "shutting down on ctrl-c".to_string() })?;
        }
    }

    Ok(())
}

fn wall_clock_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

async fn run_decode(args: DecodeArgs) -> Result<()> {
    let logging_config = args.logging.into_config();
    let mut logger = StructuredLogger::new(logging_config.clone())?;
    let core_logger = Arc::new(PipelineLogger::new(logging_config.to_core_log_config()));

    let target = match args.kind.clone() {
        DecoderKindArg::Ais => DecoderTarget::Ais(AisDecoder::new(args.sample_rate)),
        DecoderKindArg::Sstv => DecoderTarget::Sstv(SstvDecoder::new(args.sample_rate)),
        DecoderKindArg::Metrics => DecoderTarget::Metrics(MetricsAnalyzer::new()),
    };

    let sink = EventSink::new(256);
    let session_logger = core_logger.clone();
    let host = args.host.clone();
    let port = args.port;
    let chunk_size = args.chunk_size;
    let sink_for_session = sink.clone();
    tokio::spawn(async move {
        run_decoder_session(host, port, chunk_size, target, None, sink_for_session, session_logger).await;
    });

    logger.log(LogEvent::Info {
        message: format!("connecting to {}:{} as a {:?} decoder", args.host, args.port, args.kind),
    })?;

    let mut telemetry = TelemetryAggregator::new(TELEMETRY_INTERVAL_SECS);
    let mut stats_ticker = tokio::time::interval(std::time::Duration::from_secs_f64(STATS_INTERVAL_SECS));

    loop {
        tokio::select! {
            event = sink.recv() => {
                match event {
                    DecoderEvent::Ais(report) => {
                        telemetry.record_event();
                        logger.log(LogEvent::AisFrame(AisFrameFormatter::format(&report)))?;
                    }
                    DecoderEvent::Sstv(event) => {
                        telemetry.record_event();
                        logger.log(LogEvent::SstvEvent(format_sstv_event(&event)))?;
                    }
                    DecoderEvent::Metrics(record) => {
                        telemetry.record_metrics(
                            record.snr_db as f64,
                            record.ber,
                            record.signal_strength_dbm as f64,
                            record.packet_success_rate,
                        );
                        if let Some(sample) = telemetry.sample() {
                            logger.log(LogEvent::Telemetry(sample))?;
                        }
                    }
                }
            }
            _ = stats_ticker.tick() => {
                let (snr_db, ber, signal_strength_dbm) = telemetry.compute_statistics();
                logger.log(LogEvent::Statistics(StatisticsEvent {
                    timestamp: chrono::Utc::now(),
                    duration_secs: logger.elapsed(),
                    snr_db,
                    ber,
                    signal_strength_dbm,
                    total_events: telemetry.total_events(),
                    total_chunks: telemetry.total_chunks(),
                }))?;
            }
            _ = tokio::signal::ctrl_c() => {
                logger.log(LogEvent::Info { message: "shutting down on ctrl-c".to_string() })?;
                break;
            }
        }
    }

    Ok(())
}

fn format_sstv_event(event: &SstvEvent) -> SstvEventLog {
    let (kind, detail) = match event {
        SstvEvent::VisDetected { mode } => ("vis_detected", format!("{mode:?}")),
        SstvEvent::DefaultModeFallback { mode } => ("default_mode_fallback", format!("{mode:?}")),
        SstvEvent::SyncLocked => ("sync_locked", String::new()),
        SstvEvent::ScanLine { line } => ("scan_line", line.to_string()),
        SstvEvent::CompleteImage { width, height, .. } => {
            ("complete_image", format!("{width}x{height}"))
        }
    };
    SstvEventLog {
        timestamp: chrono::Utc::now(),
        kind: kind.to_string(),
        detail,
    }
}
