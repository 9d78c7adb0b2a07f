//! Control plane: maps external JSON commands onto SampleSource/JammerSynth
//! mutations and publishes periodic status snapshots.
//!
//! Grounded in the decode service's control-bus consumer, which accepted
//! both a plain `{"command", "parameters"}` envelope and a legacy
//! `{"type": "trigger", "content": {...}}` wrapper from the exercise
//! orchestration layer; both are parsed here into the same dispatch.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::bus::Bus;
use crate::config::JammerKind;
use crate::dongle_server::{DongleServer, SharedState};
use crate::jammer;
use crate::logging::PipelineLogger;
use crate::sample_source::PipelineCommand;

const STATUS_INTERVAL: Duration = Duration::from_secs(2);

/// Playback state as last reported by the pipeline task. The pipeline is the
/// sole writer (after applying each [`PipelineCommand`]); the control plane
/// is the sole reader, for status snapshots — the same single-writer /
/// single-reader discipline as [`SharedState`].
#[derive(Debug, Clone)]
pub struct PlaybackState {
    pub running: bool,
    pub paused: bool,
    pub file: String,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self { running: true, paused: false, file: String::new() }
    }
}

#[derive(Debug, Clone, Serialize)]
struct PlaybackStatus {
    running: bool,
    paused: bool,
    file: String,
}

#[derive(Debug, Clone, Serialize)]
struct JammingStatus {
    enabled: bool,
    #[serde(rename = "type")]
    kind: String,
    power: f32,
    jamming_freq_mhz: f64,
    current_freq_mhz: f64,
    sample_rate_mhz: f64,
    in_bandwidth: bool,
    freq_offset_khz: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
struct StatusSnapshot {
    timestamp: f64,
    playback: PlaybackStatus,
    jamming: JammingStatus,
    gqrx_connected: bool,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    command: Option<String>,
    parameters: Option<Value>,
    #[serde(rename = "type")]
    kind: Option<String>,
    content: Option<LegacyContent>,
}

#[derive(Debug, Deserialize)]
struct LegacyContent {
    command: String,
    parameters: Option<Value>,
}

fn parse_envelope(payload: &str) -> Option<(String, Value)> {
    let envelope: Envelope = serde_json::from_str(payload).ok()?;
    if envelope.kind.as_deref() == Some("trigger") {
        let content = envelope.content?;
        return Some((content.command, content.parameters.unwrap_or(Value::Null)));
    }
    Some((envelope.command?, envelope.parameters.unwrap_or(Value::Null)))
}

/// Subscribes to the bus's `control` topic, applies commands, and publishes
/// status snapshots to `status` every 2 seconds and on every mutation.
pub struct ControlPlane {
    bus: Bus,
    state: Arc<SharedState>,
    dongle: Arc<DongleServer>,
    playback: Arc<Mutex<PlaybackState>>,
    pipeline_tx: mpsc::Sender<PipelineCommand>,
    logger: Arc<PipelineLogger>,
}

impl ControlPlane {
    pub fn new(
        bus: Bus,
        state: Arc<SharedState>,
        dongle: Arc<DongleServer>,
        playback: Arc<Mutex<PlaybackState>>,
        pipeline_tx: mpsc::Sender<PipelineCommand>,
        logger: Arc<PipelineLogger>,
    ) -> Self {
        Self { bus, state, dongle, playback, pipeline_tx, logger }
    }

    fn snapshot(&self, timestamp: f64) -> StatusSnapshot {
        let tuning = self.state.tuning_snapshot();
        let jammer = self.state.jammer_snapshot();
        let playback = self.playback.lock().clone();
        let in_bandwidth = jammer::in_passband(jammer.target_freq_hz, &tuning);

        StatusSnapshot {
            timestamp,
            playback: PlaybackStatus {
                running: playback.running,
                paused: playback.paused,
                file: playback.file,
            },
            jamming: JammingStatus {
                enabled: jammer.enabled,
                kind: jammer.kind.to_string(),
                power: jammer.amplitude,
                jamming_freq_mhz: jammer.target_freq_hz / 1e6,
                current_freq_mhz: tuning.center_freq_hz / 1e6,
                sample_rate_mhz: tuning.sample_rate_hz as f64 / 1e6,
                in_bandwidth,
                freq_offset_khz: in_bandwidth
                    .then(|| (jammer.target_freq_hz - tuning.center_freq_hz) / 1e3),
            },
            gqrx_connected: self.dongle.client_count() > 0,
        }
    }

    fn publish_status(&self, timestamp: f64) {
        let snapshot = self.snapshot(timestamp);
        match serde_json::to_string(&snapshot) {
            Ok(payload) => self.bus.publish("status", payload),
            Err(err) => self.logger.warn("CONTROL", format!("failed to serialize status: {err}")),
        }
    }

    async fn dispatch(&self, command: &str, parameters: &Value) {
        match command {
            "play" => {
                let _ = self.pipeline_tx.send(PipelineCommand::Play).await;
            }
            "pause" => {
                let _ = self.pipeline_tx.send(PipelineCommand::Pause).await;
            }
            "stop" => {
                let _ = self.pipeline_tx.send(PipelineCommand::Stop).await;
            }
            "switch_source" => {
                if let Some(path) = parameters.get("path").and_then(Value::as_str) {
                    let _ = self
                        .pipeline_tx
                        .send(PipelineCommand::Switch(PathBuf::from(path)))
                        .await;
                } else {
                    self.logger.warn("CONTROL", "switch_source missing 'path' parameter");
                }
            }
            "enable" => self.state.jammer.lock().enabled = true,
            "disable" => self.state.jammer.lock().enabled = false,
            "set_kind" => match parameters
                .get("kind")
                .and_then(Value::as_str)
                .map(str::parse::<JammerKind>)
            {
                Some(Ok(kind)) => self.state.jammer.lock().kind = kind,
                _ => self.logger.warn("CONTROL", "set_kind missing or invalid 'kind' parameter"),
            },
            "set_amplitude" => match parameters.get("amplitude").and_then(Value::as_f64) {
                Some(amplitude) => {
                    let mut jammer = self.state.jammer.lock();
                    let candidate = crate::config::JammerConfig {
                        amplitude: amplitude as f32,
                        ..*jammer
                    };
                    match candidate.validate() {
                        Ok(()) => jammer.amplitude = candidate.amplitude,
                        Err(err) => self.logger.warn("CONTROL", format!("rejected amplitude: {err}")),
                    }
                }
                None => self.logger.warn("CONTROL", "set_amplitude missing 'amplitude' parameter"),
            },
            "set_target_frequency" => {
                match parameters.get("target_freq_hz").and_then(Value::as_f64) {
                    Some(freq) if freq.is_finite() && freq >= 0.0 => {
                        self.state.jammer.lock().target_freq_hz = freq;
                    }
                    Some(freq) => self
                        .logger
                        .warn("CONTROL", format!("rejected target frequency {freq}")),
                    None => self
                        .logger
                        .warn("CONTROL", "set_target_frequency missing 'target_freq_hz' parameter"),
                }
            }
            other => self.logger.warn("CONTROL", format!("unrecognized command: {other}")),
        }
    }

    /// Run forever: handle incoming control messages and emit a status
    /// snapshot every [`STATUS_INTERVAL`], plus one immediately after every
    /// applied mutation.
    pub async fn run(self, clock: impl Fn() -> f64 + Send + 'static) {
        let mut control_rx = self.bus.subscribe("control");
        let mut ticker = tokio::time::interval(STATUS_INTERVAL);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.publish_status(clock());
                }
                received = control_rx.recv() => {
                    match received {
                        Ok(payload) => {
                            match parse_envelope(&payload) {
                                Some((command, parameters)) => {
                                    self.dispatch(&command, &parameters).await;
                                    self.publish_status(clock());
                                }
                                None => self.logger.warn("CONTROL", format!("malformed control payload: {payload}")),
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            self.logger.warn("CONTROL", format!("control subscriber lagged, skipped {skipped} messages"));
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    }
}
