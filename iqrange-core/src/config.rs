//! Configuration types for the exercise-range pipeline.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{ConfigError, ParameterError};

/// Top-level configuration for a running pipeline instance.
///
/// Populated from the environment surface described in the external
/// interfaces section: `IQ_FILE_PATH`, `SAMPLE_RATE`, `DONGLE_PORT`,
/// `BUS_HOST`, `BUS_PORT`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub iq_file_path: PathBuf,
    pub sample_rate_hz: u32,
    pub chunk_size: usize,
    pub dongle_host: String,
    pub dongle_port: u16,
    pub bus_host: String,
    pub bus_port: u16,
    pub tuner_type: u32,
    pub gain_stages: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            iq_file_path: PathBuf::from("signal.iq"),
            sample_rate_hz: 1_024_000,
            chunk_size: 16_384,
            dongle_host: "0.0.0.0".to_string(),
            dongle_port: 1234,
            bus_host: "0.0.0.0".to_string(),
            bus_port: 7878,
            tuner_type: 1,
            gain_stages: 29,
        }
    }
}

impl PipelineConfig {
    /// Validate the configuration, mirroring the checks the control plane and
    /// dongle server would otherwise have to repeat on every mutation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate_hz == 0 {
            return Err(ConfigError::InvalidSampleRate {
                rate: self.sample_rate_hz,
            });
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize {
                size: self.chunk_size,
            });
        }
        if self.dongle_port == 0 || self.bus_port == 0 {
            return Err(ConfigError::InvalidPort { port: 0 });
        }
        Ok(())
    }

    /// Real-time pacing interval for one chunk at the configured sample rate.
    pub fn chunk_pacing(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.chunk_size as f64 / self.sample_rate_hz as f64)
    }
}

/// The tuning state exposed over the dongle-emulation protocol: center
/// frequency and sample rate, both settable by a connected client via RTL-TCP
/// commands 0x01 and 0x02.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TuningState {
    pub center_freq_hz: f64,
    pub sample_rate_hz: u32,
}

impl Default for TuningState {
    fn default() -> Self {
        Self {
            center_freq_hz: 100_000_000.0,
            sample_rate_hz: 1_024_000,
        }
    }
}

/// The jammer synthesis kinds, matching the original signal mixer's
/// waveform families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JammerKind {
    Barrage,
    Spot,
    Sweep,
    Pulse,
    Chirp,
    Fhss,
}

impl fmt::Display for JammerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JammerKind::Barrage => "barrage",
            JammerKind::Spot => "spot",
            JammerKind::Sweep => "sweep",
            JammerKind::Pulse => "pulse",
            JammerKind::Chirp => "chirp",
            JammerKind::Fhss => "fhss",
        };
        write!(f, "{s}")
    }
}

impl FromStr for JammerKind {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "barrage" => Ok(JammerKind::Barrage),
            "spot" => Ok(JammerKind::Spot),
            "sweep" => Ok(JammerKind::Sweep),
            "pulse" => Ok(JammerKind::Pulse),
            "chirp" => Ok(JammerKind::Chirp),
            "fhss" => Ok(JammerKind::Fhss),
            other => Err(ParameterError::InvalidWaveformKind {
                value: other.to_string(),
            }),
        }
    }
}

/// Jammer configuration, mutated by the control plane and read once per
/// chunk by the pipeline task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JammerConfig {
    pub enabled: bool,
    pub kind: JammerKind,
    pub amplitude: f32,
    pub target_freq_hz: f64,
}

impl Default for JammerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            kind: JammerKind::Barrage,
            amplitude: 0.5,
            target_freq_hz: 100_000_000.0,
        }
    }
}

impl JammerConfig {
    pub fn validate(&self) -> Result<(), ParameterError> {
        if !(0.0..=1.0).contains(&self.amplitude) {
            return Err(ParameterError::InvalidAmplitude {
                value: self.amplitude,
            });
        }
        if !self.target_freq_hz.is_finite() || self.target_freq_hz < 0.0 {
            return Err(ParameterError::InvalidFrequency {
                value: self.target_freq_hz,
            });
        }
        Ok(())
    }
}
