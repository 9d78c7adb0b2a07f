//! Error types for the IQ streaming, jammer and dongle-emulation pipeline.

use thiserror::Error;

/// Top-level error type for all pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("sample source error: {0}")]
    Source(#[from] SourceError),

    #[error("parameter error: {0}")]
    Parameter(#[from] ParameterError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised while loading or reading an IQ sample file.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("IQ file not found: {path}")]
    NotFound { path: String },

    #[error("IQ file has invalid length {len} bytes (not a multiple of 8)")]
    InvalidFormat { len: usize },

    #[error("IQ file is empty: {path}")]
    Empty { path: String },
}

/// Errors raised validating jammer/tuning parameters.
#[derive(Debug, Error)]
pub enum ParameterError {
    #[error("invalid amplitude {value}: must be within [0.0, 1.0]")]
    InvalidAmplitude { value: f32 },

    #[error("invalid frequency {value} Hz")]
    InvalidFrequency { value: f64 },

    #[error("invalid sample rate {value} Hz: must be > 0")]
    InvalidSampleRate { value: u32 },

    #[error("unknown waveform kind: {value}")]
    InvalidWaveformKind { value: String },
}

/// Errors raised by the dongle-emulation TCP transport and the bus transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to accept connection: {source}")]
    Accept {
        #[source]
        source: std::io::Error,
    },

    #[error("short read: {source}")]
    ShortRead {
        #[source]
        source: std::io::Error,
    },

    #[error("write failed: {source}")]
    Write {
        #[source]
        source: std::io::Error,
    },

    #[error("protocol error: {message}")]
    Protocol { message: String },
}

/// Errors raised validating configuration loaded from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid sample rate: {rate} Hz (must be > 0)")]
    InvalidSampleRate { rate: u32 },

    #[error("invalid chunk size: {size} (must be > 0)")]
    InvalidChunkSize { size: usize },

    #[error("invalid port: {port}")]
    InvalidPort { port: u16 },
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
