//! RTL-TCP-compatible client for the dongle-emulation server.
//!
//! Grounded in the decode service's `RTLTCPClient`: connect, read the 12-byte
//! header, pull fixed-size chunks of interleaved I/Q bytes and dequantize
//! them back to `Complex32`, and push 5-byte tuning commands the other way
//! on the same socket. Used by [`crate::decoders`] to feed decoder state
//! machines from a live or replayed stream.

use num_complex::Complex32;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::dongle_server::{
    dequantize, CMD_SET_FREQ_CORRECTION, CMD_SET_FREQUENCY, CMD_SET_GAIN, CMD_SET_GAIN_MODE,
    CMD_SET_SAMPLE_RATE, MAGIC,
};
use crate::errors::TransportError;

/// The dongle-emulation handshake header: magic, tuner type, gain stage
/// count, all big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DongleInfo {
    pub tuner_type: u32,
    pub gain_stages: u32,
}

/// A connected client of a [`crate::dongle_server::DongleServer`].
pub struct StreamClient {
    stream: TcpStream,
    info: DongleInfo,
}

impl StreamClient {
    /// Connect to `host:port` and read the handshake header.
    pub async fn connect(host: &str, port: u16) -> Result<Self, TransportError> {
        let addr = format!("{host}:{port}");
        let mut stream =
            TcpStream::connect(&addr)
                .await
                .map_err(|source| TransportError::Bind { addr, source })?;
        stream.set_nodelay(true).ok();

        let mut header = [0u8; 12];
        stream
            .read_exact(&mut header)
            .await
            .map_err(|source| TransportError::ShortRead { source })?;

        if &header[0..4] != MAGIC {
            return Err(TransportError::Protocol {
                message: "dongle handshake magic mismatch".to_string(),
            });
        }
        let tuner_type = u32::from_be_bytes(header[4..8].try_into().unwrap());
        let gain_stages = u32::from_be_bytes(header[8..12].try_into().unwrap());

        Ok(Self {
            stream,
            info: DongleInfo { tuner_type, gain_stages },
        })
    }

    pub fn info(&self) -> DongleInfo {
        self.info
    }

    /// Read `count` interleaved I/Q samples and dequantize them to
    /// `Complex32`. Returns a short-read error if the peer closes mid-chunk.
    pub async fn read_chunk(&mut self, count: usize) -> Result<Vec<Complex32>, TransportError> {
        let mut bytes = vec![0u8; count * 2];
        self.stream
            .read_exact(&mut bytes)
            .await
            .map_err(|source| TransportError::ShortRead { source })?;

        Ok(bytes
            .chunks_exact(2)
            .map(|pair| Complex32::new(dequantize(pair[0]), dequantize(pair[1])))
            .collect())
    }

    async fn send_command(&mut self, cmd: u8, param: u32) -> Result<(), TransportError> {
        let mut record = [0u8; 5];
        record[0] = cmd;
        record[1..5].copy_from_slice(&param.to_be_bytes());
        self.stream
            .write_all(&record)
            .await
            .map_err(|source| TransportError::Write { source })
    }

    pub async fn set_frequency(&mut self, freq_hz: u32) -> Result<(), TransportError> {
        self.send_command(CMD_SET_FREQUENCY, freq_hz).await
    }

    pub async fn set_sample_rate(&mut self, sample_rate_hz: u32) -> Result<(), TransportError> {
        self.send_command(CMD_SET_SAMPLE_RATE, sample_rate_hz).await
    }

    pub async fn set_gain_mode(&mut self, mode: u32) -> Result<(), TransportError> {
        self.send_command(CMD_SET_GAIN_MODE, mode).await
    }

    pub async fn set_gain(&mut self, gain_tenths_db: u32) -> Result<(), TransportError> {
        self.send_command(CMD_SET_GAIN, gain_tenths_db).await
    }

    pub async fn set_freq_correction(&mut self, ppm: u32) -> Result<(), TransportError> {
        self.send_command(CMD_SET_FREQ_CORRECTION, ppm).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JammerConfig, TuningState};
    use crate::dongle_server::{quantize_chunk, DongleServer, SharedState};
    use crate::logging::PipelineLogger;
    use std::sync::Arc;

    #[tokio::test]
    async fn connects_and_reads_header() {
        let state = SharedState::new(TuningState::default(), JammerConfig::default());
        let server = DongleServer::new(1, 29, state, Arc::new(PipelineLogger::default()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_task = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            server.handle_client(socket).await
        });

        let client = StreamClient::connect(&addr.ip().to_string(), addr.port())
            .await
            .unwrap();
        assert_eq!(client.info().tuner_type, 1);
        assert_eq!(client.info().gain_stages, 29);
        server_task.abort();
    }

    #[tokio::test]
    async fn read_chunk_dequantizes_broadcast_bytes() {
        let state = SharedState::new(TuningState::default(), JammerConfig::default());
        let server = DongleServer::new(1, 29, state, Arc::new(PipelineLogger::default()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_for_accept = server.clone();
        let server_task = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            server_for_accept.handle_client(socket).await
        });

        let mut client = StreamClient::connect(&addr.ip().to_string(), addr.port())
            .await
            .unwrap();

        // Give the accept loop a moment to register the client before
        // broadcasting.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let samples = vec![Complex32::new(0.5, -0.5)];
        server.broadcast(quantize_chunk(&samples));

        let received = client.read_chunk(1).await.unwrap();
        assert_eq!(received.len(), 1);
        assert!((received[0].re - 0.5).abs() < 0.01);
        assert!((received[0].im - (-0.5)).abs() < 0.01);
        server_task.abort();
    }
}
