//! RTL-TCP-compatible dongle-emulation server.
//!
//! Speaks the same wire protocol as `rtl_tcp`: a 12-byte handshake header
//! (magic `RTL0`, tuner type, gain stage count, all big-endian), followed by
//! an unframed stream of interleaved I/Q `uint8` samples, with 5-byte
//! command records (`cmd: u8`, `param: u32` big-endian) flowing the other
//! way on the same socket.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Bytes, BytesMut};
use num_complex::Complex32;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::config::TuningState;
use crate::errors::TransportError;
use crate::logging::PipelineLogger;

pub const MAGIC: &[u8; 4] = b"RTL0";
const CLIENT_QUEUE_DEPTH: usize = 64;

pub const CMD_SET_FREQUENCY: u8 = 0x01;
pub const CMD_SET_SAMPLE_RATE: u8 = 0x02;
pub const CMD_SET_GAIN_MODE: u8 = 0x03;
pub const CMD_SET_GAIN: u8 = 0x04;
pub const CMD_SET_FREQ_CORRECTION: u8 = 0x05;

/// Quantize one float component in `[-1, 1]` to an unsigned byte, the wire
/// representation spec.md §3 defines: `clip(v*127.5 + 127.5, 0, 255)`.
pub fn quantize(v: f32) -> u8 {
    (v.clamp(-1.0, 1.0) * 127.5 + 127.5).round().clamp(0.0, 255.0) as u8
}

/// Inverse of [`quantize`]: recover an approximate float in `[-1, 1]` from a
/// wire byte.
pub fn dequantize(u: u8) -> f32 {
    (u as f32 - 127.5) / 127.5
}

/// Clip each component to `[-1, 1]`, quantize, and interleave `[I0, Q0, I1,
/// Q1, …]` into a byte buffer ready for broadcast.
pub fn quantize_chunk(samples: &[Complex32]) -> Bytes {
    let mut bytes = BytesMut::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&[quantize(sample.re), quantize(sample.im)]);
    }
    bytes.freeze()
}

/// Shared tuning/jammer state, read by the pipeline, written by this server
/// (tuning) and the control plane (jammer configuration — see
/// [`crate::control_plane`]).
pub struct SharedState {
    pub tuning: Mutex<TuningState>,
    pub jammer: Mutex<crate::config::JammerConfig>,
}

impl SharedState {
    pub fn new(tuning: TuningState, jammer: crate::config::JammerConfig) -> Arc<Self> {
        Arc::new(Self {
            tuning: Mutex::new(tuning),
            jammer: Mutex::new(jammer),
        })
    }

    pub fn tuning_snapshot(&self) -> TuningState {
        *self.tuning.lock()
    }

    pub fn jammer_snapshot(&self) -> crate::config::JammerConfig {
        *self.jammer.lock()
    }
}

struct ClientHandle {
    id: u64,
    tx: mpsc::Sender<Bytes>,
}

/// Dongle-emulation TCP server: accepts RTL-TCP-speaking clients, streams
/// quantized IQ bytes to each, and applies their tuning commands to the
/// shared state.
pub struct DongleServer {
    clients: Mutex<Vec<ClientHandle>>,
    next_client_id: AtomicU64,
    tuner_type: u32,
    gain_stages: u32,
    state: Arc<SharedState>,
    logger: Arc<PipelineLogger>,
}

impl DongleServer {
    pub fn new(
        tuner_type: u32,
        gain_stages: u32,
        state: Arc<SharedState>,
        logger: Arc<PipelineLogger>,
    ) -> Arc<Self> {
        Arc::new(Self {
            clients: Mutex::new(Vec::new()),
            next_client_id: AtomicU64::new(0),
            tuner_type,
            gain_stages,
            state,
            logger,
        })
    }

    pub async fn serve(self: Arc<Self>, host: &str, port: u16) -> Result<(), TransportError> {
        let addr = format!("{host}:{port}");
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.clone(),
                source,
            })?;
        self.logger
            .info("DONGLE", format!("dongle-emulation server listening on {addr}"));

        loop {
            let (socket, peer) = listener
                .accept()
                .await
                .map_err(|source| TransportError::Accept { source })?;
            let this = self.clone();
            tokio::spawn(async move {
                if let Err(err) = this.clone().handle_client(socket).await {
                    this.logger.warn("DONGLE", format!("client {peer} error: {err}"));
                }
            });
        }
    }

    pub(crate) async fn handle_client(self: Arc<Self>, socket: TcpStream) -> std::io::Result<()> {
        socket.set_nodelay(true).ok();
        let (mut read_half, mut write_half) = socket.into_split();

        let mut header = [0u8; 12];
        header[0..4].copy_from_slice(MAGIC);
        header[4..8].copy_from_slice(&self.tuner_type.to_be_bytes());
        header[8..12].copy_from_slice(&self.gain_stages.to_be_bytes());
        write_half.write_all(&header).await?;

        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let (tx, mut rx) = mpsc::channel::<Bytes>(CLIENT_QUEUE_DEPTH);
        self.clients.lock().push(ClientHandle { id, tx });
        self.logger.info("DONGLE", format!("client {id} connected"));

        let writer_logger = self.logger.clone();
        let writer_task = tokio::spawn(async move {
            while let Some(bytes) = rx.recv().await {
                if write_half.write_all(&bytes).await.is_err() {
                    break;
                }
            }
            writer_logger.debug("DONGLE", format!("client {id} writer finished"));
        });

        let mut cmd = [0u8; 5];
        loop {
            match read_half.read_exact(&mut cmd).await {
                Ok(_) => self.apply_command(id, &cmd),
                Err(_) => break,
            }
        }

        self.clients.lock().retain(|c| c.id != id);
        writer_task.abort();
        self.logger.info("DONGLE", format!("client {id} disconnected"));
        Ok(())
    }

    fn apply_command(&self, client_id: u64, cmd: &[u8; 5]) {
        let opcode = cmd[0];
        let param = u32::from_be_bytes([cmd[1], cmd[2], cmd[3], cmd[4]]);
        match opcode {
            CMD_SET_FREQUENCY => {
                let mut tuning = self.state.tuning.lock();
                tuning.center_freq_hz = param as f64;
                self.logger.info(
                    "DONGLE",
                    format!("client {client_id} tuned to {:.3} MHz", param as f64 / 1e6),
                );
            }
            CMD_SET_SAMPLE_RATE => {
                let mut tuning = self.state.tuning.lock();
                tuning.sample_rate_hz = param;
                self.logger.info(
                    "DONGLE",
                    format!("client {client_id} set sample rate {:.3} MHz", param as f64 / 1e6),
                );
            }
            CMD_SET_GAIN_MODE => {
                self.logger.debug("DONGLE", format!("client {client_id} set gain mode (no-op)"));
            }
            CMD_SET_GAIN => {
                self.logger
                    .debug("DONGLE", format!("client {client_id} set gain {:.1} dB", param as f64 / 10.0));
            }
            CMD_SET_FREQ_CORRECTION => {
                self.logger
                    .debug("DONGLE", format!("client {client_id} set frequency correction {param} ppm"));
            }
            other => {
                self.logger.warn("DONGLE", format!("client {client_id} sent unknown command {other:#04x}"));
            }
        }
    }

    /// Broadcast already-quantized IQ bytes to every connected client. A
    /// client whose queue is full (too slow to keep up) is dropped rather
    /// than allowed to stall the others; a client whose socket has closed is
    /// dropped on the next broadcast once its channel is also closed.
    pub fn broadcast(&self, bytes: Bytes) {
        let mut clients = self.clients.lock();
        clients.retain(|client| match client.tx.try_send(bytes.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.logger.warn("DONGLE", format!("client {} too slow, dropping", client.id));
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JammerConfig;

    #[test]
    fn header_layout_matches_rtl_tcp() {
        let mut header = [0u8; 12];
        header[0..4].copy_from_slice(MAGIC);
        header[4..8].copy_from_slice(&1u32.to_be_bytes());
        header[8..12].copy_from_slice(&29u32.to_be_bytes());
        assert_eq!(&header[0..4], b"RTL0");
        assert_eq!(u32::from_be_bytes(header[4..8].try_into().unwrap()), 1);
        assert_eq!(u32::from_be_bytes(header[8..12].try_into().unwrap()), 29);
    }

    #[test]
    fn quantize_dequantize_round_trip_error_bound() {
        let mut v = -1.0f32;
        while v <= 1.0 {
            let u = quantize(v);
            let back = dequantize(u);
            assert!((back - v).abs() <= 1.0 / 127.5 + 1e-6, "v={v} back={back}");
            v += 0.01;
        }
    }

    #[test]
    fn quantize_chunk_interleaves_i_and_q() {
        let samples = vec![Complex32::new(1.0, -1.0), Complex32::new(0.0, 0.0)];
        let bytes = quantize_chunk(&samples);
        assert_eq!(bytes.len(), 4);
        assert_eq!(bytes[0], 255); // I0 = 1.0
        assert_eq!(bytes[1], 0);   // Q0 = -1.0
        assert_eq!(bytes[2], 128); // I1 = 0.0 -> round(127.5) = 128
        assert_eq!(bytes[3], 128);
    }

    #[tokio::test]
    async fn apply_command_updates_shared_tuning_state() {
        let state = SharedState::new(TuningState::default(), JammerConfig::default());
        let server = DongleServer::new(1, 29, state.clone(), Arc::new(PipelineLogger::default()));

        let mut cmd = [0u8; 5];
        cmd[0] = CMD_SET_FREQUENCY;
        cmd[1..5].copy_from_slice(&145_000_000u32.to_be_bytes());
        server.apply_command(0, &cmd);

        assert_eq!(state.tuning_snapshot().center_freq_hz, 145_000_000.0);
    }

    #[tokio::test]
    async fn broadcast_drops_clients_whose_queue_is_full() {
        let state = SharedState::new(TuningState::default(), JammerConfig::default());
        let server = DongleServer::new(1, 29, state, Arc::new(PipelineLogger::default()));
        let (tx, _rx) = mpsc::channel::<Bytes>(1);
        server.clients.lock().push(ClientHandle { id: 0, tx });

        // First broadcast fills the one-slot queue; second should observe it
        // full and drop the client.
        server.broadcast(Bytes::from_static(b"x"));
        server.broadcast(Bytes::from_static(b"y"));
        assert_eq!(server.client_count(), 0);
    }
}
