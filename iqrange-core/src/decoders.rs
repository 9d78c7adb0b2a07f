//! Decoder orchestration: per-consumer state, reconnect-with-backoff, and
//! bounded non-blocking event forwarding to an observer.
//!
//! Each decoder (AIS, SSTV, metrics) is driven by its own
//! [`DecoderSession`], which owns a [`StreamClient`] connection to the
//! dongle-emulation server and reconnects with the fixed 1-second backoff
//! the concurrency model specifies. Events are pushed to an [`EventSink`]
//! rather than an unbounded channel: a slow observer must not stall the
//! decoder, so the sink drops the oldest queued event on overflow, the same
//! bounded-history discipline [`crate::metrics::MetricsAnalyzer`] uses for
//! its spectrogram rows.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use num_complex::Complex32;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::ais::{fm_discriminator, AisDecoder, AisReport};
use crate::dongle_server::SharedState;
use crate::logging::PipelineLogger;
use crate::metrics::{MetricsAnalyzer, MetricsRecord};
use crate::sstv::{SstvDecoder, SstvEvent};
use crate::stream_client::StreamClient;

const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Union of everything a decoder session can emit, so all three consumers
/// can share one [`EventSink`] type if a caller wants to multiplex them.
#[derive(Debug, Clone)]
pub enum DecoderEvent {
    Ais(AisReport),
    Sstv(SstvEvent),
    Metrics(MetricsRecord),
}

/// The decoder a session drives.
pub enum DecoderTarget {
    Ais(AisDecoder),
    Sstv(SstvDecoder),
    Metrics(MetricsAnalyzer),
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

fn process_chunk(
    target: &mut DecoderTarget,
    samples: &[Complex32],
    jammer_state: Option<&SharedState>,
) -> Vec<DecoderEvent> {
    match target {
        DecoderTarget::Ais(decoder) => {
            let audio = fm_discriminator(samples);
            decoder.process_audio(&audio).into_iter().map(DecoderEvent::Ais).collect()
        }
        DecoderTarget::Sstv(decoder) => {
            let audio: Vec<f32> = samples.iter().map(|c| c.re).collect();
            decoder.process_audio(&audio).into_iter().map(DecoderEvent::Sstv).collect()
        }
        DecoderTarget::Metrics(analyzer) => {
            let jammer = jammer_state.map(|s| s.jammer_snapshot()).unwrap_or_default();
            vec![DecoderEvent::Metrics(analyzer.analyze_chunk(samples, &jammer, now_secs()))]
        }
    }
}

/// A bounded event queue that drops the oldest entry rather than blocking
/// the decoder when an observer falls behind.
pub struct EventSink {
    queue: Mutex<VecDeque<DecoderEvent>>,
    capacity: usize,
    notify: Notify,
}

impl EventSink {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
        })
    }

    pub fn push(&self, event: DecoderEvent) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back(event);
        drop(queue);
        self.notify.notify_waiters();
    }

    pub fn try_recv(&self) -> Option<DecoderEvent> {
        self.queue.lock().pop_front()
    }

    /// Wait for and return the next event.
    pub async fn recv(&self) -> DecoderEvent {
        loop {
            if let Some(event) = self.try_recv() {
                return event;
            }
            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs one decoder against the dongle-emulation server at `host:port`,
/// forever: connect, stream chunks of `chunk_size` samples into the
/// decoder, push resulting events to `sink`. On any read or connect
/// failure, reconnects after [`RECONNECT_BACKOFF`].
pub async fn run_decoder_session(
    host: String,
    port: u16,
    chunk_size: usize,
    mut target: DecoderTarget,
    jammer_state: Option<Arc<SharedState>>,
    sink: Arc<EventSink>,
    logger: Arc<PipelineLogger>,
) {
    loop {
        match StreamClient::connect(&host, port).await {
            Ok(mut client) => {
                logger.info("DECODE", format!("connected to {host}:{port}"));
                loop {
                    match client.read_chunk(chunk_size).await {
                        Ok(samples) => {
                            for event in
                                process_chunk(&mut target, &samples, jammer_state.as_deref())
                            {
                                sink.push(event);
                            }
                        }
                        Err(err) => {
                            logger.warn("DECODE", format!("stream read failed: {err}"));
                            break;
                        }
                    }
                }
            }
            Err(err) => {
                logger.warn("DECODE", format!("connect to {host}:{port} failed: {err}"));
            }
        }
        tokio::time::sleep(RECONNECT_BACKOFF).await;
    }
}
