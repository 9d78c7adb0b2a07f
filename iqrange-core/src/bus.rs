//! In-process publish/subscribe control bus, with an optional line-delimited
//! TCP transport so out-of-process observers and controllers can attach.
//!
//! The original exercise range used a local MQTT broker for this; no crate
//! in the retrieval pack offers an idiomatic async MQTT client, so the bus
//! is realized in-process (topic -> `tokio::sync::broadcast` channel) and
//! exposed over a small line protocol instead of fabricating a dependency.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use crate::errors::TransportError;
use crate::logging::PipelineLogger;

const CHANNEL_CAPACITY: usize = 256;

/// Topic-keyed broadcast registry. Cloning a `Bus` is cheap (shares the same
/// underlying map) and is the normal way to hand it to multiple tasks.
#[derive(Clone)]
pub struct Bus {
    topics: Arc<DashMap<String, broadcast::Sender<String>>>,
}

impl Bus {
    pub fn new() -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
        }
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<String> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Publish a payload on a topic. A topic with no subscribers silently
    /// drops the message, matching the "retained status" semantics: the
    /// periodic status publisher does not care whether anyone is listening.
    pub fn publish(&self, topic: &str, payload: String) {
        let sender = self.sender_for(topic);
        let _ = sender.send(payload);
    }

    /// Subscribe to a topic, receiving everything published from this point
    /// onward.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<String> {
        self.sender_for(topic).subscribe()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

/// TCP front-end for the bus. Protocol, one line per message:
///
/// - a client sends `SUB <topic>\n` to start receiving `<topic> <payload>\n`
///   lines for everything subsequently published to that topic
/// - any other line is parsed as a JSON control envelope and published
///   verbatim onto the `control` topic
pub struct BusServer;

impl BusServer {
    pub async fn serve(
        bus: Bus,
        host: &str,
        port: u16,
        logger: Arc<PipelineLogger>,
    ) -> Result<(), TransportError> {
        let addr = format!("{host}:{port}");
        let listener =
            TcpListener::bind(&addr)
                .await
                .map_err(|source| TransportError::Bind {
                    addr: addr.clone(),
                    source,
                })?;
        logger.info("BUS", format!("control bus listening on {addr}"));

        loop {
            let (socket, peer) = listener
                .accept()
                .await
                .map_err(|source| TransportError::Accept { source })?;
            let bus = bus.clone();
            let logger = logger.clone();
            tokio::spawn(async move {
                if let Err(err) = handle_connection(socket, bus).await {
                    logger.warn("BUS", format!("connection from {peer} closed: {err}"));
                }
            });
        }
    }
}

async fn handle_connection(socket: TcpStream, bus: Bus) -> std::io::Result<()> {
    let (read_half, write_half) = socket.into_split();
    let mut write_half = Some(write_half);
    let mut lines = BufReader::new(read_half).lines();

    // A connection is either a publisher (every non-SUB line is published to
    // `control`) or, once it sends `SUB <topic>`, a subscriber for the rest
    // of its lifetime.
    let mut forward_task: Option<tokio::task::JoinHandle<()>> = None;

    while let Some(line) = lines.next_line().await? {
        if let Some(topic) = line.strip_prefix("SUB ") {
            let topic = topic.trim().to_string();
            let mut rx = bus.subscribe(&topic);
            if let Some(mut write_half) = write_half.take() {
                forward_task = Some(tokio::spawn(async move {
                    while let Ok(payload) = rx.recv().await {
                        let line = format!("{topic} {payload}\n");
                        if write_half.write_all(line.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                }));
            }
            break;
        } else if !line.trim().is_empty() {
            bus.publish("control", line);
        }
    }

    if let Some(task) = forward_task {
        let _ = task.await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus = Bus::new();
        bus.publish("status", "{}".to_string());
    }

    #[tokio::test]
    async fn subscriber_receives_published_payload() {
        let bus = Bus::new();
        let mut rx = bus.subscribe("status");
        bus.publish("status", "{\"ok\":true}".to_string());
        let received = rx.recv().await.unwrap();
        assert_eq!(received, "{\"ok\":true}");
    }

    #[tokio::test]
    async fn topics_are_independent() {
        let bus = Bus::new();
        let mut status_rx = bus.subscribe("status");
        let _control_rx = bus.subscribe("control");
        bus.publish("control", "cmd".to_string());
        assert!(status_rx.try_recv().is_err());
    }
}
