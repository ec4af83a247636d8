//! The `MessageBus` collaborator: heartbeat fan-out to every worker.
//!
//! A node publishes its own heartbeat once per period and holds one logical
//! subscription covering all publishers. Two implementations live here:
//! [`LocalBus`] wires nodes together in-process (simulation tests), and
//! [`RelayBus`] speaks newline-delimited JSON to the standalone relay binary.

use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};

use crate::error::BusError;
use crate::protocol::Heartbeat;

/// Buffered heartbeats per subscriber. Heartbeats are periodic, so a slow
/// consumer can safely drop a few.
const SUBSCRIPTION_CAPACITY: usize = 64;

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Broadcast one heartbeat to every subscriber, best effort.
    async fn publish(&self, heartbeat: &Heartbeat) -> Result<(), BusError>;

    /// Open this node's subscription. The returned channel yields heartbeats
    /// from all publishers until the bus goes away; a caller that drains it
    /// to `None` may subscribe again.
    async fn subscribe(&self) -> Result<mpsc::Receiver<Heartbeat>, BusError>;
}

/// In-process bus: publishes go straight to every open subscription.
#[derive(Default)]
pub struct LocalBus {
    subscribers: StdMutex<Vec<mpsc::Sender<Heartbeat>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    async fn publish(&self, heartbeat: &Heartbeat) -> Result<(), BusError> {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|tx| match tx.try_send(heartbeat.clone()) {
            Ok(()) => true,
            // Full: the subscriber is lagging; drop this heartbeat for it.
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<Heartbeat>, BusError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        Ok(rx)
    }
}

/// TCP client of the heartbeat relay.
///
/// The relay forwards every line it receives to all connected clients, so
/// publishing and subscribing use separate connections. The publish side
/// connects lazily and drops its connection on any write failure; the next
/// publish reconnects. The subscribe side runs a reader task that reconnects
/// with exponential backoff, which is what makes the subscription
/// restartable.
pub struct RelayBus {
    relay_addr: String,
    writer: Mutex<Option<BufWriter<TcpStream>>>,
}

impl RelayBus {
    pub fn new(relay_addr: impl Into<String>) -> Self {
        Self {
            relay_addr: relay_addr.into(),
            writer: Mutex::new(None),
        }
    }
}

#[async_trait]
impl MessageBus for RelayBus {
    async fn publish(&self, heartbeat: &Heartbeat) -> Result<(), BusError> {
        let mut line = serde_json::to_string(heartbeat)?;
        line.push('\n');

        let mut slot = self.writer.lock().await;
        if slot.is_none() {
            let stream = TcpStream::connect(&self.relay_addr).await?;
            tracing::debug!(relay = %self.relay_addr, "connected publisher to relay");
            *slot = Some(BufWriter::new(stream));
        }
        let writer = slot.as_mut().ok_or(BusError::NotConnected)?;
        let result = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = result {
            *slot = None;
            return Err(e.into());
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<Heartbeat>, BusError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        let relay_addr = self.relay_addr.clone();

        tokio::spawn(async move {
            let mut consecutive_failures: u32 = 0;
            loop {
                let stream = match TcpStream::connect(&relay_addr).await {
                    Ok(stream) => {
                        consecutive_failures = 0;
                        stream
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        let backoff_ms = 100 * 2u64.pow(consecutive_failures.min(6));
                        tracing::warn!(
                            relay = %relay_addr,
                            backoff_ms,
                            "relay unreachable: {}, retrying",
                            e
                        );
                        tokio::select! {
                            _ = tx.closed() => return,
                            _ = tokio::time::sleep(Duration::from_millis(backoff_ms)) => {}
                        }
                        continue;
                    }
                };

                let mut lines = BufReader::new(stream).lines();
                loop {
                    tokio::select! {
                        _ = tx.closed() => return,
                        line = lines.next_line() => match line {
                            Ok(Some(line)) => {
                                match serde_json::from_str::<Heartbeat>(&line) {
                                    Ok(heartbeat) => {
                                        if tx.send(heartbeat).await.is_err() {
                                            return;
                                        }
                                    }
                                    Err(e) => {
                                        tracing::warn!("discarding malformed heartbeat: {}", e);
                                    }
                                }
                            }
                            Ok(None) | Err(_) => {
                                tracing::warn!(relay = %relay_addr, "relay connection lost, resubscribing");
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}
