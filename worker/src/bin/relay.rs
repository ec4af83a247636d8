//! Heartbeat relay: the one well-known meeting point for worker gossip.
//!
//! Every line received from any connection is forwarded to all connections,
//! sender included; workers filter out their own announcements themselves.
//! The relay is content-agnostic and keeps no state, so restarting it only
//! delays gossip, never corrupts it.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

/// Lines buffered for a slow client before it starts missing heartbeats.
const FANOUT_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let bind = std::env::var("CARTCAST_RELAY_BIND").unwrap_or_else(|_| "0.0.0.0:5556".to_string());
    let listener = TcpListener::bind(&bind).await?;
    tracing::info!(addr = %bind, "heartbeat relay listening");

    let (fanout, _) = broadcast::channel::<String>(FANOUT_CAPACITY);

    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::debug!(%peer, "relay client connected");
        let tx = fanout.clone();
        let mut rx = fanout.subscribe();
        let (read, mut write) = stream.into_split();

        tokio::spawn(async move {
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let _ = tx.send(line);
            }
            tracing::debug!(%peer, "relay client disconnected");
        });

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(mut line) => {
                        line.push('\n');
                        if write.write_all(line.as_bytes()).await.is_err() {
                            return;
                        }
                    }
                    // A lagging client just misses a few heartbeats.
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });
    }
}
